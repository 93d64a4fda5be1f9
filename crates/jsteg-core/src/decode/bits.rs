//! Bit reader over one entropy-coded segment.

use crate::huffman::extend;

/// MSB-first reader that removes `FF 00` stuffing.
///
/// Reading past the end of the segment, or into a marker, yields zero bits;
/// [`BitReader::padded_bytes`] reports how many bytes were synthesized.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    nbits: u8,
    padded: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            nbits: 0,
            padded: 0,
        }
    }

    fn fill_byte(&mut self) {
        let byte = match self.data.get(self.pos) {
            Some(0xFF) => match self.data.get(self.pos + 1) {
                Some(0x00) => {
                    self.pos += 2;
                    0xFF
                }
                _ => {
                    self.padded += 1;
                    0
                }
            },
            Some(&byte) => {
                self.pos += 1;
                byte
            }
            None => {
                self.padded += 1;
                0
            }
        };
        self.acc = (self.acc << 8) | u32::from(byte);
        self.nbits += 8;
    }

    pub fn read_bit(&mut self) -> u8 {
        self.read_bits(1) as u8
    }

    /// Read `count` bits (at most 16).
    pub fn read_bits(&mut self, count: u8) -> u16 {
        if count == 0 {
            return 0;
        }
        while self.nbits < count {
            self.fill_byte();
        }
        self.nbits -= count;
        let value = (self.acc >> self.nbits) & ((1u32 << count) - 1);
        self.acc &= (1u32 << self.nbits) - 1;
        value as u16
    }

    /// Read `size` additional bits and sign-extend them.
    pub fn receive_extend(&mut self, size: u8) -> i32 {
        extend(self.read_bits(size), size)
    }

    /// Discard buffered bits and consume an `RSTn` marker.
    ///
    /// Returns false if the next bytes are not a restart marker.
    pub fn restart(&mut self) -> bool {
        self.acc = 0;
        self.nbits = 0;
        while self.data.get(self.pos) == Some(&0xFF) && self.data.get(self.pos + 1) == Some(&0xFF) {
            self.pos += 1;
        }
        match (self.data.get(self.pos), self.data.get(self.pos + 1)) {
            (Some(0xFF), Some(0xD0..=0xD7)) => {
                self.pos += 2;
                true
            }
            _ => false,
        }
    }

    pub fn padded_bytes(&self) -> usize {
        self.padded
    }
}

/// End of the entropy-coded segment starting at `start`: the offset of the
/// first marker that is neither stuffing nor `RSTn`, or the input length.
pub(crate) fn entropy_segment_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == 0xFF {
            match data[i + 1] {
                0x00 | 0xD0..=0xD7 => {
                    i += 2;
                    continue;
                }
                0xFF => {
                    i += 1;
                    continue;
                }
                _ => return i,
            }
        }
        i += 1;
    }
    data.len()
}
