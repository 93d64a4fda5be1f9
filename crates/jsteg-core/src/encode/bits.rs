//! Bit writer for entropy-coded segments.

/// MSB-first writer that stuffs a zero byte after every `0xFF`.
pub(crate) struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            nbits: 0,
        }
    }

    /// Append the low `size` bits of `bits` (at most 16).
    pub fn write_bits(&mut self, bits: u16, size: u8) {
        if size == 0 {
            return;
        }
        let mask = (1u32 << size) - 1;
        self.acc = (self.acc << size) | (u32::from(bits) & mask);
        self.nbits += size;
        while self.nbits >= 8 {
            let byte = (self.acc >> (self.nbits - 8)) as u8;
            self.push_byte(byte);
            self.nbits -= 8;
        }
        self.acc &= (1u32 << self.nbits) - 1;
    }

    fn push_byte(&mut self, byte: u8) {
        self.out.push(byte);
        if byte == 0xFF {
            self.out.push(0x00);
        }
    }

    /// Pad the last partial byte with one bits.
    pub fn pad(&mut self) {
        if self.nbits > 0 {
            let fill = 8 - self.nbits;
            self.write_bits((1u16 << fill) - 1, fill);
        }
    }

    /// Pad, then emit marker `0xFF marker` without stuffing.
    pub fn write_marker(&mut self, marker: u8) {
        self.pad();
        self.out.push(0xFF);
        self.out.push(marker);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packs_msb_first() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0b1010, 4);
        writer.write_bits(0b1, 1);
        assert_eq!(writer.finish(), vec![0b1011_0101]);
    }

    #[test]
    fn test_pads_with_ones() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1011010, 7);
        writer.write_bits(0b1010, 4);
        assert_eq!(writer.finish(), vec![0xB5, 0x5F]);
    }

    #[test]
    fn test_stuffs_ff() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xFFFF, 16);
        assert_eq!(writer.finish(), vec![0xFF, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn test_marker_is_not_stuffed() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b0, 1);
        writer.write_marker(0xD0);
        writer.write_bits(0x12, 8);
        assert_eq!(writer.finish(), vec![0x7F, 0xFF, 0xD0, 0x12]);
    }

    #[test]
    fn test_masks_extra_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xFFF0, 4);
        writer.write_bits(0xF, 4);
        assert_eq!(writer.finish(), vec![0x0F]);
    }
}
