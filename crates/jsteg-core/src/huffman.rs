//! Canonical Huffman tables (T.81 Annex C), decode lookup (Annex F.2.2.3),
//! and optimal table generation from symbol statistics (Annex K.2).

use crate::decode::bits::BitReader;
use crate::decode::DecodeError;
use crate::tables;

/// Huffman table as carried in a DHT segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanSpec {
    /// `bits[i]` is the number of codes of length `i + 1`.
    pub bits: [u8; 16],
    /// Symbols in order of increasing code length.
    pub values: Vec<u8>,
}

impl HuffmanSpec {
    pub fn std_dc_luma() -> Self {
        Self::from_parts(tables::STD_DC_LUMA_BITS, &tables::STD_DC_LUMA_VALUES)
    }

    pub fn std_dc_chroma() -> Self {
        Self::from_parts(tables::STD_DC_CHROMA_BITS, &tables::STD_DC_CHROMA_VALUES)
    }

    pub fn std_ac_luma() -> Self {
        Self::from_parts(tables::STD_AC_LUMA_BITS, &tables::STD_AC_LUMA_VALUES)
    }

    pub fn std_ac_chroma() -> Self {
        Self::from_parts(tables::STD_AC_CHROMA_BITS, &tables::STD_AC_CHROMA_VALUES)
    }

    fn from_parts(bits: [u8; 16], values: &[u8]) -> Self {
        Self {
            bits,
            values: values.to_vec(),
        }
    }

    /// Total number of codes declared by `bits`.
    pub fn code_count(&self) -> usize {
        self.bits.iter().map(|&n| n as usize).sum()
    }

    /// Canonical `(symbol, code, length)` triples, or `None` when the counts
    /// do not match the symbols or the codes overflow their lengths.
    fn canonical_codes(&self) -> Option<Vec<(u8, u16, u8)>> {
        if self.code_count() != self.values.len() || self.values.len() > 256 {
            return None;
        }
        let mut codes = Vec::with_capacity(self.values.len());
        let mut symbols = self.values.iter();
        let mut code: u32 = 0;
        for length in 1..=16u8 {
            for _ in 0..self.bits[length as usize - 1] {
                let &symbol = symbols.next()?;
                codes.push((symbol, code as u16, length));
                code += 1;
            }
            if code > (1 << length) {
                return None;
            }
            code <<= 1;
        }
        Some(codes)
    }
}

/// Decoder lookup built from a [`HuffmanSpec`].
#[derive(Debug, Clone)]
pub(crate) struct DecodeTable {
    /// Largest code of each length, -1 when there is none.
    maxcode: [i32; 17],
    /// Index into `values` of the first code of each length, minus that code.
    offset: [i32; 17],
    values: Vec<u8>,
}

impl DecodeTable {
    pub fn build(spec: &HuffmanSpec) -> Result<Self, DecodeError> {
        if spec.canonical_codes().is_none() {
            return Err(DecodeError::InvalidSegment("malformed Huffman table".to_string()));
        }
        let mut maxcode = [-1i32; 17];
        let mut offset = [0i32; 17];
        let mut code = 0i32;
        let mut index = 0i32;
        for length in 1..=16usize {
            let count = spec.bits[length - 1] as i32;
            if count > 0 {
                offset[length] = index - code;
                code += count;
                index += count;
                maxcode[length] = code - 1;
            }
            code <<= 1;
        }
        Ok(Self {
            maxcode,
            offset,
            values: spec.values.clone(),
        })
    }

    /// Decode one symbol.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u8, DecodeError> {
        let mut code = i32::from(reader.read_bit());
        let mut length = 1;
        while code > self.maxcode[length] {
            if length == 16 {
                return Err(DecodeError::CorruptData("invalid Huffman code".to_string()));
            }
            code = (code << 1) | i32::from(reader.read_bit());
            length += 1;
        }
        usize::try_from(self.offset[length] + code)
            .ok()
            .and_then(|index| self.values.get(index).copied())
            .ok_or_else(|| DecodeError::CorruptData("invalid Huffman code".to_string()))
    }
}

/// Encoder lookup: symbol to `(code, length)`.
#[derive(Debug, Clone)]
pub(crate) struct EncodeTable {
    codes: [(u16, u8); 256],
}

impl EncodeTable {
    /// Returns `None` for a malformed spec.
    pub fn build(spec: &HuffmanSpec) -> Option<Self> {
        let mut codes = [(0u16, 0u8); 256];
        for (symbol, code, length) in spec.canonical_codes()? {
            codes[symbol as usize] = (code, length);
        }
        Some(Self { codes })
    }

    /// Code for `symbol`, or `None` if the table has no code for it.
    #[inline]
    pub fn lookup(&self, symbol: u8) -> Option<(u16, u8)> {
        let entry = self.codes[symbol as usize];
        (entry.1 > 0).then_some(entry)
    }

    /// True if every symbol with a non-zero count has a code.
    pub fn covers(&self, counts: &[u32; 256]) -> bool {
        counts
            .iter()
            .zip(self.codes.iter())
            .all(|(&count, &(_, length))| count == 0 || length > 0)
    }
}

/// Magnitude category (SSSS) of a coefficient value.
#[inline]
pub(crate) fn category(value: i32) -> u8 {
    (32 - value.unsigned_abs().leading_zeros()) as u8
}

/// Additional bits that follow a category symbol.
#[inline]
pub(crate) fn additional_bits(value: i32, size: u8) -> u16 {
    let raw = if value < 0 { value - 1 } else { value };
    (raw as u32 & ((1u32 << size) - 1)) as u16
}

/// Inverse of [`additional_bits`] (T.81 F.2.2.1 EXTEND).
#[inline]
pub(crate) fn extend(bits: u16, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    let value = i32::from(bits);
    if value < (1 << (size - 1)) {
        value - (1 << size) + 1
    } else {
        value
    }
}

/// Build a length-limited optimal table from symbol counts, the way libjpeg's
/// `jpeg_gen_optimal_table` does.
///
/// A reserved pseudo-symbol keeps any real code from being all ones. A table
/// with no used symbols gets a single code for symbol 0 so it stays valid.
pub(crate) fn optimal_spec(counts: &[u32; 256]) -> HuffmanSpec {
    let mut freq = [0u64; 257];
    for (slot, &count) in freq.iter_mut().zip(counts.iter()) {
        *slot = u64::from(count);
    }
    if freq[..256].iter().all(|&f| f == 0) {
        freq[0] = 1;
    }
    freq[256] = 1;

    let mut codesize = [0usize; 257];
    let mut others = [usize::MAX; 257];

    loop {
        // Smallest nonzero frequency; ties go to the larger symbol.
        let mut c1 = None;
        let mut v = u64::MAX;
        for (i, &f) in freq.iter().enumerate() {
            if f != 0 && f <= v {
                v = f;
                c1 = Some(i);
            }
        }
        let Some(mut c1) = c1 else { break };

        let mut c2 = None;
        v = u64::MAX;
        for (i, &f) in freq.iter().enumerate() {
            if f != 0 && f <= v && i != c1 {
                v = f;
                c2 = Some(i);
            }
        }
        let Some(mut c2) = c2 else { break };

        freq[c1] += freq[c2];
        freq[c2] = 0;

        codesize[c1] += 1;
        while others[c1] != usize::MAX {
            c1 = others[c1];
            codesize[c1] += 1;
        }
        others[c1] = c2;

        codesize[c2] += 1;
        while others[c2] != usize::MAX {
            c2 = others[c2];
            codesize[c2] += 1;
        }
    }

    let max_len = codesize.iter().copied().max().unwrap_or(0).max(16);
    let mut bits = vec![0u32; max_len + 1];
    for &size in &codesize {
        if size > 0 {
            bits[size] += 1;
        }
    }

    // Limit code lengths to 16 bits (K.2 figure K.3).
    for i in (17..=max_len).rev() {
        while bits[i] > 0 {
            let mut j = i - 2;
            while bits[j] == 0 {
                j -= 1;
            }
            bits[i] -= 2;
            bits[i - 1] += 1;
            bits[j + 1] += 2;
            bits[j] -= 1;
        }
    }

    // Drop the pseudo-symbol from the longest length.
    let mut i = 16;
    while i > 0 && bits[i] == 0 {
        i -= 1;
    }
    if i > 0 {
        bits[i] -= 1;
    }

    let mut spec_bits = [0u8; 16];
    for (length, slot) in spec_bits.iter_mut().enumerate() {
        *slot = bits[length + 1] as u8;
    }

    let mut values = Vec::new();
    for size in 1..=max_len {
        for (symbol, &code_size) in codesize.iter().take(256).enumerate() {
            if code_size == size {
                values.push(symbol as u8);
            }
        }
    }

    HuffmanSpec {
        bits: spec_bits,
        values,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_optimal_tables_cover_and_fit(counts in proptest::collection::vec(0u32..100_000, 256)) {
            let mut array = [0u32; 256];
            array.copy_from_slice(&counts);
            let spec = optimal_spec(&array);
            prop_assert!(spec.code_count() <= 256);
            let table = EncodeTable::build(&spec);
            prop_assert!(table.is_some());
            let table = table.unwrap();
            prop_assert!(table.covers(&array));
            for symbol in 0..=255u8 {
                if let Some((code, length)) = table.lookup(symbol) {
                    prop_assert!(length <= 16);
                    // No code is all ones.
                    prop_assert!(u32::from(code) != (1u32 << length) - 1);
                }
            }
        }

        #[test]
        fn prop_skewed_counts_stay_within_16_bits(shift in 0u32..20) {
            // Fibonacci-like counts force deep trees before length limiting.
            let mut counts = [0u32; 256];
            let (mut a, mut b) = (1u32, 1u32);
            for slot in counts.iter_mut().take(30) {
                *slot = a.saturating_mul(1 << (shift % 4));
                let next = a.saturating_add(b);
                a = b;
                b = next;
            }
            let spec = optimal_spec(&counts);
            let table = EncodeTable::build(&spec);
            prop_assert!(table.is_some());
            prop_assert!(table.unwrap().covers(&counts));
        }
    }
}
