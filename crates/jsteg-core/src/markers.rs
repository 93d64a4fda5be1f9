//! JPEG marker codes (T.81 Table B.1).

pub const SOF0: u8 = 0xC0;
pub const SOF1: u8 = 0xC1;
pub const SOF2: u8 = 0xC2;
pub const SOF3: u8 = 0xC3;
pub const DHT: u8 = 0xC4;
pub const SOF15: u8 = 0xCF;
pub const DAC: u8 = 0xCC;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;
pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DNL: u8 = 0xDC;
pub const DRI: u8 = 0xDD;
pub const APP0: u8 = 0xE0;
pub const TEM: u8 = 0x01;

/// True for SOFn markers (C0..=CF except DHT, JPG and DAC).
pub fn is_sof(marker: u8) -> bool {
    (SOF0..=SOF15).contains(&marker) && !matches!(marker, DHT | 0xC8 | DAC)
}

/// True for markers that carry no length field.
pub fn is_standalone(marker: u8) -> bool {
    matches!(marker, TEM | SOI | EOI | RST0..=RST7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sof_classification() {
        assert!(is_sof(SOF0));
        assert!(is_sof(SOF2));
        assert!(is_sof(SOF15));
        assert!(!is_sof(DHT));
        assert!(!is_sof(DAC));
        assert!(!is_sof(SOI));
    }

    #[test]
    fn test_standalone_markers() {
        assert!(is_standalone(SOI));
        assert!(is_standalone(0xD5));
        assert!(!is_standalone(SOS));
    }
}
