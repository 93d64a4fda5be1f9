//! Encoding metadata carried alongside the coefficient planes.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::coefficients::BLOCK_LEN;
use crate::layout::FrameLayout;

/// JPEG quality on the libjpeg scale.
///
/// Values are clamped into `1..=100`; 0 behaves like 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: Quality = Quality(75);
    pub const MIN: Quality = Quality(1);
    pub const MAX: Quality = Quality(100);

    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN.0, Self::MAX.0))
    }

    #[inline]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Quality {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// Recognized chroma layouts for three-component images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    /// Full-resolution chroma.
    #[default]
    Yuv444,
    /// Chroma halved horizontally.
    Yuv422,
    /// Chroma halved in both directions.
    Yuv420,
    /// Chroma halved vertically.
    Yuv440,
}

impl ChromaSubsampling {
    /// Luma sampling factors `(h, v)` of this layout when chroma uses `(1, 1)`.
    pub fn luma_sampling(self) -> (u8, u8) {
        match self {
            ChromaSubsampling::Yuv444 => (1, 1),
            ChromaSubsampling::Yuv422 => (2, 1),
            ChromaSubsampling::Yuv420 => (2, 2),
            ChromaSubsampling::Yuv440 => (1, 2),
        }
    }

    /// Layout whose chroma is reduced by the given horizontal and vertical ratios.
    pub fn from_ratios(h_ratio: u8, v_ratio: u8) -> Option<Self> {
        match (h_ratio, v_ratio) {
            (1, 1) => Some(ChromaSubsampling::Yuv444),
            (2, 1) => Some(ChromaSubsampling::Yuv422),
            (2, 2) => Some(ChromaSubsampling::Yuv420),
            (1, 2) => Some(ChromaSubsampling::Yuv440),
            _ => None,
        }
    }
}

/// Quantization table in natural (row-major) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuantTable {
    values: [u16; BLOCK_LEN],
}

impl QuantTable {
    pub fn new(values: [u16; BLOCK_LEN]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[u16; BLOCK_LEN] {
        &self.values
    }

    /// Quantizer for coefficient `index` (natural order).
    #[inline]
    pub fn get(&self, index: usize) -> u16 {
        self.values[index]
    }

    /// True if any entry needs a 16-bit DQT entry.
    pub fn needs_16_bit(&self) -> bool {
        self.values.iter().any(|&q| q > 255)
    }
}

// serde only derives arrays up to 32 elements.
impl Serialize for QuantTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(BLOCK_LEN))?;
        for value in &self.values {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for QuantTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = QuantTable;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "a sequence of {BLOCK_LEN} quantizers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<QuantTable, A::Error> {
                let mut values = [0u16; BLOCK_LEN];
                for (i, slot) in values.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<u16>()?.is_some() {
                    return Err(de::Error::invalid_length(BLOCK_LEN + 1, &self));
                }
                Ok(QuantTable::new(values))
            }
        }

        deserializer.deserialize_seq(TableVisitor)
    }
}

/// One frame component as declared in the SOF segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Component identifier written in SOF/SOS.
    pub id: u8,
    /// Horizontal sampling factor (1..=4).
    pub h_sampling: u8,
    /// Vertical sampling factor (1..=4).
    pub v_sampling: u8,
    /// Quantization table slot (0..=3).
    pub quant_table: u8,
}

/// Everything besides the coefficients needed to re-encode an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Frame components in plane order (1 for grayscale, 3 for YCbCr).
    pub components: Vec<ComponentInfo>,
    /// Quantization tables indexed by slot.
    pub quant_tables: [Option<QuantTable>; 4],
    /// MCUs between restart markers; 0 disables restarts.
    pub restart_interval: u16,
    /// Quality the tables were built from, when known.
    pub quality: Option<Quality>,
}

impl ImageMetadata {
    pub fn is_grayscale(&self) -> bool {
        self.components.len() == 1
    }

    /// Largest horizontal and vertical sampling factors in the frame.
    pub fn max_sampling(&self) -> (u8, u8) {
        self.components.iter().fold((1, 1), |(h, v), c| {
            (h.max(c.h_sampling), v.max(c.v_sampling))
        })
    }

    /// Block grid `(blocks_wide, blocks_tall)` of component `component`,
    /// padded to whole MCUs.
    pub fn plane_dimensions(&self, component: usize) -> Option<(usize, usize)> {
        let layout = FrameLayout::from_metadata(self)?;
        (component < layout.component_count()).then(|| layout.plane_dimensions(component))
    }

    /// Reduction ratios `(h, v)` of `component` relative to the largest sampling factors.
    ///
    /// Returns `None` when the factors do not divide evenly.
    pub fn subsampling(&self, component: usize) -> Option<(u8, u8)> {
        let info = self.components.get(component)?;
        let (max_h, max_v) = self.max_sampling();
        if info.h_sampling == 0
            || info.v_sampling == 0
            || max_h % info.h_sampling != 0
            || max_v % info.v_sampling != 0
        {
            return None;
        }
        Some((max_h / info.h_sampling, max_v / info.v_sampling))
    }

    /// Recognized chroma layout of a three-component frame.
    pub fn chroma_subsampling(&self) -> Option<ChromaSubsampling> {
        if self.components.len() != 3 {
            return None;
        }
        if self.subsampling(0)? != (1, 1) {
            return None;
        }
        let cb = self.subsampling(1)?;
        if self.subsampling(2)? != cb {
            return None;
        }
        ChromaSubsampling::from_ratios(cb.0, cb.1)
    }

    /// Quantization table used by `component`.
    pub fn quant_table_for(&self, component: usize) -> Option<&QuantTable> {
        let info = self.components.get(component)?;
        self.quant_tables.get(info.quant_table as usize)?.as_ref()
    }
}
