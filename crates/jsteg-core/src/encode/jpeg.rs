//! Baseline JPEG coefficient encoder.
//!
//! Encoding is split at the quantized coefficients: [`JpegEncoder::begin_encode`]
//! converts an RGBA raster into planes, and [`JpegEncoder::resume_encode`]
//! writes whatever planes it is handed back. Nothing between quantization and
//! entropy coding touches the coefficients, so the written stream carries
//! exactly the values the caller saw.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CoefficientEncoder, EncodeParams, EncodeSession};
use crate::coefficients::{ChannelPlanes, PLANE_COUNT};
use crate::decode::Raster;
use crate::huffman::{optimal_spec, EncodeTable, HuffmanSpec};
use crate::layout::{FrameLayout, MAX_BLOCKS_PER_MCU};
use crate::markers;
use crate::metadata::{ComponentInfo, ImageMetadata, QuantTable};
use crate::tables::{scaled_quant_table, STD_CHROMA_QUANT, STD_LUMA_QUANT, ZIGZAG_TO_NATURAL};

use super::fdct::forward_planes;
use super::scan::{walk_scan, HuffmanWriter, ScanPlan, SymbolCounts};

/// Largest width or height a SOF segment can carry.
const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Errors that can occur during JPEG encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 4), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero or does not fit a JPEG frame
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be in 1..=65535")]
    InvalidDimensions { width: u32, height: u32 },

    /// Metadata cannot describe a baseline frame
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Planes don't match the block grid the metadata implies
    #[error("Plane {plane} does not match the frame: {reason}")]
    PlaneMismatch { plane: usize, reason: String },

    /// A coefficient is too large for category 15
    #[error("Coefficient {index} of block {block} in plane {plane} is out of range: {value}")]
    CoefficientOutOfRange {
        plane: usize,
        block: usize,
        index: usize,
        value: i32,
    },

    /// Consecutive DC values differ by more than category 15 allows
    #[error("DC difference at block {block} in plane {plane} is out of range: {diff}")]
    DcDifferenceOutOfRange { plane: usize, block: usize, diff: i64 },

    /// JPEG encoding failed
    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),
}

/// How Huffman tables are chosen for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HuffmanStrategy {
    /// Annex K tables, replaced by optimized ones only when a symbol is missing.
    #[default]
    Standard,
    /// Tables built from the symbol statistics of each image.
    Optimized,
}

/// Encoder settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub huffman: HuffmanStrategy,
    /// MCUs between restart markers; 0 disables them.
    pub restart_interval: u16,
}

/// Baseline sequential JPEG encoder.
#[derive(Debug, Clone, Default)]
pub struct JpegEncoder {
    config: EncoderConfig,
}

/// Carried from `begin_encode` to `resume_encode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegResume {
    metadata: ImageMetadata,
}

impl JpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

impl CoefficientEncoder for JpegEncoder {
    type Resume = JpegResume;

    fn begin_encode(
        &self,
        raster: &Raster,
        params: &EncodeParams,
    ) -> Result<EncodeSession<JpegResume>, EncodeError> {
        validate_raster(raster)?;
        let metadata = frame_metadata(raster.width, raster.height, params, self.config.restart_interval);
        let layout = layout_for(&metadata)?;
        let planes = forward_planes(raster, &metadata, &layout)?;

        log::debug!(
            "Quantized {}x{} raster at quality {} ({:?}): {} blocks",
            raster.width,
            raster.height,
            params.quality.value(),
            params.subsampling,
            planes.total_blocks()
        );
        Ok(EncodeSession {
            planes,
            metadata: metadata.clone(),
            resume: JpegResume { metadata },
        })
    }

    fn resume_encode(&self, resume: JpegResume, planes: &ChannelPlanes) -> Result<Vec<u8>, EncodeError> {
        self.encode_coefficients(planes, &resume.metadata)
    }

    fn encode_coefficients(
        &self,
        planes: &ChannelPlanes,
        metadata: &ImageMetadata,
    ) -> Result<Vec<u8>, EncodeError> {
        let layout = layout_for(metadata)?;
        validate_frame(planes, metadata, &layout)?;

        let count = layout.component_count();
        let plan = ScanPlan {
            layout: &layout,
            components: (0..count).collect(),
            table_slots: (0..count).map(|c| usize::from(c > 0)).collect(),
            restart_interval: metadata.restart_interval,
        };
        let slots = if count > 1 { 2 } else { 1 };

        let mut counts = SymbolCounts::default();
        walk_scan(planes, &plan, &mut counts)?;
        let (dc_specs, ac_specs) = self.select_tables(&counts, slots);

        let dc_tables = build_tables(&dc_specs)?;
        let ac_tables = build_tables(&ac_specs)?;
        let mut writer = HuffmanWriter::new(&dc_tables, &ac_tables);
        walk_scan(planes, &plan, &mut writer)?;
        let entropy = writer.finish();
        log::trace!("Scan over {count} components: {} bytes", entropy.len());

        let mut out = Vec::with_capacity(entropy.len() + 1024);
        out.extend_from_slice(&[0xFF, markers::SOI]);
        write_segment(&mut out, markers::APP0, &JFIF_HEADER)?;
        write_segment(&mut out, markers::DQT, &quant_payload(metadata)?)?;
        let sof = if uses_16_bit_tables(metadata) {
            markers::SOF1
        } else {
            markers::SOF0
        };
        write_segment(&mut out, sof, &frame_payload(metadata))?;
        write_segment(&mut out, markers::DHT, &huffman_payload(&dc_specs, &ac_specs))?;
        if metadata.restart_interval > 0 {
            write_segment(&mut out, markers::DRI, &metadata.restart_interval.to_be_bytes())?;
        }
        write_segment(&mut out, markers::SOS, &scan_payload(metadata, &plan.table_slots))?;
        out.extend_from_slice(&entropy);
        out.extend_from_slice(&[0xFF, markers::EOI]);

        log::debug!(
            "Encoded {}x{} JPEG: {} components, {} blocks, {} bytes",
            metadata.width,
            metadata.height,
            count,
            planes.total_blocks(),
            out.len()
        );
        Ok(out)
    }
}

impl JpegEncoder {
    fn select_tables(&self, counts: &SymbolCounts, slots: usize) -> (Vec<HuffmanSpec>, Vec<HuffmanSpec>) {
        let standard_dc = [HuffmanSpec::std_dc_luma(), HuffmanSpec::std_dc_chroma()];
        let standard_ac = [HuffmanSpec::std_ac_luma(), HuffmanSpec::std_ac_chroma()];
        let pick = |standard: &HuffmanSpec, counts: &[u32; 256], class: &str, slot: usize| {
            match self.config.huffman {
                HuffmanStrategy::Optimized => optimal_spec(counts),
                HuffmanStrategy::Standard => {
                    let covered = EncodeTable::build(standard).is_some_and(|t| t.covers(counts));
                    if covered {
                        standard.clone()
                    } else {
                        log::debug!("Standard {class} table {slot} lacks a needed symbol, using optimized table");
                        optimal_spec(counts)
                    }
                }
            }
        };
        let dc = (0..slots)
            .map(|slot| pick(&standard_dc[slot], &counts.dc[slot], "DC", slot))
            .collect();
        let ac = (0..slots)
            .map(|slot| pick(&standard_ac[slot], &counts.ac[slot], "AC", slot))
            .collect();
        (dc, ac)
    }
}

/// Metadata of the frame `begin_encode` produces: JFIF component ids, luma
/// sampling from the requested layout, tables 0 and 1 scaled by quality.
pub(crate) fn frame_metadata(
    width: u32,
    height: u32,
    params: &EncodeParams,
    restart_interval: u16,
) -> ImageMetadata {
    let (h, v) = params.subsampling.luma_sampling();
    let component = |id: u8, h_sampling: u8, v_sampling: u8, quant_table: u8| ComponentInfo {
        id,
        h_sampling,
        v_sampling,
        quant_table,
    };
    ImageMetadata {
        width,
        height,
        components: vec![component(1, h, v, 0), component(2, 1, 1, 1), component(3, 1, 1, 1)],
        quant_tables: [
            Some(scaled_quant_table(&STD_LUMA_QUANT, params.quality)),
            Some(scaled_quant_table(&STD_CHROMA_QUANT, params.quality)),
            None,
            None,
        ],
        restart_interval,
        quality: Some(params.quality),
    }
}

fn validate_raster(raster: &Raster) -> Result<(), EncodeError> {
    let (width, height) = (raster.width, raster.height);
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    let expected = width as usize * height as usize * 4;
    if raster.pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: raster.pixels.len(),
        });
    }
    Ok(())
}

fn layout_for(metadata: &ImageMetadata) -> Result<FrameLayout, EncodeError> {
    let (width, height) = (metadata.width, metadata.height);
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    if !matches!(metadata.components.len(), 1 | 3) {
        return Err(EncodeError::InvalidMetadata(format!(
            "{} components; only 1 or 3 can be encoded",
            metadata.components.len()
        )));
    }
    FrameLayout::from_metadata(metadata)
        .ok_or_else(|| EncodeError::InvalidMetadata("sampling factors must be in 1..=4".to_string()))
}

/// Check that `planes` hold exactly the block grids `layout` implies and that
/// every component has a table.
fn validate_frame(
    planes: &ChannelPlanes,
    metadata: &ImageMetadata,
    layout: &FrameLayout,
) -> Result<(), EncodeError> {
    let count = layout.component_count();
    for component in 0..count {
        let plane = &planes[component];
        let (wide, tall) = layout.plane_dimensions(component);
        if (plane.blocks_wide, plane.blocks_tall) != (wide, tall) {
            return Err(EncodeError::PlaneMismatch {
                plane: component,
                reason: format!(
                    "grid is {}x{} blocks, frame needs {wide}x{tall}",
                    plane.blocks_wide, plane.blocks_tall
                ),
            });
        }
        if plane.len() != wide * tall {
            return Err(EncodeError::PlaneMismatch {
                plane: component,
                reason: format!("{} blocks for a {wide}x{tall} grid", plane.len()),
            });
        }
        let slot = metadata.components[component].quant_table;
        if metadata.quant_table_for(component).is_none() {
            return Err(EncodeError::InvalidMetadata(format!(
                "component {component} uses undefined quantization table {slot}"
            )));
        }
    }
    for plane in count..PLANE_COUNT {
        if !planes[plane].is_empty() {
            return Err(EncodeError::PlaneMismatch {
                plane,
                reason: "grayscale frame carries chroma blocks".to_string(),
            });
        }
    }

    let components: Vec<usize> = (0..count).collect();
    if count > 1 && layout.blocks_per_mcu(&components) > MAX_BLOCKS_PER_MCU {
        return Err(EncodeError::InvalidMetadata(format!(
            "interleaved MCU would hold more than {MAX_BLOCKS_PER_MCU} blocks"
        )));
    }
    let mut ids: Vec<u8> = metadata.components.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != count {
        return Err(EncodeError::InvalidMetadata("component ids must be unique".to_string()));
    }
    Ok(())
}

fn build_tables(specs: &[HuffmanSpec]) -> Result<Vec<EncodeTable>, EncodeError> {
    specs
        .iter()
        .map(|spec| {
            EncodeTable::build(spec)
                .ok_or_else(|| EncodeError::EncodingFailed("malformed Huffman table".to_string()))
        })
        .collect()
}

const JFIF_HEADER: [u8; 14] = [
    b'J', b'F', b'I', b'F', 0, // identifier
    1, 1, // version 1.01
    0, // no density units
    0, 1, 0, 1, // 1:1 aspect ratio
    0, 0, // no thumbnail
];

fn write_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) -> Result<(), EncodeError> {
    let length = u16::try_from(payload.len() + 2).map_err(|_| {
        EncodeError::EncodingFailed(format!("segment 0x{marker:02X} is too long"))
    })?;
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Table slots referenced by the frame, in ascending order.
fn used_quant_slots(metadata: &ImageMetadata) -> Vec<u8> {
    let mut slots: Vec<u8> = metadata.components.iter().map(|c| c.quant_table).collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

fn used_quant_tables(metadata: &ImageMetadata) -> impl Iterator<Item = (u8, Option<&QuantTable>)> {
    used_quant_slots(metadata)
        .into_iter()
        .map(|slot| (slot, metadata.quant_tables.get(slot as usize).and_then(Option::as_ref)))
}

fn uses_16_bit_tables(metadata: &ImageMetadata) -> bool {
    used_quant_tables(metadata).any(|(_, table)| table.is_some_and(QuantTable::needs_16_bit))
}

fn quant_payload(metadata: &ImageMetadata) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();
    for (slot, table) in used_quant_tables(metadata) {
        let table = table.ok_or_else(|| {
            EncodeError::InvalidMetadata(format!("quantization table {slot} is not defined"))
        })?;
        if table.values().iter().any(|&q| q == 0) {
            return Err(EncodeError::InvalidMetadata(format!(
                "quantization table {slot} contains a zero"
            )));
        }
        if table.needs_16_bit() {
            payload.push(0x10 | slot);
            for &natural in &ZIGZAG_TO_NATURAL {
                payload.extend_from_slice(&table.get(natural).to_be_bytes());
            }
        } else {
            payload.push(slot);
            payload.extend(ZIGZAG_TO_NATURAL.iter().map(|&natural| table.get(natural) as u8));
        }
    }
    Ok(payload)
}

fn frame_payload(metadata: &ImageMetadata) -> Vec<u8> {
    let mut payload = vec![8];
    payload.extend_from_slice(&(metadata.height as u16).to_be_bytes());
    payload.extend_from_slice(&(metadata.width as u16).to_be_bytes());
    payload.push(metadata.components.len() as u8);
    for c in &metadata.components {
        payload.extend_from_slice(&[c.id, (c.h_sampling << 4) | c.v_sampling, c.quant_table]);
    }
    payload
}

fn huffman_payload(dc: &[HuffmanSpec], ac: &[HuffmanSpec]) -> Vec<u8> {
    let mut payload = Vec::new();
    let classes = dc.iter().enumerate().map(|(slot, spec)| (slot as u8, spec)).chain(
        ac.iter()
            .enumerate()
            .map(|(slot, spec)| (0x10 | slot as u8, spec)),
    );
    for (class_and_id, spec) in classes {
        payload.push(class_and_id);
        payload.extend_from_slice(&spec.bits);
        payload.extend_from_slice(&spec.values);
    }
    payload
}

fn scan_payload(metadata: &ImageMetadata, table_slots: &[usize]) -> Vec<u8> {
    let mut payload = vec![metadata.components.len() as u8];
    for (c, &slot) in metadata.components.iter().zip(table_slots) {
        let slot = slot as u8;
        payload.extend_from_slice(&[c.id, (slot << 4) | slot]);
    }
    payload.extend_from_slice(&[0, 63, 0]);
    payload
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::codec::CoefficientDecoder;
    use crate::coefficients::{ChannelPlane, BLOCK_LEN};
    use crate::decode::JpegDecoder;
    use crate::metadata::{ChromaSubsampling, Quality};
    use proptest::prelude::*;

    fn subsampling_strategy() -> impl Strategy<Value = ChromaSubsampling> {
        prop_oneof![
            Just(ChromaSubsampling::Yuv444),
            Just(ChromaSubsampling::Yuv422),
            Just(ChromaSubsampling::Yuv420),
            Just(ChromaSubsampling::Yuv440),
        ]
    }

    fn fill(plane: &mut ChannelPlane, values: &[i32]) {
        for (i, block) in plane.iter_mut().enumerate() {
            for (k, c) in block.iter_mut().enumerate() {
                *c = values[(i * BLOCK_LEN + k) % values.len()];
            }
        }
    }

    proptest! {
        /// Property: arbitrary in-range coefficients decode back exactly.
        #[test]
        fn prop_coefficients_survive_encoding(
            (width, height) in (1u32..=40, 1u32..=40),
            subsampling in subsampling_strategy(),
            values in prop::collection::vec(-1023i32..=1023, 1..200),
            restart_interval in 0u16..=3,
            optimized in any::<bool>(),
        ) {
            let metadata = frame_metadata(
                width,
                height,
                &EncodeParams { quality: Quality::new(80), subsampling },
                restart_interval,
            );
            let layout = FrameLayout::from_metadata(&metadata).unwrap();
            let mut planes = [0, 1, 2].map(|c| {
                let (wide, tall) = layout.plane_dimensions(c);
                ChannelPlane::new(wide, tall)
            });
            for plane in planes.iter_mut() {
                fill(plane, &values);
            }
            let [luma, cb, cr] = planes;
            let planes = ChannelPlanes::new(luma, cb, cr);

            let encoder = JpegEncoder::with_config(EncoderConfig {
                huffman: if optimized { HuffmanStrategy::Optimized } else { HuffmanStrategy::Standard },
                restart_interval,
            });
            let bytes = encoder.encode_coefficients(&planes, &metadata).unwrap();
            let decoded = JpegDecoder::new().decode(&bytes).unwrap();
            prop_assert_eq!(decoded.planes, planes);
        }

        /// Property: the same raster and parameters give identical bytes.
        #[test]
        fn prop_deterministic_output(
            (width, height) in (1u32..=24, 1u32..=24),
            quality in 1u8..=100,
            subsampling in subsampling_strategy(),
            seed in any::<u8>(),
        ) {
            let pixels: Vec<u8> = (0..width * height * 4)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let raster = Raster::new(width, height, pixels);
            let encoder = JpegEncoder::new();
            let params = EncodeParams { quality: Quality::new(quality), subsampling };

            let first = encoder.begin_encode(&raster, &params).unwrap();
            let first = encoder.resume_encode(first.resume, &first.planes).unwrap();
            let second = encoder.begin_encode(&raster, &params).unwrap();
            let second = encoder.resume_encode(second.resume, &second.planes).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property: zero dimensions always return an error.
        #[test]
        fn prop_zero_dimensions_return_error(width in 0u32..=1, height in 0u32..=1) {
            prop_assume!(width == 0 || height == 0);
            let raster = Raster { width, height, pixels: Vec::new() };
            let result = JpegEncoder::new().begin_encode(&raster, &EncodeParams::default());
            prop_assert!(
                matches!(result, Err(EncodeError::InvalidDimensions { .. })),
                "Zero dimensions should return InvalidDimensions error"
            );
        }
    }
}
