//! Sequential Huffman JPEG decoding to quantized DCT coefficients.
//!
//! Handles baseline (SOF0) and extended sequential (SOF1) 8-bit frames with
//! one or three components, interleaved or non-interleaved scans, and restart
//! intervals. Entropy-coded data that ends early is zero-filled the way
//! libjpeg does, with a warning.

use crate::codec::{CoefficientDecoder, DecodedCoefficients};
use crate::coefficients::{ChannelPlane, ChannelPlanes, CoefficientBlock, BLOCK_LEN};
use crate::huffman::{DecodeTable, HuffmanSpec};
use crate::layout::{restart_due, FrameLayout, MAX_BLOCKS_PER_MCU};
use crate::markers;
use crate::metadata::{ComponentInfo, ImageMetadata, QuantTable, Quality};
use crate::tables::{scaled_quant_table, STD_LUMA_QUANT, ZIGZAG_TO_NATURAL};

use super::bits::{entropy_segment_end, BitReader};
use super::DecodeError;

/// Upper bound on blocks per frame unless configured otherwise (256 MiB of
/// coefficients, about 44 megapixels of 4:2:0 data).
pub const DEFAULT_MAX_BLOCKS: usize = 1 << 20;

/// Most blocks one byte of entropy-coded data is assumed able to carry.
///
/// A coded block costs at least two bits, and MCU padding that a
/// non-interleaved scan skips can quadruple the block count.
const BLOCKS_PER_BYTE: usize = 16;

/// Blocks accepted regardless of how little entropy-coded data follows.
const BLOCK_SLACK: usize = 1024;

/// Coefficient decoder for sequential Huffman JPEG streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegDecoder {
    max_blocks: usize,
}

impl JpegDecoder {
    pub fn new() -> Self {
        Self {
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }

    /// Refuse frames that would need more than `max_blocks` coefficient blocks.
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }
}

impl Default for JpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoefficientDecoder for JpegDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedCoefficients, DecodeError> {
        let mut parser = Parser::new(bytes, Mode::Full, self.max_blocks)?;
        parser.run()?;
        let metadata = parser.metadata()?;
        let mut planes = parser.planes.into_iter();
        let luma = planes.next().unwrap_or_default();
        let planes = match (planes.next(), planes.next()) {
            (Some(cb), Some(cr)) => ChannelPlanes::new(luma, cb, cr),
            _ => ChannelPlanes::grayscale(luma),
        };
        log::debug!(
            "Decoded {}x{} JPEG: {} components, {} blocks",
            metadata.width,
            metadata.height,
            metadata.components.len(),
            planes.total_blocks()
        );
        Ok(DecodedCoefficients { planes, metadata })
    }

    fn read_header(&self, bytes: &[u8]) -> Result<ImageMetadata, DecodeError> {
        let mut parser = Parser::new(bytes, Mode::Header, self.max_blocks)?;
        parser.run()?;
        parser.metadata()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Stop at the first SOS.
    Header,
    Full,
}

struct Frame {
    width: u32,
    height: u32,
    components: Vec<ComponentInfo>,
    layout: FrameLayout,
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    mode: Mode,
    max_blocks: usize,
    frame: Option<Frame>,
    quant_tables: [Option<QuantTable>; 4],
    dc_tables: [Option<HuffmanSpec>; 4],
    ac_tables: [Option<HuffmanSpec>; 4],
    restart_interval: u16,
    planes: Vec<ChannelPlane>,
    scans: usize,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8], mode: Mode, max_blocks: usize) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        if !data.starts_with(&[0xFF, markers::SOI]) {
            return Err(DecodeError::NotJpeg);
        }
        Ok(Self {
            data,
            pos: 2,
            mode,
            max_blocks,
            frame: None,
            quant_tables: Default::default(),
            dc_tables: Default::default(),
            ac_tables: Default::default(),
            restart_interval: 0,
            planes: Vec::new(),
            scans: 0,
        })
    }

    fn run(&mut self) -> Result<(), DecodeError> {
        loop {
            let Some(marker) = self.next_marker() else {
                log::warn!("JPEG stream ends without EOI marker");
                return Ok(());
            };
            match marker {
                markers::EOI => return Ok(()),
                markers::SOI => {
                    return Err(DecodeError::InvalidSegment("unexpected SOI marker".to_string()))
                }
                m if markers::is_standalone(m) => {
                    log::debug!("Ignoring stray marker 0x{m:02X}");
                }
                markers::SOF0 | markers::SOF1 => {
                    let body = self.segment()?;
                    self.read_frame(body)?;
                }
                m if markers::is_sof(m) => {
                    return Err(DecodeError::Unsupported(sof_process(m).to_string()));
                }
                markers::DAC => {
                    return Err(DecodeError::Unsupported("arithmetic coding".to_string()));
                }
                markers::DHT => {
                    let body = self.segment()?;
                    self.read_huffman_tables(body)?;
                }
                markers::DQT => {
                    let body = self.segment()?;
                    self.read_quant_tables(body)?;
                }
                markers::DRI => {
                    let body = self.segment()?;
                    self.read_restart_interval(body)?;
                }
                markers::SOS => {
                    let body = self.segment()?;
                    if self.frame.is_none() {
                        return Err(DecodeError::InvalidSegment("SOS before SOF".to_string()));
                    }
                    if self.mode == Mode::Header {
                        self.scans += 1;
                        return Ok(());
                    }
                    self.read_scan(body)?;
                }
                _ => {
                    // APPn, COM, DNL and the rest carry nothing we need.
                    self.segment()?;
                }
            }
        }
    }

    /// Next marker code, skipping fill bytes and any garbage before it.
    fn next_marker(&mut self) -> Option<u8> {
        let mut skipped = 0usize;
        loop {
            while self.pos < self.data.len() && self.data[self.pos] != 0xFF {
                self.pos += 1;
                skipped += 1;
            }
            while self.pos < self.data.len() && self.data[self.pos] == 0xFF {
                self.pos += 1;
            }
            let marker = *self.data.get(self.pos)?;
            self.pos += 1;
            if marker != 0x00 {
                if skipped > 0 {
                    log::warn!("Skipped {skipped} extraneous bytes before marker 0x{marker:02X}");
                }
                return Some(marker);
            }
            skipped += 2;
        }
    }

    /// Body of the length-prefixed segment at the cursor.
    fn segment(&mut self) -> Result<&'a [u8], DecodeError> {
        let data = self.data;
        let header = data.get(self.pos..self.pos + 2).ok_or(DecodeError::Truncated)?;
        let length = u16::from_be_bytes([header[0], header[1]]) as usize;
        if length < 2 {
            return Err(DecodeError::InvalidSegment(format!(
                "segment length {length} is below 2"
            )));
        }
        let body = data
            .get(self.pos + 2..self.pos + length)
            .ok_or(DecodeError::Truncated)?;
        self.pos += length;
        Ok(body)
    }

    fn read_frame(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        if self.frame.is_some() {
            return Err(DecodeError::InvalidSegment("more than one frame header".to_string()));
        }
        if body.len() < 6 {
            return Err(DecodeError::InvalidSegment("SOF segment too short".to_string()));
        }
        let precision = body[0];
        if precision != 8 {
            return Err(DecodeError::Unsupported(format!("{precision}-bit sample precision")));
        }
        let height = u16::from_be_bytes([body[1], body[2]]) as u32;
        let width = u16::from_be_bytes([body[3], body[4]]) as u32;
        let count = body[5] as usize;
        if height == 0 {
            return Err(DecodeError::Unsupported("frame height defined by DNL".to_string()));
        }
        if width == 0 {
            return Err(DecodeError::InvalidSegment("frame width is zero".to_string()));
        }
        if count != 1 && count != 3 {
            return Err(DecodeError::Unsupported(format!("{count}-component frames")));
        }
        if body.len() != 6 + 3 * count {
            return Err(DecodeError::InvalidSegment(
                "SOF length does not match its component count".to_string(),
            ));
        }

        let mut components = Vec::with_capacity(count);
        for spec in body[6..].chunks_exact(3) {
            let info = ComponentInfo {
                id: spec[0],
                h_sampling: spec[1] >> 4,
                v_sampling: spec[1] & 0x0F,
                quant_table: spec[2],
            };
            if !(1..=4).contains(&info.h_sampling) || !(1..=4).contains(&info.v_sampling) {
                return Err(DecodeError::InvalidSegment(format!(
                    "component {} has sampling factors {}x{}",
                    info.id, info.h_sampling, info.v_sampling
                )));
            }
            if info.quant_table > 3 {
                return Err(DecodeError::InvalidSegment(format!(
                    "component {} uses quantization table {}",
                    info.id, info.quant_table
                )));
            }
            if components.iter().any(|c: &ComponentInfo| c.id == info.id) {
                return Err(DecodeError::InvalidSegment(format!(
                    "duplicate component id {}",
                    info.id
                )));
            }
            components.push(info);
        }

        let probe = ImageMetadata {
            width,
            height,
            components: components.clone(),
            quant_tables: Default::default(),
            restart_interval: 0,
            quality: None,
        };
        let layout = FrameLayout::from_metadata(&probe)
            .ok_or_else(|| DecodeError::InvalidSegment("invalid frame geometry".to_string()))?;

        let total_blocks: usize = (0..count)
            .map(|c| {
                let (wide, tall) = layout.plane_dimensions(c);
                wide * tall
            })
            .sum();
        if total_blocks > self.max_blocks {
            return Err(DecodeError::Unsupported(format!(
                "frame needs {total_blocks} blocks, limit is {}",
                self.max_blocks
            )));
        }

        log::debug!(
            "Frame {}x{}, sampling {:?}",
            width,
            height,
            components
                .iter()
                .map(|c| (c.h_sampling, c.v_sampling))
                .collect::<Vec<_>>()
        );
        self.frame = Some(Frame {
            width,
            height,
            components,
            layout,
        });
        Ok(())
    }

    fn read_quant_tables(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let mut rest = body;
        while let Some(&header) = rest.first() {
            let precision = header >> 4;
            let slot = (header & 0x0F) as usize;
            if slot > 3 {
                return Err(DecodeError::InvalidSegment(format!(
                    "quantization table slot {slot}"
                )));
            }
            let size = match precision {
                0 => BLOCK_LEN,
                1 => BLOCK_LEN * 2,
                _ => {
                    return Err(DecodeError::InvalidSegment(format!(
                        "quantization table precision {precision}"
                    )))
                }
            };
            let entries = rest
                .get(1..1 + size)
                .ok_or_else(|| DecodeError::InvalidSegment("DQT segment too short".to_string()))?;
            let mut values = [0u16; BLOCK_LEN];
            for (k, &natural) in ZIGZAG_TO_NATURAL.iter().enumerate() {
                values[natural] = if precision == 0 {
                    u16::from(entries[k])
                } else {
                    u16::from_be_bytes([entries[2 * k], entries[2 * k + 1]])
                };
            }
            self.quant_tables[slot] = Some(QuantTable::new(values));
            rest = &rest[1 + size..];
        }
        Ok(())
    }

    fn read_huffman_tables(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let mut rest = body;
        while !rest.is_empty() {
            if rest.len() < 17 {
                return Err(DecodeError::InvalidSegment("DHT segment too short".to_string()));
            }
            let class = rest[0] >> 4;
            let slot = (rest[0] & 0x0F) as usize;
            if class > 1 || slot > 3 {
                return Err(DecodeError::InvalidSegment(format!(
                    "Huffman table class {class} slot {slot}"
                )));
            }
            let mut bits = [0u8; 16];
            bits.copy_from_slice(&rest[1..17]);
            let count: usize = bits.iter().map(|&n| n as usize).sum();
            let values = rest
                .get(17..17 + count)
                .ok_or_else(|| DecodeError::InvalidSegment("DHT segment too short".to_string()))?;
            let spec = HuffmanSpec {
                bits,
                values: values.to_vec(),
            };
            if class == 0 {
                self.dc_tables[slot] = Some(spec);
            } else {
                self.ac_tables[slot] = Some(spec);
            }
            rest = &rest[17 + count..];
        }
        Ok(())
    }

    fn read_restart_interval(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        let [hi, lo] = body else {
            return Err(DecodeError::InvalidSegment("DRI segment must be 4 bytes".to_string()));
        };
        self.restart_interval = u16::from_be_bytes([*hi, *lo]);
        Ok(())
    }

    fn read_scan(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        if self.planes.is_empty() {
            self.planes = self.allocate_planes()?;
        }
        let Some(frame) = self.frame.as_ref() else {
            return Err(DecodeError::InvalidSegment("SOS before SOF".to_string()));
        };
        let count = body.first().copied().unwrap_or(0) as usize;
        if count == 0 || count > 4 || body.len() != 4 + 2 * count {
            return Err(DecodeError::InvalidSegment("malformed SOS segment".to_string()));
        }

        let mut components = Vec::with_capacity(count);
        let mut dc = Vec::with_capacity(count);
        let mut ac = Vec::with_capacity(count);
        for spec in body[1..1 + 2 * count].chunks_exact(2) {
            let id = spec[0];
            let component = frame
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| {
                    DecodeError::InvalidSegment(format!("scan references unknown component {id}"))
                })?;
            if components.contains(&component) {
                return Err(DecodeError::InvalidSegment(format!(
                    "component {id} appears twice in one scan"
                )));
            }
            components.push(component);
            dc.push(self.decode_table(0, spec[1] >> 4)?);
            ac.push(self.decode_table(1, spec[1] & 0x0F)?);
        }

        let tail = &body[1 + 2 * count..];
        if tail != [0, 63, 0] {
            return Err(DecodeError::Unsupported(
                "spectral selection or successive approximation".to_string(),
            ));
        }
        if count > 1 && frame.layout.blocks_per_mcu(&components) > MAX_BLOCKS_PER_MCU {
            return Err(DecodeError::InvalidSegment(format!(
                "interleaved MCU holds more than {MAX_BLOCKS_PER_MCU} blocks"
            )));
        }

        let data = self.data;
        let end = entropy_segment_end(data, self.pos);
        let mut reader = BitReader::new(&data[self.pos..end]);
        let mut predictors = vec![0i32; count];
        let mut missing_restarts = 0usize;
        let restart_interval = self.restart_interval;
        let planes = &mut self.planes;

        frame.layout.for_each_block(&components, |step| {
            if restart_due(&step, restart_interval) {
                if !reader.restart() {
                    missing_restarts += 1;
                }
                predictors.fill(0);
            }
            let plane = &mut planes[step.component];
            let index = step.row * plane.blocks_wide + step.col;
            let block = plane.blocks.get_mut(index).ok_or_else(|| {
                DecodeError::CorruptData(format!("block {index} outside plane {}", step.component))
            })?;
            decode_block(
                &mut reader,
                &dc[step.slot],
                &ac[step.slot],
                &mut predictors[step.slot],
                block,
            )
        })?;

        if missing_restarts > 0 {
            log::warn!("{missing_restarts} expected restart markers were missing");
        }
        if reader.padded_bytes() > 0 {
            log::warn!(
                "Entropy-coded data ended early; zero-filled {} bytes",
                reader.padded_bytes()
            );
        }
        log::trace!(
            "Scan {} over components {:?}: {} bytes",
            self.scans,
            components,
            end - self.pos
        );

        self.pos = end;
        self.scans += 1;
        Ok(())
    }

    /// Zeroed planes for the frame, sized once the first scan shows how much
    /// entropy-coded data the input really holds.
    fn allocate_planes(&self) -> Result<Vec<ChannelPlane>, DecodeError> {
        let frame = self.frame.as_ref().ok_or(DecodeError::Missing("frame header"))?;
        let dimensions: Vec<(usize, usize)> = (0..frame.components.len())
            .map(|c| frame.layout.plane_dimensions(c))
            .collect();
        let total_blocks: usize = dimensions.iter().map(|(wide, tall)| wide * tall).sum();
        let remaining = self.data.len().saturating_sub(self.pos);
        if total_blocks > remaining.saturating_mul(BLOCKS_PER_BYTE).saturating_add(BLOCK_SLACK) {
            return Err(DecodeError::CorruptData(format!(
                "{remaining} bytes of scan data cannot hold {total_blocks} blocks"
            )));
        }
        Ok(dimensions
            .into_iter()
            .map(|(wide, tall)| ChannelPlane::new(wide, tall))
            .collect())
    }

    fn decode_table(&self, class: u8, slot: u8) -> Result<DecodeTable, DecodeError> {
        let tables = if class == 0 {
            &self.dc_tables
        } else {
            &self.ac_tables
        };
        let name = if class == 0 { "DC" } else { "AC" };
        let spec = tables
            .get(slot as usize)
            .and_then(Option::as_ref)
            .ok_or(DecodeError::MissingHuffmanTable { class: name, id: slot })?;
        DecodeTable::build(spec)
    }

    fn metadata(&self) -> Result<ImageMetadata, DecodeError> {
        let frame = self.frame.as_ref().ok_or(DecodeError::Missing("frame header"))?;
        if self.scans == 0 {
            return Err(DecodeError::Missing("scan"));
        }
        for component in &frame.components {
            if self.quant_tables[component.quant_table as usize].is_none() {
                return Err(DecodeError::MissingQuantTable(component.quant_table));
            }
        }
        let quality = frame
            .components
            .first()
            .and_then(|c| self.quant_tables[c.quant_table as usize].as_ref())
            .and_then(matching_quality);
        Ok(ImageMetadata {
            width: frame.width,
            height: frame.height,
            components: frame.components.clone(),
            quant_tables: self.quant_tables.clone(),
            restart_interval: self.restart_interval,
            quality,
        })
    }
}

/// Decode one block into `block` (natural order).
fn decode_block(
    reader: &mut BitReader<'_>,
    dc: &DecodeTable,
    ac: &DecodeTable,
    predictor: &mut i32,
    block: &mut CoefficientBlock,
) -> Result<(), DecodeError> {
    block.fill(0);

    let size = dc.decode(reader)?;
    if size > 15 {
        return Err(DecodeError::CorruptData(format!("DC category {size}")));
    }
    *predictor = predictor.saturating_add(reader.receive_extend(size));
    block[0] = *predictor;

    let mut k = 1;
    while k < BLOCK_LEN {
        let symbol = ac.decode(reader)?;
        let run = (symbol >> 4) as usize;
        let size = symbol & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            break;
        }
        k += run;
        if k >= BLOCK_LEN {
            return Err(DecodeError::CorruptData("AC run past end of block".to_string()));
        }
        block[ZIGZAG_TO_NATURAL[k]] = reader.receive_extend(size);
        k += 1;
    }
    Ok(())
}

/// Quality whose scaled standard luminance table equals `table`, if any.
fn matching_quality(table: &QuantTable) -> Option<Quality> {
    (1..=100u8)
        .rev()
        .map(Quality::new)
        .find(|&quality| scaled_quant_table(&STD_LUMA_QUANT, quality) == *table)
}

fn sof_process(marker: u8) -> &'static str {
    match marker {
        markers::SOF2 => "progressive DCT",
        markers::SOF3 => "lossless JPEG",
        0xC5..=0xC7 => "hierarchical JPEG",
        _ => "arithmetic coding",
    }
}
