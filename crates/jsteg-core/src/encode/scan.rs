//! Entropy coding of a sequential scan.
//!
//! The same walk feeds both the statistics pass used to pick Huffman tables
//! and the pass that writes bits, so the two always see identical symbols.

use crate::coefficients::{ChannelPlanes, BLOCK_LEN};
use crate::huffman::{additional_bits, category, EncodeTable};
use crate::layout::{restart_due, FrameLayout};
use crate::markers;
use crate::tables::ZIGZAG_TO_NATURAL;

use super::bits::BitWriter;
use super::EncodeError;

/// Largest magnitude representable with category 15.
const MAX_MAGNITUDE: i64 = 32_767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableClass {
    Dc,
    Ac,
}

/// Receiver of the symbols and raw bits of a scan.
pub(crate) trait SymbolSink {
    fn symbol(&mut self, class: TableClass, table: usize, symbol: u8) -> Result<(), EncodeError>;
    fn bits(&mut self, bits: u16, size: u8);
    fn restart(&mut self, index: u8);
}

/// Which components a scan covers and which Huffman slot each one uses.
pub(crate) struct ScanPlan<'a> {
    pub layout: &'a FrameLayout,
    pub components: Vec<usize>,
    pub table_slots: Vec<usize>,
    pub restart_interval: u16,
}

/// Walk `planes` in scan order and feed every symbol to `sink`.
pub(crate) fn walk_scan<S: SymbolSink>(
    planes: &ChannelPlanes,
    plan: &ScanPlan<'_>,
    sink: &mut S,
) -> Result<(), EncodeError> {
    let mut predictors = vec![0i32; plan.components.len()];
    let interval = plan.restart_interval as usize;

    plan.layout.for_each_block(&plan.components, |step| {
        if restart_due(&step, plan.restart_interval) {
            sink.restart(((step.mcu / interval - 1) % 8) as u8);
            predictors.fill(0);
        }
        let plane = &planes[step.component];
        let index = step.row * plane.blocks_wide + step.col;
        let block = plane
            .blocks
            .get(index)
            .filter(|block| block.len() == BLOCK_LEN)
            .ok_or_else(|| EncodeError::PlaneMismatch {
                plane: step.component,
                reason: format!("block {index} is missing or not {BLOCK_LEN} coefficients"),
            })?;
        encode_block(
            block,
            &mut predictors[step.slot],
            plan.table_slots[step.slot],
            sink,
            (step.component, index),
        )
    })
}

fn encode_block<S: SymbolSink>(
    block: &[i32],
    predictor: &mut i32,
    table: usize,
    sink: &mut S,
    (plane, index): (usize, usize),
) -> Result<(), EncodeError> {
    let diff = i64::from(block[0]) - i64::from(*predictor);
    if diff.abs() > MAX_MAGNITUDE {
        return Err(EncodeError::DcDifferenceOutOfRange {
            plane,
            block: index,
            diff,
        });
    }
    *predictor = block[0];
    let diff = diff as i32;
    let size = category(diff);
    sink.symbol(TableClass::Dc, table, size)?;
    sink.bits(additional_bits(diff, size), size);

    let mut run = 0u8;
    for &natural in ZIGZAG_TO_NATURAL.iter().skip(1) {
        let value = block[natural];
        if value == 0 {
            run += 1;
            continue;
        }
        if i64::from(value).abs() > MAX_MAGNITUDE {
            return Err(EncodeError::CoefficientOutOfRange {
                plane,
                block: index,
                index: natural,
                value,
            });
        }
        while run > 15 {
            sink.symbol(TableClass::Ac, table, 0xF0)?;
            run -= 16;
        }
        let size = category(value);
        sink.symbol(TableClass::Ac, table, (run << 4) | size)?;
        sink.bits(additional_bits(value, size), size);
        run = 0;
    }
    if run > 0 {
        sink.symbol(TableClass::Ac, table, 0x00)?;
    }
    Ok(())
}

/// Symbol frequencies per table slot.
#[derive(Debug, Clone)]
pub(crate) struct SymbolCounts {
    pub dc: [[u32; 256]; 2],
    pub ac: [[u32; 256]; 2],
}

impl Default for SymbolCounts {
    fn default() -> Self {
        Self {
            dc: [[0; 256]; 2],
            ac: [[0; 256]; 2],
        }
    }
}

impl SymbolSink for SymbolCounts {
    fn symbol(&mut self, class: TableClass, table: usize, symbol: u8) -> Result<(), EncodeError> {
        let counts = match class {
            TableClass::Dc => &mut self.dc[table],
            TableClass::Ac => &mut self.ac[table],
        };
        counts[symbol as usize] = counts[symbol as usize].saturating_add(1);
        Ok(())
    }

    fn bits(&mut self, _bits: u16, _size: u8) {}

    fn restart(&mut self, _index: u8) {}
}

/// Writes Huffman-coded symbols and restart markers.
pub(crate) struct HuffmanWriter<'t> {
    writer: BitWriter,
    dc: &'t [EncodeTable],
    ac: &'t [EncodeTable],
}

impl<'t> HuffmanWriter<'t> {
    pub fn new(dc: &'t [EncodeTable], ac: &'t [EncodeTable]) -> Self {
        Self {
            writer: BitWriter::new(),
            dc,
            ac,
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.finish()
    }
}

impl SymbolSink for HuffmanWriter<'_> {
    fn symbol(&mut self, class: TableClass, table: usize, symbol: u8) -> Result<(), EncodeError> {
        let tables = match class {
            TableClass::Dc => self.dc,
            TableClass::Ac => self.ac,
        };
        let (code, length) = tables
            .get(table)
            .and_then(|t| t.lookup(symbol))
            .ok_or_else(|| {
                EncodeError::EncodingFailed(format!(
                    "no {class:?} Huffman code for symbol 0x{symbol:02X} in table {table}"
                ))
            })?;
        self.writer.write_bits(code, length);
        Ok(())
    }

    fn bits(&mut self, bits: u16, size: u8) {
        self.writer.write_bits(bits, size);
    }

    fn restart(&mut self, index: u8) {
        self.writer.write_marker(markers::RST0 + index);
    }
}
