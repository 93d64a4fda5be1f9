//! Coefficient data model: blocks, channel planes and the shape contract.
//!
//! A decoded or about-to-be-encoded JPEG is exposed as three [`ChannelPlane`]s
//! (Y, Cb, Cr). Each plane is a row-major grid of [`CoefficientBlock`]s over
//! the component's MCU-padded block grid. Every block holds the 64 quantized
//! DCT coefficients of one 8x8 block in natural (row-major) order.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of coefficients in one 8x8 block.
pub const BLOCK_LEN: usize = 64;

/// Number of channel planes handed to readers and modifiers.
pub const PLANE_COUNT: usize = 3;

/// Quantized DCT coefficients of one 8x8 block in natural (row-major) order.
///
/// Index `row * 8 + col`; index 0 is the DC coefficient. This is a `Vec` so
/// modifiers can edit blocks in place with ordinary indexing; the pipeline
/// checks the length is still [`BLOCK_LEN`] once a modifier returns.
pub type CoefficientBlock = Vec<i32>;

/// Color channel of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Luminance (Y).
    Luma = 0,
    /// Blue-difference chrominance.
    Cb = 1,
    /// Red-difference chrominance.
    Cr = 2,
}

impl Channel {
    /// Plane index of this channel.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// All coefficient blocks of one color channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPlane {
    /// Width of the block grid.
    pub blocks_wide: usize,
    /// Height of the block grid.
    pub blocks_tall: usize,
    /// Blocks in row-major order; `blocks.len() == blocks_wide * blocks_tall`.
    pub blocks: Vec<CoefficientBlock>,
}

impl ChannelPlane {
    /// Create a zero-filled plane with the given block grid.
    pub fn new(blocks_wide: usize, blocks_tall: usize) -> Self {
        Self {
            blocks_wide,
            blocks_tall,
            blocks: vec![vec![0; BLOCK_LEN]; blocks_wide * blocks_tall],
        }
    }

    /// Number of blocks in the plane.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if the plane holds no blocks (absent chroma of a grayscale image).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block at grid position (`row`, `col`).
    pub fn block(&self, row: usize, col: usize) -> Option<&CoefficientBlock> {
        if row >= self.blocks_tall || col >= self.blocks_wide {
            return None;
        }
        self.blocks.get(row * self.blocks_wide + col)
    }

    /// Mutable block at grid position (`row`, `col`).
    pub fn block_mut(&mut self, row: usize, col: usize) -> Option<&mut CoefficientBlock> {
        if row >= self.blocks_tall || col >= self.blocks_wide {
            return None;
        }
        self.blocks.get_mut(row * self.blocks_wide + col)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CoefficientBlock> {
        self.blocks.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, CoefficientBlock> {
        self.blocks.iter_mut()
    }
}

/// The three channel planes of one image: Y, Cb, Cr.
///
/// Grayscale images carry empty chroma planes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPlanes {
    planes: [ChannelPlane; PLANE_COUNT],
}

impl ChannelPlanes {
    /// Assemble planes from luminance and the two chrominance planes.
    pub fn new(luma: ChannelPlane, cb: ChannelPlane, cr: ChannelPlane) -> Self {
        Self {
            planes: [luma, cb, cr],
        }
    }

    /// Luminance-only planes; both chroma planes are empty.
    pub fn grayscale(luma: ChannelPlane) -> Self {
        Self::new(luma, ChannelPlane::default(), ChannelPlane::default())
    }

    pub fn luma(&self) -> &ChannelPlane {
        &self.planes[0]
    }

    pub fn luma_mut(&mut self) -> &mut ChannelPlane {
        &mut self.planes[0]
    }

    pub fn plane(&self, channel: Channel) -> &ChannelPlane {
        &self.planes[channel.index()]
    }

    pub fn plane_mut(&mut self, channel: Channel) -> &mut ChannelPlane {
        &mut self.planes[channel.index()]
    }

    /// Total number of blocks across all planes.
    pub fn total_blocks(&self) -> usize {
        self.planes.iter().map(ChannelPlane::len).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChannelPlane> {
        self.planes.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ChannelPlane> {
        self.planes.iter_mut()
    }

    /// Snapshot of the current grid dimensions and block counts.
    pub fn shape(&self) -> PlanesShape {
        PlanesShape {
            planes: [
                PlaneShape::of(&self.planes[0]),
                PlaneShape::of(&self.planes[1]),
                PlaneShape::of(&self.planes[2]),
            ],
        }
    }
}

impl Index<usize> for ChannelPlanes {
    type Output = ChannelPlane;

    fn index(&self, index: usize) -> &ChannelPlane {
        &self.planes[index]
    }
}

impl IndexMut<usize> for ChannelPlanes {
    fn index_mut(&mut self, index: usize) -> &mut ChannelPlane {
        &mut self.planes[index]
    }
}

impl Index<Channel> for ChannelPlanes {
    type Output = ChannelPlane;

    fn index(&self, channel: Channel) -> &ChannelPlane {
        self.plane(channel)
    }
}

impl IndexMut<Channel> for ChannelPlanes {
    fn index_mut(&mut self, channel: Channel) -> &mut ChannelPlane {
        self.plane_mut(channel)
    }
}

/// A modifier changed the structure of the planes instead of only their values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// Blocks were added to or removed from a plane.
    #[error("plane {plane} block count changed from {expected} to {actual}")]
    BlockCount {
        plane: usize,
        expected: usize,
        actual: usize,
    },

    /// A block no longer holds exactly 64 coefficients.
    #[error("plane {plane} block {block} has {actual} coefficients, expected {expected}")]
    BlockLength {
        plane: usize,
        block: usize,
        expected: usize,
        actual: usize,
    },

    /// The block grid dimensions of a plane were rewritten.
    #[error(
        "plane {plane} grid changed from {expected_wide}x{expected_tall} to {actual_wide}x{actual_tall} blocks"
    )]
    Grid {
        plane: usize,
        expected_wide: usize,
        expected_tall: usize,
        actual_wide: usize,
        actual_tall: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlaneShape {
    blocks_wide: usize,
    blocks_tall: usize,
    block_count: usize,
}

impl PlaneShape {
    fn of(plane: &ChannelPlane) -> Self {
        Self {
            blocks_wide: plane.blocks_wide,
            blocks_tall: plane.blocks_tall,
            block_count: plane.blocks.len(),
        }
    }
}

/// Grid dimensions and block counts of all three planes, taken before a
/// modifier runs and verified after it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanesShape {
    planes: [PlaneShape; PLANE_COUNT],
}

impl PlanesShape {
    /// Check that `planes` still has this shape and that every block holds
    /// exactly [`BLOCK_LEN`] coefficients.
    pub fn verify(&self, planes: &ChannelPlanes) -> Result<(), ContractViolation> {
        for (index, (expected, plane)) in self.planes.iter().zip(planes.iter()).enumerate() {
            let actual = PlaneShape::of(plane);
            if actual.block_count != expected.block_count {
                return Err(ContractViolation::BlockCount {
                    plane: index,
                    expected: expected.block_count,
                    actual: actual.block_count,
                });
            }
            if actual.blocks_wide != expected.blocks_wide || actual.blocks_tall != expected.blocks_tall {
                return Err(ContractViolation::Grid {
                    plane: index,
                    expected_wide: expected.blocks_wide,
                    expected_tall: expected.blocks_tall,
                    actual_wide: actual.blocks_wide,
                    actual_tall: actual.blocks_tall,
                });
            }
            if let Some((block, coeffs)) = plane
                .blocks
                .iter()
                .enumerate()
                .find(|(_, coeffs)| coeffs.len() != BLOCK_LEN)
            {
                return Err(ContractViolation::BlockLength {
                    plane: index,
                    block,
                    expected: BLOCK_LEN,
                    actual: coeffs.len(),
                });
            }
        }
        Ok(())
    }
}
