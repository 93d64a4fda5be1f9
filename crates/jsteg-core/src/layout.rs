//! Frame geometry and scan-order traversal shared by the decoder and encoder.

use crate::metadata::ImageMetadata;

/// Most blocks an interleaved MCU may hold.
pub(crate) const MAX_BLOCKS_PER_MCU: usize = 10;

/// Block-grid geometry of a frame derived from its dimensions and sampling factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameLayout {
    width: usize,
    height: usize,
    sampling: Vec<(usize, usize)>,
    max_h: usize,
    max_v: usize,
    mcus_wide: usize,
    mcus_tall: usize,
}

/// One block visited during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockStep {
    /// MCU index within the scan.
    pub mcu: usize,
    /// True for the first block of an MCU; restart markers precede such blocks.
    pub first_in_mcu: bool,
    /// Position of the component in the scan's component list.
    pub slot: usize,
    /// Frame component (and plane) index.
    pub component: usize,
    pub row: usize,
    pub col: usize,
}

impl FrameLayout {
    /// Returns `None` for zero dimensions, no components or sampling factors outside 1..=4.
    pub fn from_metadata(metadata: &ImageMetadata) -> Option<Self> {
        if metadata.width == 0 || metadata.height == 0 || metadata.components.is_empty() {
            return None;
        }
        let sampling = metadata
            .components
            .iter()
            .map(|c| (c.h_sampling as usize, c.v_sampling as usize))
            .collect::<Vec<_>>();
        if sampling.iter().any(|&(h, v)| !(1..=4).contains(&h) || !(1..=4).contains(&v)) {
            return None;
        }
        let max_h = sampling.iter().map(|s| s.0).max().unwrap_or(1);
        let max_v = sampling.iter().map(|s| s.1).max().unwrap_or(1);
        let width = metadata.width as usize;
        let height = metadata.height as usize;

        Some(Self {
            width,
            height,
            max_h,
            max_v,
            mcus_wide: width.div_ceil(8 * max_h),
            mcus_tall: height.div_ceil(8 * max_v),
            sampling,
        })
    }

    pub fn component_count(&self) -> usize {
        self.sampling.len()
    }

    pub fn max_sampling(&self) -> (usize, usize) {
        (self.max_h, self.max_v)
    }

    pub fn sampling(&self, component: usize) -> (usize, usize) {
        self.sampling[component]
    }

    /// MCU-padded block grid of `component`.
    pub fn plane_dimensions(&self, component: usize) -> (usize, usize) {
        let (h, v) = self.sampling[component];
        (self.mcus_wide * h, self.mcus_tall * v)
    }

    /// Blocks actually coded for `component` in a non-interleaved scan.
    pub fn coded_dimensions(&self, component: usize) -> (usize, usize) {
        let (h, v) = self.sampling[component];
        let samples_wide = (self.width * h).div_ceil(self.max_h);
        let samples_tall = (self.height * v).div_ceil(self.max_v);
        (samples_wide.div_ceil(8), samples_tall.div_ceil(8))
    }

    /// Blocks per MCU across `components`.
    pub fn blocks_per_mcu(&self, components: &[usize]) -> usize {
        components
            .iter()
            .map(|&c| self.sampling[c].0 * self.sampling[c].1)
            .sum()
    }

    /// Visit every block of a scan over `components` in stream order.
    ///
    /// A single-component scan is non-interleaved: it walks the component's
    /// coded blocks row by row and every block is its own MCU. Multi-component
    /// scans walk MCUs, and inside each MCU the `h x v` blocks of every
    /// component in scan order.
    pub fn for_each_block<E, F>(&self, components: &[usize], mut visit: F) -> Result<(), E>
    where
        F: FnMut(BlockStep) -> Result<(), E>,
    {
        if let [component] = components {
            let (wide, tall) = self.coded_dimensions(*component);
            for row in 0..tall {
                for col in 0..wide {
                    visit(BlockStep {
                        mcu: row * wide + col,
                        first_in_mcu: true,
                        slot: 0,
                        component: *component,
                        row,
                        col,
                    })?;
                }
            }
            return Ok(());
        }

        for mcu_y in 0..self.mcus_tall {
            for mcu_x in 0..self.mcus_wide {
                let mcu = mcu_y * self.mcus_wide + mcu_x;
                let mut first_in_mcu = true;
                for (slot, &component) in components.iter().enumerate() {
                    let (h, v) = self.sampling[component];
                    for by in 0..v {
                        for bx in 0..h {
                            visit(BlockStep {
                                mcu,
                                first_in_mcu,
                                slot,
                                component,
                                row: mcu_y * v + by,
                                col: mcu_x * h + bx,
                            })?;
                            first_in_mcu = false;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// True if a restart marker precedes the MCU visited at `step`.
#[inline]
pub(crate) fn restart_due(step: &BlockStep, restart_interval: u16) -> bool {
    let interval = restart_interval as usize;
    step.first_in_mcu && interval > 0 && step.mcu > 0 && step.mcu % interval == 0
}
