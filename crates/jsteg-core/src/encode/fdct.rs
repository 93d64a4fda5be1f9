//! RGBA to YCbCr conversion, chroma downsampling, forward DCT and quantization.

use std::sync::OnceLock;

use crate::coefficients::{ChannelPlane, ChannelPlanes, CoefficientBlock, BLOCK_LEN};
use crate::decode::Raster;
use crate::layout::FrameLayout;
use crate::metadata::{ImageMetadata, QuantTable};

use super::EncodeError;

/// `COSINE[u][x] = cos((2x + 1) * u * PI / 16)`
static COSINE: OnceLock<[[f64; 8]; 8]> = OnceLock::new();

fn cosine_table() -> &'static [[f64; 8]; 8] {
    COSINE.get_or_init(|| {
        let mut table = [[0.0f64; 8]; 8];
        for (u, row) in table.iter_mut().enumerate() {
            for (x, value) in row.iter_mut().enumerate() {
                *value = ((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0).cos();
            }
        }
        table
    })
}

#[inline]
fn norm(u: usize) -> f64 {
    if u == 0 {
        std::f64::consts::FRAC_1_SQRT_2 / 2.0
    } else {
        0.5
    }
}

/// Separable 8x8 forward DCT of level-shifted samples (natural order in and out).
pub(crate) fn forward_dct(samples: &[f64; BLOCK_LEN]) -> [f64; BLOCK_LEN] {
    let cos = cosine_table();

    let mut rows = [0.0f64; BLOCK_LEN];
    for y in 0..8 {
        for u in 0..8 {
            let sum: f64 = (0..8).map(|x| samples[y * 8 + x] * cos[u][x]).sum();
            rows[y * 8 + u] = norm(u) * sum;
        }
    }

    let mut coeffs = [0.0f64; BLOCK_LEN];
    for u in 0..8 {
        for v in 0..8 {
            let sum: f64 = (0..8).map(|y| rows[y * 8 + u] * cos[v][y]).sum();
            coeffs[v * 8 + u] = norm(v) * sum;
        }
    }
    coeffs
}

/// Divide by the quantizers and round to nearest.
pub(crate) fn quantize(coeffs: &[f64; BLOCK_LEN], table: &QuantTable) -> CoefficientBlock {
    coeffs
        .iter()
        .enumerate()
        .map(|(i, &c)| (c / f64::from(table.get(i).max(1))).round() as i32)
        .collect()
}

/// Full-resolution JFIF Y, Cb and Cr samples.
struct YccImage {
    width: usize,
    height: usize,
    channels: [Vec<f32>; 3],
}

impl YccImage {
    fn from_raster(raster: &Raster) -> Self {
        let count = raster.pixel_count();
        let mut y = Vec::with_capacity(count);
        let mut cb = Vec::with_capacity(count);
        let mut cr = Vec::with_capacity(count);
        for px in raster.pixels.chunks_exact(4) {
            let (r, g, b) = (f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
            y.push(0.299 * r + 0.587 * g + 0.114 * b);
            cb.push(-0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0);
            cr.push(0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0);
        }
        Self {
            width: raster.width as usize,
            height: raster.height as usize,
            channels: [y, cb, cr],
        }
    }

    /// Sample at (`x`, `y`), replicating the right and bottom edges.
    #[inline]
    fn sample(&self, channel: usize, x: usize, y: usize) -> f32 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.channels[channel][y * self.width + x]
    }
}

/// Transform and quantize `raster` into planes laid out by `layout`.
///
/// Components sampled below the maximum factors are box-filtered.
pub(crate) fn forward_planes(
    raster: &Raster,
    metadata: &ImageMetadata,
    layout: &FrameLayout,
) -> Result<ChannelPlanes, EncodeError> {
    let image = YccImage::from_raster(raster);
    let (max_h, max_v) = layout.max_sampling();
    let mut planes = Vec::with_capacity(layout.component_count());

    for component in 0..layout.component_count() {
        let table = metadata.quant_table_for(component).ok_or_else(|| {
            EncodeError::InvalidMetadata(format!("component {component} has no quantization table"))
        })?;
        let (h, v) = layout.sampling(component);
        if max_h % h != 0 || max_v % v != 0 {
            return Err(EncodeError::InvalidMetadata(format!(
                "component {component} sampling {h}x{v} does not divide {max_h}x{max_v}"
            )));
        }
        let (step_x, step_y) = (max_h / h, max_v / v);
        let area = (step_x * step_y) as f32;
        let (wide, tall) = layout.plane_dimensions(component);
        let mut plane = ChannelPlane::new(wide, tall);

        for row in 0..tall {
            for col in 0..wide {
                let mut samples = [0.0f64; BLOCK_LEN];
                for y in 0..8 {
                    for x in 0..8 {
                        let px = (col * 8 + x) * step_x;
                        let py = (row * 8 + y) * step_y;
                        let mut sum = 0.0f32;
                        for dy in 0..step_y {
                            for dx in 0..step_x {
                                sum += image.sample(component, px + dx, py + dy);
                            }
                        }
                        samples[y * 8 + x] = f64::from(sum / area) - 128.0;
                    }
                }
                plane.blocks[row * wide + col] = quantize(&forward_dct(&samples), table);
            }
        }
        planes.push(plane);
    }

    let mut planes = planes.into_iter();
    let luma = planes.next().unwrap_or_default();
    Ok(match (planes.next(), planes.next()) {
        (Some(cb), Some(cr)) => ChannelPlanes::new(luma, cb, cr),
        _ => ChannelPlanes::grayscale(luma),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ComponentInfo, Quality};
    use crate::tables::{scaled_quant_table, STD_LUMA_QUANT};

    #[test]
    fn test_flat_block_has_only_dc() {
        let samples = [100.0f64; BLOCK_LEN];
        let coeffs = forward_dct(&samples);
        // DC of a flat block is 8 * value.
        assert!((coeffs[0] - 800.0).abs() < 1e-9);
        assert!(coeffs[1..].iter().all(|c| c.abs() < 1e-9));
    }

    #[test]
    fn test_horizontal_ramp_is_first_row() {
        let mut samples = [0.0f64; BLOCK_LEN];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = (i % 8) as f64 * 10.0;
        }
        let coeffs = forward_dct(&samples);
        assert!(coeffs[1].abs() > 1.0);
        // Nothing varies vertically.
        for v in 1..8 {
            for u in 0..8 {
                assert!(coeffs[v * 8 + u].abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_quantize_rounds_to_nearest() {
        let mut coeffs = [0.0f64; BLOCK_LEN];
        coeffs[0] = 84.0;
        coeffs[1] = -13.0;
        coeffs[2] = 3.9;
        let table = QuantTable::new([8; BLOCK_LEN]);
        let block = quantize(&coeffs, &table);
        assert_eq!(block.len(), BLOCK_LEN);
        assert_eq!(&block[..3], &[11, -2, 0]);
    }

    #[test]
    fn test_mid_gray_raster_quantizes_to_zero() {
        let raster = Raster::new(8, 8, [128, 128, 128, 255].repeat(64));
        let metadata = ImageMetadata {
            width: 8,
            height: 8,
            components: vec![ComponentInfo {
                id: 1,
                h_sampling: 1,
                v_sampling: 1,
                quant_table: 0,
            }],
            quant_tables: [
                Some(scaled_quant_table(&STD_LUMA_QUANT, Quality::DEFAULT)),
                None,
                None,
                None,
            ],
            restart_interval: 0,
            quality: None,
        };
        let layout = FrameLayout::from_metadata(&metadata).unwrap();
        let planes = forward_planes(&raster, &metadata, &layout).unwrap();
        assert_eq!(planes.luma().len(), 1);
        assert!(planes.luma().blocks[0].iter().all(|&c| c == 0));
        assert!(planes[1].is_empty());
    }

    #[test]
    fn test_ycc_conversion_of_white() {
        let raster = Raster::new(1, 1, vec![255; 4]);
        let image = YccImage::from_raster(&raster);
        assert!((image.sample(0, 0, 0) - 255.0).abs() < 0.01);
        assert!((image.sample(1, 0, 0) - 128.0).abs() < 0.01);
        assert!((image.sample(2, 0, 0) - 128.0).abs() < 0.01);
    }
}
