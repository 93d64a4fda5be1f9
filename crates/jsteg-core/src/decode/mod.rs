//! Decoding: JPEG streams to quantized coefficients, and any supported image
//! format to an RGBA raster.
//!
//! The read and transcode paths go through [`JpegDecoder`], which never
//! touches pixels. The modify-and-re-encode path starts from [`to_raster`],
//! which accepts anything the `image` crate can sniff and decode.

pub(crate) mod bits;
mod jpeg;
mod raster;
mod types;

pub use jpeg::{JpegDecoder, DEFAULT_MAX_BLOCKS};
pub use raster::{get_orientation, to_raster};
pub use types::{DecodeError, Orientation, Raster, RasterError, RasterOptions};
