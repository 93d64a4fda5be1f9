//! Encoding: RGBA rasters to quantized coefficients, and coefficients to
//! baseline JPEG streams.
//!
//! [`JpegEncoder`] implements [`CoefficientEncoder`](crate::codec::CoefficientEncoder).
//! The raster half (color conversion, downsampling, DCT, quantization) and the
//! stream half (Huffman coding, container assembly) can be driven separately,
//! which is what lets a caller edit coefficients in between.

mod bits;
mod fdct;
mod jpeg;
mod scan;

pub use jpeg::{EncodeError, EncoderConfig, HuffmanStrategy, JpegEncoder, JpegResume};
