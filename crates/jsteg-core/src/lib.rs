//! jsteg Core - JPEG coefficient access
//!
//! This crate exposes the quantized DCT coefficients of JPEG images so they
//! can be inspected or edited, then written back as a valid JPEG. Three paths
//! are offered:
//!
//! - [`read_coefficients`]: decode a JPEG and hand its planes to a reader.
//! - [`re_encode_with_modifications`]: rasterize any supported image, quantize
//!   it, let a modifier edit the coefficients, and encode.
//! - [`transcode_with_modifications`]: edit a JPEG's own coefficients and
//!   re-encode them with its tables, without a pixel round trip.
//!
//! The codec sits behind [`CoefficientDecoder`] and [`CoefficientEncoder`];
//! [`JpegDecoder`] and [`JpegEncoder`] are the baseline implementations.

pub mod codec;
pub mod coefficients;
pub mod decode;
pub mod encode;
pub mod huffman;
pub(crate) mod layout;
pub mod markers;
pub mod metadata;
pub mod pipeline;
pub mod tables;

pub use codec::{CoefficientDecoder, CoefficientEncoder, DecodedCoefficients, EncodeParams, EncodeSession, EncodedImage};
pub use coefficients::{
    Channel, ChannelPlane, ChannelPlanes, CoefficientBlock, ContractViolation, PlanesShape, BLOCK_LEN,
    PLANE_COUNT,
};
pub use decode::{to_raster, DecodeError, JpegDecoder, Raster, RasterError, RasterOptions};
pub use encode::{EncodeError, EncoderConfig, HuffmanStrategy, JpegEncoder};
pub use metadata::{ChromaSubsampling, ComponentInfo, ImageMetadata, QuantTable, Quality};
pub use pipeline::{
    re_encode_with_modifications, read_coefficients, transcode_with_modifications, ModifierOutcome, NoModifier,
    Pipeline, PipelineConfig, PipelineError, SubsamplingMode,
};
