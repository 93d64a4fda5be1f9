//! Codec collaborator traits.
//!
//! The pipeline drives a coefficient decoder and a coefficient encoder only
//! through these traits. [`JpegDecoder`](crate::decode::JpegDecoder) and
//! [`JpegEncoder`](crate::encode::JpegEncoder) are the default implementations.

use crate::coefficients::ChannelPlanes;
use crate::decode::{DecodeError, Raster};
use crate::encode::EncodeError;
use crate::metadata::{ChromaSubsampling, ImageMetadata, Quality};

/// Coefficients and metadata parsed from a compressed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCoefficients {
    pub planes: ChannelPlanes,
    pub metadata: ImageMetadata,
}

/// Parameters for starting an encode from pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: Quality,
    pub subsampling: ChromaSubsampling,
}

/// State of an encode paused between quantization and entropy coding.
///
/// `planes` are the exact coefficients that [`CoefficientEncoder::resume_encode`]
/// writes; `resume` carries whatever the encoder needs to finish.
#[derive(Debug)]
pub struct EncodeSession<R> {
    pub planes: ChannelPlanes,
    pub metadata: ImageMetadata,
    pub resume: R,
}

/// Parses a compressed stream into quantized coefficients.
pub trait CoefficientDecoder {
    /// Decode every coefficient of every component.
    ///
    /// Block order and subsampling are preserved as found in the stream.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedCoefficients, DecodeError>;

    /// Parse only the metadata. The default decodes fully.
    fn read_header(&self, bytes: &[u8]) -> Result<ImageMetadata, DecodeError> {
        self.decode(bytes).map(|decoded| decoded.metadata)
    }
}

/// Produces quantized coefficients from pixels and writes coefficients to a
/// compressed stream.
pub trait CoefficientEncoder {
    /// Handle carried from [`begin_encode`](Self::begin_encode) to
    /// [`resume_encode`](Self::resume_encode).
    type Resume;

    /// Transform and quantize `raster`, stopping before entropy coding.
    fn begin_encode(
        &self,
        raster: &Raster,
        params: &EncodeParams,
    ) -> Result<EncodeSession<Self::Resume>, EncodeError>;

    /// Entropy-code `planes` and assemble the output stream.
    fn resume_encode(&self, resume: Self::Resume, planes: &ChannelPlanes) -> Result<Vec<u8>, EncodeError>;

    /// Write `planes` with the tables and sampling described by `metadata`.
    fn encode_coefficients(
        &self,
        planes: &ChannelPlanes,
        metadata: &ImageMetadata,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// A finished encode handed to the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    metadata: ImageMetadata,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, metadata: ImageMetadata) -> Self {
        Self { bytes, metadata }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Metadata the encoder wrote.
    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}
