//! Request orchestration: decode, modify, encode, deliver.
//!
//! Each entry point handles one request. Callbacks are `FnOnce` and run
//! synchronously, so every stage runs at most once and strictly after the
//! stage before it. Failures come back through the `Err` arm and no callback
//! runs after one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CoefficientDecoder, CoefficientEncoder, EncodeParams, EncodedImage};
use crate::coefficients::{ChannelPlanes, ContractViolation};
use crate::decode::{to_raster, DecodeError, JpegDecoder, RasterError, RasterOptions};
use crate::encode::{EncodeError, JpegEncoder};
use crate::metadata::{ChromaSubsampling, ImageMetadata, Quality};

/// Chroma layout used when re-encoding from a raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsamplingMode {
    /// Keep the layout of a JPEG source; 4:4:4 for anything else.
    #[default]
    PreserveSource,
    /// Always use this layout.
    Fixed(ChromaSubsampling),
}

/// Settings shared by every request a [`Pipeline`] handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quality: Quality,
    pub subsampling: SubsamplingMode,
    pub raster: RasterOptions,
}

/// Why a request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to load raster: {0}")]
    RasterLoad(#[from] RasterError),

    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Modifier broke the coefficient layout: {0}")]
    ContractViolation(#[from] ContractViolation),

    #[error("Modifier failed: {0}")]
    ModifierFailed(String),
}

/// Modifier type for calls that pass `None`.
pub type NoModifier = fn(&mut ChannelPlanes);

/// What a modifier returns.
///
/// `()` always lets the request continue. An `Err` stops it before anything
/// is encoded and surfaces as [`PipelineError::ModifierFailed`].
pub trait ModifierOutcome {
    fn into_result(self) -> Result<(), String>;
}

impl ModifierOutcome for () {
    fn into_result(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: std::fmt::Display> ModifierOutcome for Result<(), E> {
    fn into_result(self) -> Result<(), String> {
        self.map_err(|error| error.to_string())
    }
}

/// Sequences a coefficient decoder, an optional modifier and a coefficient
/// encoder.
///
/// Holds only configuration and stateless collaborators; requests never share
/// planes.
#[derive(Debug, Clone, Default)]
pub struct Pipeline<D = JpegDecoder, E = JpegEncoder> {
    decoder: D,
    encoder: E,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

impl<D, E> Pipeline<D, E>
where
    D: CoefficientDecoder,
    E: CoefficientEncoder,
{
    pub fn with_collaborators(decoder: D, encoder: E, config: PipelineConfig) -> Self {
        Self {
            decoder,
            encoder,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode `source` and hand its coefficients to `reader`.
    ///
    /// `source` must be a JPEG. `reader` is not called if decoding fails;
    /// its return value is passed through.
    pub fn read_coefficients<F, T>(&self, source: &[u8], reader: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&ChannelPlanes, &ImageMetadata) -> T,
    {
        let decoded = self.decoder.decode(source)?;
        Ok(reader(&decoded.planes, &decoded.metadata))
    }

    /// Rasterize `source`, quantize it, let `modifier` edit the coefficients
    /// and write them as a new JPEG.
    ///
    /// `source` may be any format the raster decoder recognizes. The modifier
    /// sees exactly the coefficients that are written, and may change values
    /// but not the number or length of blocks. A modifier returning `Err`
    /// ends the request before encoding.
    pub fn re_encode_with_modifications<M, R, F, T>(
        &self,
        source: &[u8],
        modifier: Option<M>,
        on_encoded: F,
    ) -> Result<T, PipelineError>
    where
        M: FnOnce(&mut ChannelPlanes) -> R,
        R: ModifierOutcome,
        F: FnOnce(EncodedImage) -> T,
    {
        let raster = to_raster(source, &self.config.raster)?;
        let params = EncodeParams {
            quality: self.config.quality,
            subsampling: self.resolve_subsampling(source),
        };
        let session = self.encoder.begin_encode(&raster, &params)?;
        let mut planes = session.planes;
        apply_modifier(&mut planes, modifier)?;
        let bytes = self.encoder.resume_encode(session.resume, &planes)?;
        Ok(on_encoded(EncodedImage::new(bytes, session.metadata)))
    }

    /// Re-encode `source` without modifying it.
    pub fn re_encode<F, T>(&self, source: &[u8], on_encoded: F) -> Result<T, PipelineError>
    where
        F: FnOnce(EncodedImage) -> T,
    {
        self.re_encode_with_modifications(source, None::<NoModifier>, on_encoded)
    }

    /// Decode a JPEG's coefficients, let `modifier` edit them and write them
    /// back with the source's own tables and sampling.
    ///
    /// No pixels are produced, so unmodified coefficients come out exactly as
    /// they went in.
    pub fn transcode_with_modifications<M, R, F, T>(
        &self,
        source: &[u8],
        modifier: Option<M>,
        on_encoded: F,
    ) -> Result<T, PipelineError>
    where
        M: FnOnce(&mut ChannelPlanes) -> R,
        R: ModifierOutcome,
        F: FnOnce(EncodedImage) -> T,
    {
        let decoded = self.decoder.decode(source)?;
        let mut planes = decoded.planes;
        apply_modifier(&mut planes, modifier)?;
        let bytes = self.encoder.encode_coefficients(&planes, &decoded.metadata)?;
        Ok(on_encoded(EncodedImage::new(bytes, decoded.metadata)))
    }

    fn resolve_subsampling(&self, source: &[u8]) -> ChromaSubsampling {
        match self.config.subsampling {
            SubsamplingMode::Fixed(subsampling) => subsampling,
            SubsamplingMode::PreserveSource => self
                .decoder
                .read_header(source)
                .ok()
                .and_then(|metadata| metadata.chroma_subsampling())
                .unwrap_or_default(),
        }
    }
}

fn apply_modifier<M, R>(planes: &mut ChannelPlanes, modifier: Option<M>) -> Result<(), PipelineError>
where
    M: FnOnce(&mut ChannelPlanes) -> R,
    R: ModifierOutcome,
{
    let Some(modifier) = modifier else {
        return Ok(());
    };
    let shape = planes.shape();
    modifier(planes).into_result().map_err(PipelineError::ModifierFailed)?;
    shape.verify(planes)?;
    Ok(())
}

/// [`Pipeline::read_coefficients`] with the default pipeline.
pub fn read_coefficients<F, T>(source: &[u8], reader: F) -> Result<T, PipelineError>
where
    F: FnOnce(&ChannelPlanes, &ImageMetadata) -> T,
{
    Pipeline::new().read_coefficients(source, reader)
}

/// [`Pipeline::re_encode_with_modifications`] with the default pipeline.
pub fn re_encode_with_modifications<M, R, F, T>(
    source: &[u8],
    modifier: Option<M>,
    on_encoded: F,
) -> Result<T, PipelineError>
where
    M: FnOnce(&mut ChannelPlanes) -> R,
    R: ModifierOutcome,
    F: FnOnce(EncodedImage) -> T,
{
    Pipeline::new().re_encode_with_modifications(source, modifier, on_encoded)
}

/// [`Pipeline::transcode_with_modifications`] with the default pipeline.
pub fn transcode_with_modifications<M, R, F, T>(
    source: &[u8],
    modifier: Option<M>,
    on_encoded: F,
) -> Result<T, PipelineError>
where
    M: FnOnce(&mut ChannelPlanes) -> R,
    R: ModifierOutcome,
    F: FnOnce(EncodedImage) -> T,
{
    Pipeline::new().transcode_with_modifications(source, modifier, on_encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::{ChannelPlane, BLOCK_LEN};
    use crate::metadata::{ComponentInfo, QuantTable};
    use std::io::Cursor;

    /// 8x8 luminance-only JPEG with one block whose DC coefficient is 10.
    fn single_block_jpeg() -> Vec<u8> {
        let mut luma = ChannelPlane::new(1, 1);
        luma.blocks[0][0] = 10;
        let metadata = ImageMetadata {
            width: 8,
            height: 8,
            components: vec![ComponentInfo {
                id: 1,
                h_sampling: 1,
                v_sampling: 1,
                quant_table: 0,
            }],
            quant_tables: [Some(QuantTable::new([1; BLOCK_LEN])), None, None, None],
            restart_interval: 0,
            quality: None,
        };
        JpegEncoder::new()
            .encode_coefficients(&ChannelPlanes::grayscale(luma), &metadata)
            .unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 9) as u8, (y * 13) as u8, ((x * y) % 256) as u8, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32, subsampling: ChromaSubsampling) -> Vec<u8> {
        let pipeline = Pipeline::with_config(PipelineConfig {
            subsampling: SubsamplingMode::Fixed(subsampling),
            ..Default::default()
        });
        pipeline
            .re_encode(&png_bytes(width, height), EncodedImage::into_bytes)
            .unwrap()
    }

    fn negate_luma(planes: &mut ChannelPlanes) {
        for block in planes.luma_mut().iter_mut() {
            for c in block.iter_mut() {
                *c = -*c;
            }
        }
    }

    #[test]
    fn test_read_invokes_reader_once() {
        let source = single_block_jpeg();
        let mut calls = 0;
        let dc = read_coefficients(&source, |planes, metadata| {
            calls += 1;
            assert_eq!((metadata.width, metadata.height), (8, 8));
            assert!(planes[1].is_empty() && planes[2].is_empty());
            planes.luma().blocks[0][0]
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(dc, 10);
    }

    #[test]
    fn test_read_empty_input_fails_without_reader() {
        let mut called = false;
        let result = read_coefficients(&[], |_, _| called = true);
        assert_eq!(result, Err(PipelineError::Decode(DecodeError::Empty)));
        assert!(!called);
    }

    #[test]
    fn test_read_rejects_png() {
        let result = read_coefficients(&png_bytes(8, 8), |_, _| ());
        assert_eq!(result, Err(PipelineError::Decode(DecodeError::NotJpeg)));
    }

    #[test]
    fn test_negating_modifier_sees_negated_dc() {
        let source = single_block_jpeg();
        let mut seen = None;
        let encoded = transcode_with_modifications(
            &source,
            Some(|planes: &mut ChannelPlanes| {
                negate_luma(planes);
                seen = Some(planes.luma().blocks[0][0]);
            }),
            |encoded| encoded,
        )
        .unwrap();
        assert_eq!(seen, Some(-10));

        let dc = read_coefficients(encoded.bytes(), |planes, _| planes.luma().blocks[0][0]).unwrap();
        assert_eq!(dc, -10);
    }

    #[test]
    fn test_transcode_without_modifier_preserves_coefficients() {
        let source = jpeg_bytes(30, 18, ChromaSubsampling::Yuv422);
        let original = read_coefficients(&source, |planes, _| planes.clone()).unwrap();
        let encoded = transcode_with_modifications(&source, None::<NoModifier>, |e| e).unwrap();
        let reread = read_coefficients(encoded.bytes(), |planes, _| planes.clone()).unwrap();
        assert_eq!(reread, original);
        assert_eq!(
            encoded.metadata().chroma_subsampling(),
            Some(ChromaSubsampling::Yuv422)
        );
    }

    #[test]
    fn test_appending_coefficient_is_contract_violation() {
        let source = png_bytes(16, 16);
        let mut delivered = false;
        let result = re_encode_with_modifications(
            &source,
            Some(|planes: &mut ChannelPlanes| planes.luma_mut().blocks[0].push(1)),
            |_| delivered = true,
        );
        assert_eq!(
            result,
            Err(PipelineError::ContractViolation(ContractViolation::BlockLength {
                plane: 0,
                block: 0,
                expected: BLOCK_LEN,
                actual: BLOCK_LEN + 1,
            }))
        );
        assert!(!delivered);
    }

    #[test]
    fn test_removing_block_is_contract_violation() {
        let source = single_block_jpeg();
        let result = transcode_with_modifications(
            &source,
            Some(|planes: &mut ChannelPlanes| {
                planes.luma_mut().blocks.pop();
            }),
            |_| (),
        );
        assert!(matches!(
            result,
            Err(PipelineError::ContractViolation(ContractViolation::BlockCount {
                plane: 0,
                expected: 1,
                actual: 0
            }))
        ));
    }

    #[test]
    fn test_out_of_range_value_is_encode_failure() {
        let source = png_bytes(8, 8);
        let mut delivered = false;
        let result = re_encode_with_modifications(
            &source,
            Some(|planes: &mut ChannelPlanes| planes.luma_mut().blocks[0][5] = 1 << 20),
            |_| delivered = true,
        );
        assert!(matches!(
            result,
            Err(PipelineError::Encode(EncodeError::CoefficientOutOfRange { plane: 0, .. }))
        ));
        assert!(!delivered);
    }

    #[test]
    fn test_failing_modifier_stops_before_encoding() {
        let mut delivered = false;
        let result = re_encode_with_modifications(
            &png_bytes(8, 8),
            Some(|planes: &mut ChannelPlanes| {
                // Both the shape check and the encoder would reject this.
                planes.luma_mut().blocks[0].push(1 << 20);
                Err::<(), _>("payload does not fit")
            }),
            |_| delivered = true,
        );
        assert_eq!(
            result,
            Err(PipelineError::ModifierFailed("payload does not fit".to_string()))
        );
        assert!(!delivered);
    }

    #[test]
    fn test_fallible_modifier_that_succeeds() {
        let encoded = transcode_with_modifications(
            &single_block_jpeg(),
            Some(|planes: &mut ChannelPlanes| {
                negate_luma(planes);
                Ok::<(), String>(())
            }),
            |encoded| encoded,
        )
        .unwrap();
        let dc = read_coefficients(encoded.bytes(), |planes, _| planes.luma().blocks[0][0]).unwrap();
        assert_eq!(dc, -10);
    }

    #[test]
    fn test_re_encode_without_modifier() {
        let encoded = Pipeline::new()
            .re_encode(&png_bytes(20, 12), |encoded| encoded)
            .unwrap();
        assert_eq!(encoded.mime_type(), "image/jpeg");
        assert_eq!(&encoded.bytes()[..2], &[0xFF, 0xD8]);
        assert_eq!((encoded.metadata().width, encoded.metadata().height), (20, 12));
        assert_eq!(encoded.metadata().quality, Some(Quality::DEFAULT));
    }

    #[test]
    fn test_empty_source_on_re_encode_path() {
        let result = Pipeline::new().re_encode(&[], |_| ());
        assert_eq!(result, Err(PipelineError::RasterLoad(RasterError::InvalidFormat)));
    }

    #[test]
    fn test_modified_values_are_what_gets_written() {
        let source = jpeg_bytes(24, 16, ChromaSubsampling::Yuv420);
        let mut written = None;
        let encoded = re_encode_with_modifications(
            &source,
            Some(|planes: &mut ChannelPlanes| {
                for block in planes.luma_mut().iter_mut() {
                    block[1] = (block[1] & !1) | 1;
                }
                planes[2].blocks[0][0] += 3;
                written = Some(planes.clone());
            }),
            |encoded| encoded,
        )
        .unwrap();
        let reread = read_coefficients(encoded.bytes(), |planes, _| planes.clone()).unwrap();
        assert_eq!(Some(reread), written);
    }

    #[test]
    fn test_preserves_source_subsampling() {
        let source = jpeg_bytes(33, 17, ChromaSubsampling::Yuv420);
        let encoded = Pipeline::new().re_encode(&source, |e| e).unwrap();
        assert_eq!(
            encoded.metadata().chroma_subsampling(),
            Some(ChromaSubsampling::Yuv420)
        );
        let (dims, subsampling) = read_coefficients(encoded.bytes(), |_, metadata| {
            ((metadata.width, metadata.height), metadata.chroma_subsampling())
        })
        .unwrap();
        assert_eq!(dims, (33, 17));
        assert_eq!(subsampling, Some(ChromaSubsampling::Yuv420));
    }

    #[test]
    fn test_fixed_subsampling_overrides_source() {
        let source = jpeg_bytes(16, 16, ChromaSubsampling::Yuv420);
        let pipeline = Pipeline::with_config(PipelineConfig {
            subsampling: SubsamplingMode::Fixed(ChromaSubsampling::Yuv444),
            ..Default::default()
        });
        let encoded = pipeline.re_encode(&source, |e| e).unwrap();
        assert_eq!(
            encoded.metadata().chroma_subsampling(),
            Some(ChromaSubsampling::Yuv444)
        );
    }

    #[test]
    fn test_non_jpeg_source_defaults_to_444() {
        let encoded = Pipeline::new().re_encode(&png_bytes(16, 16), |e| e).unwrap();
        assert_eq!(
            encoded.metadata().chroma_subsampling(),
            Some(ChromaSubsampling::Yuv444)
        );
    }

    #[test]
    fn test_grayscale_jpeg_re_encodes_as_color() {
        let encoded = Pipeline::new().re_encode(&single_block_jpeg(), |e| e).unwrap();
        assert_eq!(encoded.metadata().components.len(), 3);
        assert_eq!((encoded.metadata().width, encoded.metadata().height), (8, 8));
    }

    #[test]
    fn test_quality_reaches_tables() {
        let source = png_bytes(16, 16);
        let low = Pipeline::with_config(PipelineConfig {
            quality: Quality::new(10),
            ..Default::default()
        });
        let high = Pipeline::with_config(PipelineConfig {
            quality: Quality::new(95),
            ..Default::default()
        });
        let low = low.re_encode(&source, |e| e).unwrap();
        let high = high.re_encode(&source, |e| e).unwrap();
        assert_eq!(low.metadata().quality, Some(Quality::new(10)));
        assert!(low.metadata().quant_tables[0] != high.metadata().quant_tables[0]);

        let read_quality =
            read_coefficients(high.bytes(), |_, metadata| metadata.quality).unwrap();
        assert_eq!(read_quality, Some(Quality::new(95)));
    }

    #[test]
    fn test_error_messages_name_the_failure() {
        let err = PipelineError::from(ContractViolation::BlockCount {
            plane: 1,
            expected: 4,
            actual: 3,
        });
        assert_eq!(
            err.to_string(),
            "Modifier broke the coefficient layout: plane 1 block count changed from 4 to 3"
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            let v = (x * 31 + y * 17) as u8;
            image::Rgba([v.wrapping_add(seed), v ^ seed, seed, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn subsampling_strategy() -> impl Strategy<Value = ChromaSubsampling> {
        prop_oneof![
            Just(ChromaSubsampling::Yuv444),
            Just(ChromaSubsampling::Yuv422),
            Just(ChromaSubsampling::Yuv420),
            Just(ChromaSubsampling::Yuv440),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: re-encoding twice with no modifier gives identical bytes.
        #[test]
        fn prop_re_encode_is_deterministic(
            (width, height) in (1u32..=40, 1u32..=40),
            seed in any::<u8>(),
            quality in 1u8..=100,
        ) {
            let source = png_bytes(width, height, seed);
            let pipeline = Pipeline::with_config(PipelineConfig {
                quality: Quality::new(quality),
                ..Default::default()
            });
            let first = pipeline.re_encode(&source, EncodedImage::into_bytes).unwrap();
            let second = pipeline.re_encode(&source, EncodedImage::into_bytes).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property: a value-only modifier's output is exactly what reads back,
        /// and chroma planes never hold more blocks than luma.
        #[test]
        fn prop_value_modifications_read_back(
            (width, height) in (1u32..=40, 1u32..=40),
            seed in any::<u8>(),
            subsampling in subsampling_strategy(),
            delta in -50i32..=50,
        ) {
            let pipeline = Pipeline::with_config(PipelineConfig {
                subsampling: SubsamplingMode::Fixed(subsampling),
                ..Default::default()
            });
            let mut written = None;
            let encoded = pipeline
                .re_encode_with_modifications(
                    &png_bytes(width, height, seed),
                    Some(|planes: &mut ChannelPlanes| {
                        for plane in planes.iter_mut() {
                            for block in plane.iter_mut() {
                                block[63] += delta;
                            }
                        }
                        written = Some(planes.clone());
                    }),
                    |encoded| encoded,
                )
                .unwrap();

            let (reread, luma, chroma) = pipeline
                .read_coefficients(encoded.bytes(), |planes, _| {
                    (planes.clone(), planes[0].len(), planes[1].len().max(planes[2].len()))
                })
                .unwrap();
            prop_assert_eq!(Some(reread), written);
            prop_assert!(chroma <= luma);
        }

        /// Property: re-encoding preserves dimensions and the source's layout.
        #[test]
        fn prop_round_trip_preserves_geometry(
            (width, height) in (1u32..=48, 1u32..=48),
            subsampling in subsampling_strategy(),
        ) {
            let fixed = Pipeline::with_config(PipelineConfig {
                subsampling: SubsamplingMode::Fixed(subsampling),
                ..Default::default()
            });
            let source = fixed.re_encode(&png_bytes(width, height, 7), EncodedImage::into_bytes).unwrap();
            let encoded = Pipeline::new().re_encode(&source, |e| e).unwrap();
            let metadata = Pipeline::new()
                .read_coefficients(encoded.bytes(), |_, metadata| metadata.clone())
                .unwrap();
            prop_assert_eq!((metadata.width, metadata.height), (width, height));
            prop_assert_eq!(metadata.chroma_subsampling(), Some(subsampling));
        }
    }
}
