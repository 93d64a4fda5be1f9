//! Coefficient pipeline WASM bindings.
//!
//! # Functions
//!
//! - [`read_coefficients`] - Hand a JPEG's coefficients to a reader callback
//! - [`re_encode_with_modifications`] - Re-encode any image, letting a callback edit coefficients
//! - [`transcode_with_modifications`] - Edit a JPEG's own coefficients and re-encode them
//!
//! # Example
//!
//! ```typescript
//! import { re_encode_with_modifications } from '@jsteg/wasm';
//!
//! re_encode_with_modifications(bytes, (coefficients) => {
//!   // coefficients[plane][block][index], natural order, index 0 is DC
//!   coefficients[0][0][0] = -coefficients[0][0][0];
//! }, (jpeg) => {
//!   console.log(`Encoded ${jpeg.byteLength} bytes`);
//! });
//! ```

use crate::types::{quality_from_js, to_js_error, CoefficientArrays};
use js_sys::{Function, Uint8Array};
use jsteg_core::{ChannelPlanes, EncodedImage, Pipeline, PipelineConfig, PipelineError};
use wasm_bindgen::prelude::*;

/// A JavaScript modifier and the first error it raised.
struct JsModifier {
    function: Function,
    failure: Option<JsValue>,
}

impl JsModifier {
    fn new(function: Function) -> Self {
        Self {
            function,
            failure: None,
        }
    }

    /// Call the function with nested arrays and copy its edits back.
    ///
    /// On failure the planes are left untouched, the JavaScript error is kept
    /// for the caller to rethrow, and the `Err` stops the request before
    /// encoding.
    fn apply(&mut self, planes: &mut ChannelPlanes) -> Result<(), &'static str> {
        self.try_apply(planes).map_err(|error| {
            self.failure = Some(error);
            "JavaScript modifier threw"
        })
    }

    fn try_apply(&self, planes: &mut ChannelPlanes) -> Result<(), JsValue> {
        let arrays = serde_wasm_bindgen::to_value(&CoefficientArrays::from_planes(planes))
            .map_err(to_js_error)?;
        self.function.call1(&JsValue::NULL, &arrays)?;
        let edited: CoefficientArrays = serde_wasm_bindgen::from_value(arrays).map_err(to_js_error)?;
        edited.write_into(planes).map_err(|e| JsValue::from_str(&e))
    }
}

/// Decode a JPEG and call `reader(coefficients, metadata)` once.
///
/// # Arguments
///
/// * `bytes` - JPEG file bytes
/// * `reader` - Called with `coefficients[plane][block][index]` and the image metadata
///
/// # Returns
///
/// Whatever `reader` returns. Throws if `bytes` is not a decodable JPEG, in
/// which case `reader` is never called.
#[wasm_bindgen]
pub fn read_coefficients(bytes: &[u8], reader: &Function) -> Result<JsValue, JsValue> {
    jsteg_core::read_coefficients(bytes, |planes, metadata| {
        let coefficients =
            serde_wasm_bindgen::to_value(&CoefficientArrays::from_planes(planes)).map_err(to_js_error)?;
        let metadata = serde_wasm_bindgen::to_value(metadata).map_err(to_js_error)?;
        reader.call2(&JsValue::NULL, &coefficients, &metadata)
    })
    .map_err(to_js_error)?
}

/// Re-encode an image, letting `modifier` edit its coefficients first.
///
/// # Arguments
///
/// * `bytes` - Image file bytes (JPEG, PNG, BMP or WebP)
/// * `modifier` - Optional; called once with `coefficients[plane][block][index]` to edit in place
/// * `on_encoded` - Called once with the new JPEG as a `Uint8Array`
/// * `quality` - JPEG quality (1-100, default 75)
///
/// # Returns
///
/// Whatever `on_encoded` returns. If `modifier` throws, or changes the number
/// or length of blocks, this throws and `on_encoded` is never called.
#[wasm_bindgen]
pub fn re_encode_with_modifications(
    bytes: &[u8],
    modifier: Option<Function>,
    on_encoded: &Function,
    quality: Option<u8>,
) -> Result<JsValue, JsValue> {
    let pipeline = Pipeline::with_config(PipelineConfig {
        quality: quality_from_js(quality),
        ..Default::default()
    });
    let mut modifier = modifier.map(JsModifier::new);
    let result = pipeline.re_encode_with_modifications(
        bytes,
        modifier
            .as_mut()
            .map(|m| move |planes: &mut ChannelPlanes| m.apply(planes)),
        |encoded| encoded,
    );
    deliver(modifier, result, on_encoded)
}

/// Re-encode a JPEG's own coefficients after `modifier` edits them.
///
/// The source's quantization tables and sampling are kept, so coefficients
/// the modifier leaves alone come out unchanged.
///
/// # Arguments
///
/// * `bytes` - JPEG file bytes
/// * `modifier` - Optional; called once with `coefficients[plane][block][index]` to edit in place
/// * `on_encoded` - Called once with the new JPEG as a `Uint8Array`
#[wasm_bindgen]
pub fn transcode_with_modifications(
    bytes: &[u8],
    modifier: Option<Function>,
    on_encoded: &Function,
) -> Result<JsValue, JsValue> {
    let mut modifier = modifier.map(JsModifier::new);
    let result = Pipeline::new().transcode_with_modifications(
        bytes,
        modifier
            .as_mut()
            .map(|m| move |planes: &mut ChannelPlanes| m.apply(planes)),
        |encoded| encoded,
    );
    deliver(modifier, result, on_encoded)
}

fn deliver(
    modifier: Option<JsModifier>,
    result: Result<EncodedImage, PipelineError>,
    on_encoded: &Function,
) -> Result<JsValue, JsValue> {
    if let Some(failure) = modifier.and_then(|m| m.failure) {
        return Err(failure);
    }
    let encoded = result.map_err(to_js_error)?;
    let bytes = Uint8Array::from(encoded.bytes());
    on_encoded.call1(&JsValue::NULL, &bytes)
}

/// WASM-specific tests that call JavaScript functions.
///
/// These can only run on wasm32 targets. Use `wasm-pack test` to run them.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use jsteg_core::{
        ChannelPlane, CoefficientEncoder, ComponentInfo, ImageMetadata, JpegEncoder, QuantTable, BLOCK_LEN,
    };
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

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

    fn dc_of(bytes: &[u8]) -> f64 {
        let reader = Function::new_with_args("c, m", "return c[0][0][0];");
        read_coefficients(bytes, &reader).unwrap().as_f64().unwrap()
    }

    #[wasm_bindgen_test]
    fn test_read_coefficients_returns_reader_value() {
        assert_eq!(dc_of(&single_block_jpeg()), 10.0);
    }

    #[wasm_bindgen_test]
    fn test_read_coefficients_passes_metadata() {
        let reader = Function::new_with_args("c, m", "return m.width * 1000 + c.length;");
        let value = read_coefficients(&single_block_jpeg(), &reader).unwrap();
        assert_eq!(value.as_f64(), Some(8003.0));
    }

    #[wasm_bindgen_test]
    fn test_read_coefficients_rejects_empty_input() {
        let reader = Function::new_with_args("c, m", "throw new Error('must not run');");
        let error = read_coefficients(&[], &reader).unwrap_err();
        assert!(error.as_string().unwrap().contains("empty"));
    }

    #[wasm_bindgen_test]
    fn test_transcode_applies_modifier() {
        let modifier = Function::new_with_args("c", "c[0][0][0] = -c[0][0][0];");
        let on_encoded = Function::new_with_args("jpeg", "return jpeg;");
        let encoded = transcode_with_modifications(&single_block_jpeg(), Some(modifier), &on_encoded).unwrap();
        let bytes = Uint8Array::new(&encoded).to_vec();
        assert_eq!(dc_of(&bytes), -10.0);
    }

    #[wasm_bindgen_test]
    fn test_re_encode_without_modifier() {
        let on_encoded = Function::new_with_args("jpeg", "return jpeg.byteLength;");
        let length = re_encode_with_modifications(&single_block_jpeg(), None, &on_encoded, Some(90)).unwrap();
        assert!(length.as_f64().unwrap() > 0.0);
    }

    #[wasm_bindgen_test]
    fn test_throwing_modifier_skips_on_encoded() {
        let modifier = Function::new_with_args("c", "throw new Error('boom');");
        let on_encoded = Function::new_with_args("jpeg", "throw new Error('must not run');");
        let error = re_encode_with_modifications(&single_block_jpeg(), Some(modifier), &on_encoded, None)
            .unwrap_err();
        assert!(!format!("{error:?}").contains("must not run"));
    }

    #[wasm_bindgen_test]
    fn test_modifier_exception_is_rethrown() {
        let modifier = Function::new_with_args("c", "throw 'boom';");
        let on_encoded = Function::new_with_args("jpeg", "return jpeg;");
        let error = transcode_with_modifications(&single_block_jpeg(), Some(modifier), &on_encoded).unwrap_err();
        assert_eq!(error.as_string().as_deref(), Some("boom"));
    }

    #[wasm_bindgen_test]
    fn test_appending_coefficient_throws() {
        let modifier = Function::new_with_args("c", "c[0][0].push(1);");
        let on_encoded = Function::new_with_args("jpeg", "throw new Error('must not run');");
        let error = transcode_with_modifications(&single_block_jpeg(), Some(modifier), &on_encoded).unwrap_err();
        assert!(error.as_string().unwrap().contains("coefficients"));
    }
}
