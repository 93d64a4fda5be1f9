//! Conversions between core coefficient types and their JavaScript shapes.
//!
//! Coefficients cross the boundary as nested plain arrays,
//! `coefficients[plane][block][index]`, so a JavaScript modifier can edit them
//! in place and the edits can be read back afterwards.

use jsteg_core::{ChannelPlanes, CoefficientBlock, Quality, PLANE_COUNT};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// Three planes of blocks in the nested-array layout JavaScript sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct CoefficientArrays(Vec<Vec<CoefficientBlock>>);

impl CoefficientArrays {
    pub(crate) fn from_planes(planes: &ChannelPlanes) -> Self {
        Self(planes.iter().map(|plane| plane.blocks.clone()).collect())
    }

    /// Replace the blocks of `planes` with these arrays.
    ///
    /// Only the plane count is checked here; block counts and lengths are
    /// verified by the pipeline after the modifier returns.
    pub(crate) fn write_into(self, planes: &mut ChannelPlanes) -> Result<(), String> {
        if self.0.len() != PLANE_COUNT {
            return Err(format!(
                "expected {PLANE_COUNT} coefficient planes, got {}",
                self.0.len()
            ));
        }
        for (plane, blocks) in planes.iter_mut().zip(self.0) {
            plane.blocks = blocks;
        }
        Ok(())
    }
}

/// Quality from an optional JavaScript number; absent means the default.
pub(crate) fn quality_from_js(quality: Option<u8>) -> Quality {
    quality.map(Quality::new).unwrap_or_default()
}

pub(crate) fn to_js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}
