//! jsteg WASM - WebAssembly bindings for jsteg
//!
//! This crate exposes the jsteg-core coefficient pipeline to JavaScript.
//!
//! # Module Structure
//!
//! - `pipeline` - Read, re-encode and transcode bindings
//! - `types` - Conversions between core types and their JavaScript shapes
//! - `logger` - Forwards `log` records to the browser console
//!
//! # Usage
//!
//! ```typescript
//! import init, { read_coefficients } from '@jsteg/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! read_coefficients(bytes, (coefficients, metadata) => {
//!   console.log(`${metadata.width}x${metadata.height}, ${coefficients[0].length} luma blocks`);
//! });
//! ```

use wasm_bindgen::prelude::*;

mod logger;
mod pipeline;
mod types;

pub use pipeline::{read_coefficients, re_encode_with_modifications, transcode_with_modifications};

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    logger::install(log::LevelFilter::Info);
}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Set the console log level ("off", "error", "warn", "info", "debug" or "trace").
#[wasm_bindgen]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let filter = logger::parse_level(level)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown log level: {level}")))?;
    logger::install(filter);
    Ok(())
}
