//! WebAssembly exports for the classical filters.
//!
//! These functions are exposed to JavaScript via wasm-bindgen. Neural
//! styles and background removal need model files and are not exported.
//!
//! ## Buffer Layout
//!
//! Input and output are flat, row-major, interleaved u8 buffers. Gray
//! sketch and manga return 1 channel per pixel, every other style 3.

use wasm_bindgen::prelude::*;

use crate::engine;
use crate::error::Error;
use crate::raster::{PixelBuffer, RasterImage};
use crate::style::StyleParams;

fn to_js(err: Error) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn run(data: &[u8], width: u32, height: u32, channels: usize, style: &str, params: Option<&StyleParams>) -> Result<Vec<u8>, JsValue> {
    let image = RasterImage::from_u8(width, height, channels, data.to_vec()).map_err(to_js)?;
    let result = engine::apply_classical_filter(&image, style, params).map_err(to_js)?;
    match result.into_data() {
        PixelBuffer::U8(bytes) => Ok(bytes),
        PixelBuffer::F32(_) => Err(JsValue::from_str("filter returned float data")),
    }
}

// ============================================================================
// Classical filters
// ============================================================================

/// Apply a classical filter to a packed u8 image.
///
/// # Arguments
/// * `data` - Flat array of bytes (length = width * height * channels)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `channels` - 1, 3 or 4
/// * `style` - Style identifier, e.g. `comic-art` or `pixel-art:8bit`
///
/// # Returns
/// Flat array of output bytes. Pop art output is twice the working size
/// in each dimension.
#[wasm_bindgen]
pub fn apply_classical_filter_wasm(
    data: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    style: &str,
) -> Result<Vec<u8>, JsValue> {
    run(data, width, height, channels, style, None)
}

/// Same as [`apply_classical_filter_wasm`] with an explicit parameter preset.
#[wasm_bindgen]
pub fn apply_classical_filter_preset_wasm(
    data: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    style: &str,
    preset: &str,
) -> Result<Vec<u8>, JsValue> {
    let params = StyleParams::with_preset(preset);
    run(data, width, height, channels, style, Some(&params))
}
