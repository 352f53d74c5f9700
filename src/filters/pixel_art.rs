//! Pixel art filter: nearest-neighbor pixelation plus palette reduction.

use image::imageops::{self, FilterType};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::quantize::reduce_colors_u8;
use crate::error::{Error, Result};
use crate::raster::{matrix_to_rgb_image, rgb_image_to_matrix};

/// Pixelation factor and palette size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelArtParams {
    /// Downscale factor in (0, 1].
    pub scale: f32,
    /// Palette size, 2-256.
    pub colors: usize,
}

impl PixelArtParams {
    /// # Errors
    ///
    /// `InvalidParameter` when `scale` or `colors` is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(Error::invalid_parameter(
                "pixel_scale",
                format!("{} is outside (0, 1]", self.scale),
            ));
        }
        if !(2..=256).contains(&self.colors) {
            return Err(Error::invalid_parameter(
                "palette_size",
                format!("{} is outside 2..=256", self.colors),
            ));
        }
        Ok(())
    }
}

/// Nearest-neighbor resize of an RGB matrix. Each output pixel takes the
/// source pixel under its center, `floor((x + 0.5) * src / dst)`.
fn resize_nearest(input: ArrayView3<u8>, new_width: u32, new_height: u32) -> Array3<u8> {
    let rgb = matrix_to_rgb_image(&input.to_owned());
    rgb_image_to_matrix(&imageops::resize(&rgb, new_width, new_height, FilterType::Nearest))
}

/// Convert an image to blocky, palette-limited pixel art.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Downscale factor and palette size
///
/// # Returns
/// RGB image with the same dimensions
pub fn pixel_art(input: ArrayView3<u8>, params: &PixelArtParams) -> Array3<u8> {
    let (height, width, _) = input.dim();
    if width == 0 || height == 0 {
        return input.to_owned();
    }
    let small_w = ((width as f64 * f64::from(params.scale)) as u32).max(1);
    let small_h = ((height as f64 * f64::from(params.scale)) as u32).max(1);

    let small = resize_nearest(input, small_w, small_h);
    let blocky = resize_nearest(small.view(), width as u32, height as u32);
    reduce_colors_u8(blocky.view(), params.colors)
}
