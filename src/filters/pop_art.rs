//! Pop art filter: posterized, contrast-boosted 2x2 false-color grid.

use image::imageops::{self, FilterType};
use ndarray::{s, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use super::color_science::{lab_to_rgb_u8, rgb_to_lab_u8};
use super::colormap::{apply_colormap, Colormap};
use super::grayscale::to_gray_plane;
use super::histogram::equalize_plane;
use super::stylize::posterize_u8;
use crate::raster::{matrix_to_rgb_image, rgb_image_to_matrix};

/// Colormaps of the four tiles in reading order.
pub const TILE_MAPS: [Colormap; 4] = [Colormap::Jet, Colormap::Hsv, Colormap::Ocean, Colormap::Pink];

/// Pop art settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopArtParams {
    /// Images whose long side exceeds this are downscaled to it first.
    pub working_size: u32,
    /// Posterization levels per channel.
    pub levels: u16,
}

impl Default for PopArtParams {
    fn default() -> Self {
        Self {
            working_size: 512,
            levels: 4,
        }
    }
}

/// Downscale so the long side is at most `max_side`. Sizes are truncated.
fn fit_working_size(input: ArrayView3<u8>, max_side: u32) -> Array3<u8> {
    let (height, width, _) = input.dim();
    let long = height.max(width) as u32;
    if long <= max_side {
        return input.to_owned();
    }
    let scale = f64::from(max_side) / f64::from(long);
    let new_w = ((width as f64 * scale) as u32).max(1);
    let new_h = ((height as f64 * scale) as u32).max(1);
    let rgb = matrix_to_rgb_image(&input.to_owned());
    rgb_image_to_matrix(&imageops::resize(&rgb, new_w, new_h, FilterType::Triangle))
}

/// Convert an image to a four-panel pop art print.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Working size and posterization
///
/// # Returns
/// RGB canvas of twice the working size in each dimension
pub fn pop_art(input: ArrayView3<u8>, params: &PopArtParams) -> Array3<u8> {
    let working = fit_working_size(input, params.working_size);
    let posterized = posterize_u8(working.view(), params.levels);

    // Contrast: equalize lightness only
    let mut lab = rgb_to_lab_u8(posterized.view());
    let lightness = equalize_plane(lab.index_axis(Axis(2), 0));
    lab.index_axis_mut(Axis(2), 0).assign(&lightness);
    let contrasted = lab_to_rgb_u8(lab.view());

    let gray = to_gray_plane(contrasted.view());
    let (h, w) = gray.dim();
    let mut canvas = Array3::<u8>::zeros((h * 2, w * 2, 3));
    for (i, map) in TILE_MAPS.iter().enumerate() {
        let (row, col) = (i / 2, i % 2);
        let tile = apply_colormap(gray.view(), *map);
        canvas
            .slice_mut(s![row * h..(row + 1) * h, col * w..(col + 1) * w, ..])
            .assign(&tile);
    }
    canvas
}
