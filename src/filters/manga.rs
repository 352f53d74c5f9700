//! Manga filter: ink outlines, halftone dots and cross-hatching.
//!
//! Output is a single channel image quantized to 32-level steps.

use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::draw::{draw_line, fill_circle};
use super::edge::{canny_u8, invert};
use super::grayscale::to_gray_plane;
use super::morphology::{dilate_u8, StructuringElement};
use super::noise::{bilateral_plane, median_plane};
use super::stylize::posterize_plane;

/// Manga settings. The grid strides and gates are tuning constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MangaParams {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Grid stride of the halftone dots.
    pub halftone_step: usize,
    /// Dots are drawn where the smoothed intensity is below this.
    pub halftone_threshold: u8,
    /// Grid stride and length of the hatch strokes.
    pub hatch_step: usize,
    /// Hatching is drawn where the smoothed intensity is below this.
    pub hatch_threshold: u8,
    /// Posterization levels of the final image.
    pub levels: u16,
}

impl Default for MangaParams {
    fn default() -> Self {
        Self {
            canny_low: 80.0,
            canny_high: 180.0,
            halftone_step: 4,
            halftone_threshold: 128,
            hatch_step: 6,
            hatch_threshold: 180,
            levels: 8,
        }
    }
}

/// Dots whose radius grows as the source gets darker.
fn halftone(smooth: &Array2<u8>, params: &MangaParams) -> Array2<u8> {
    let (height, width) = smooth.dim();
    let mut layer = Array2::<u8>::from_elem((height, width), 255);
    let step = params.halftone_step.max(1);
    let threshold = i64::from(params.halftone_threshold);

    for y in (0..height).step_by(step) {
        for x in (0..width).step_by(step) {
            let s = i64::from(smooth[[y, x]]);
            if s < threshold {
                let radius = 1 + (threshold - s) / 32;
                fill_circle(&mut layer, (x as i64, y as i64), radius, 0);
            }
        }
    }
    layer
}

/// Crossed diagonal strokes in regions darker than the hatch gate.
fn cross_hatch(smooth: &Array2<u8>, params: &MangaParams) -> Array2<u8> {
    let (height, width) = smooth.dim();
    let mut layer = Array2::<u8>::from_elem((height, width), 255);
    let step = params.hatch_step.max(1);
    let (h, w, s) = (height as i64, width as i64, step as i64);

    for y in (0..height).step_by(step) {
        for x in (0..width).step_by(step) {
            if smooth[[y, x]] >= params.hatch_threshold {
                continue;
            }
            let (xi, yi) = (x as i64, y as i64);
            if yi + s < h && xi + s < w {
                draw_line(&mut layer, (xi, yi), (xi + s, yi + s), 0);
            }
            if yi + s < h && xi - s >= 0 {
                draw_line(&mut layer, (xi, yi), (xi - s, yi + s), 0);
            }
        }
    }
    layer
}

/// Convert an image to a manga-style ink drawing.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Screen and hatching settings
///
/// # Returns
/// Single channel image (height, width, 1)
pub fn manga(input: ArrayView3<u8>, params: &MangaParams) -> Array3<u8> {
    let gray = to_gray_plane(input);
    let smooth = bilateral_plane(gray.view(), 9, 75.0, 75.0);
    let smooth = median_plane(smooth.view(), 5);

    let edges = canny_u8(smooth.view(), params.canny_low, params.canny_high);
    let edges = dilate_u8(edges.view(), StructuringElement::Rect { width: 2, height: 2 }, 1);
    let mut combined = invert(edges.view());

    let dots = halftone(&smooth, params);
    let hatching = cross_hatch(&smooth, params);
    Zip::from(&mut combined)
        .and(&dots)
        .and(&hatching)
        .par_for_each(|out, &d, &h| *out &= d & h);

    posterize_plane(combined.view(), params.levels).insert_axis(Axis(2))
}
