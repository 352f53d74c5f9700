//! Pencil sketch filters: Gray Sketch, Color Sketch.
//!
//! ## Supported Formats
//!
//! - **Gray sketch**: RGB in, single channel out
//! - **Color sketch**: RGB in, RGB out

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::blur::gaussian_blur_plane;
use super::color_science::{hsv_to_rgb_u8, rgb_to_hsv_u8};
use super::draw::draw_line;
use super::edge::{canny_u8, invert};
use super::grayscale::to_gray_plane;
use super::morphology::{dilate_u8, StructuringElement};
use super::noise::bilateral_u8;

// ============================================================================
// Gray Sketch
// ============================================================================

/// Gray sketch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraySketchParams {
    /// Kernel size of the blur applied to the inverted gray image.
    pub blur_size: usize,
}

impl Default for GraySketchParams {
    fn default() -> Self {
        Self { blur_size: 21 }
    }
}

/// Color-dodge `a * scale / b`, rounded and saturated; 0 where `b == 0`.
fn divide_scaled(a: ArrayView2<u8>, b: ArrayView2<u8>, scale: f32) -> Array2<u8> {
    let mut output = Array2::<u8>::zeros(a.dim());
    Zip::from(&mut output).and(a).and(b).par_for_each(|out, &num, &den| {
        *out = if den == 0 {
            0
        } else {
            (f32::from(num) * scale / f32::from(den)).round().min(255.0) as u8
        };
    });
    output
}

/// Convert an image to a pencil-style gray sketch.
///
/// Grayscale, invert, blur the inversion, then color-dodge the gray image
/// against it. Flat regions become white.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
///
/// # Returns
/// Single channel sketch (height, width, 1)
pub fn gray_sketch(input: ArrayView3<u8>, params: &GraySketchParams) -> Array3<u8> {
    let gray = to_gray_plane(input);
    let inverted = invert(gray.view());
    let blurred = gaussian_blur_plane(inverted.view(), params.blur_size, 0.0);
    let divisor = invert(blurred.view());
    divide_scaled(gray.view(), divisor.view(), 256.0).insert_axis(Axis(2))
}

// ============================================================================
// Color Sketch
// ============================================================================

/// Color sketch settings. Defaults reproduce the reference look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSketchParams {
    pub bilateral_diameter: usize,
    pub bilateral_sigma: f32,
    /// Multiplier applied to HSV saturation.
    pub saturation: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Row stride between hatch lines.
    pub hatch_stride: usize,
    /// Intensities of the two hatch fields.
    pub hatch_values: (u8, u8),
    /// Weight of the pencil strokes against the hatching.
    pub stroke_weight: f32,
    /// Constant subtracted from the final result.
    pub darken: f32,
}

impl Default for ColorSketchParams {
    fn default() -> Self {
        Self {
            bilateral_diameter: 9,
            bilateral_sigma: 90.0,
            saturation: 0.7,
            canny_low: 50.0,
            canny_high: 150.0,
            hatch_stride: 4,
            hatch_values: (200, 180),
            stroke_weight: 0.6,
            darken: 15.0,
        }
    }
}

/// Two overlapping fields of 45 degree lines, OR-ed and softened.
fn hatch_texture(height: usize, width: usize, params: &ColorSketchParams) -> Array2<u8> {
    let (h, w) = (height as i64, width as i64);
    let stride = params.hatch_stride.max(1);

    let mut first = Array2::<u8>::zeros((height, width));
    for i in (0..h).step_by(stride) {
        draw_line(&mut first, (0, i), (w, i + w), params.hatch_values.0);
    }

    let mut second = Array2::<u8>::zeros((height, width));
    for i in (-w..h).step_by(stride) {
        draw_line(&mut second, (0, i), (w, i + w), params.hatch_values.1);
    }

    Zip::from(&mut first).and(&second).for_each(|a, &b| *a |= b);
    gaussian_blur_plane(first.view(), 3, 0.0)
}

/// Convert an image to a colored pencil drawing.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Tuning constants
///
/// # Returns
/// RGB image with the same dimensions
pub fn color_sketch(input: ArrayView3<u8>, params: &ColorSketchParams) -> Array3<u8> {
    let (height, width, _) = input.dim();

    // Smooth, then pull saturation down
    let smooth = bilateral_u8(
        input,
        params.bilateral_diameter,
        params.bilateral_sigma,
        params.bilateral_sigma,
    );
    let mut hsv = rgb_to_hsv_u8(smooth.view());
    hsv.index_axis_mut(Axis(2), 1)
        .mapv_inplace(|s| (f32::from(s) * params.saturation).clamp(0.0, 255.0) as u8);
    let color = hsv_to_rgb_u8(hsv.view());

    // Pencil strokes from thickened edges
    let gray = to_gray_plane(color.view());
    let edges = canny_u8(gray.view(), params.canny_low, params.canny_high);
    let edges = dilate_u8(edges.view(), StructuringElement::Ellipse { width: 3, height: 3 }, 1);
    let strokes = gaussian_blur_plane(invert(edges.view()).view(), 5, 1.0);

    let hatching = hatch_texture(height, width, params);

    let hatch_weight = 1.0 - params.stroke_weight;
    let mut output = Array3::<u8>::zeros((height, width, 3));
    Zip::from(output.lanes_mut(Axis(2)))
        .and(color.lanes(Axis(2)))
        .and(&strokes)
        .and(&hatching)
        .par_for_each(|mut out, px, &stroke, &hatch| {
            let texture = (f32::from(stroke) / 255.0 * params.stroke_weight
                + f32::from(hatch) / 255.0 * hatch_weight)
                .clamp(0.0, 1.0);
            for c in 0..3 {
                let v = f32::from(px[c]);
                let shaded = v * texture * 0.95 + v * 0.05 - params.darken;
                out[c] = shaded.clamp(0.0, 255.0) as u8;
            }
        });

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_sketch_white_stays_white() {
        let white = Array3::<u8>::from_elem((50, 100, 3), 255);
        let sketch = gray_sketch(white.view(), &GraySketchParams::default());
        assert_eq!(sketch.dim(), (50, 100, 1));
        assert!(sketch.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_gray_sketch_flat_gray_is_bright() {
        let gray = Array3::<u8>::from_elem((20, 20, 3), 128);
        let sketch = gray_sketch(gray.view(), &GraySketchParams::default());
        // 128 * 256 / (255 - 127) = 256, saturated.
        assert!(sketch.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_divide_scaled_zero_divisor() {
        let a = Array2::from_shape_vec((1, 2), vec![10u8, 100]).unwrap();
        let b = Array2::from_shape_vec((1, 2), vec![0u8, 200]).unwrap();
        let out = divide_scaled(a.view(), b.view(), 256.0);
        assert_eq!(out.as_slice().unwrap(), &[0, 128]);
    }

    #[test]
    fn test_hatch_texture_has_lines() {
        let texture = hatch_texture(16, 16, &ColorSketchParams::default());
        assert!(texture.iter().any(|&v| v > 50));
        assert!(texture.iter().any(|&v| v < 50));
    }

    #[test]
    fn test_color_sketch_shape_and_range() {
        let input = Array3::from_shape_fn((24, 32, 3), |(y, x, c)| ((x * 8 + y * 3 + c * 40) % 256) as u8);
        let out = color_sketch(input.view(), &ColorSketchParams::default());
        assert_eq!(out.dim(), (24, 32, 3));
    }

    #[test]
    fn test_color_sketch_darkens_black() {
        let black = Array3::<u8>::zeros((10, 10, 3));
        let out = color_sketch(black.view(), &ColorSketchParams::default());
        assert!(out.iter().all(|&v| v == 0));
    }
}
