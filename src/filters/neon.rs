//! Neon glow filter: colored edge tubes with a stacked soft glow.

use ndarray::{Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::blur::gaussian_blur_radius_u8;
use super::color_science::rgb_to_hsv;
use super::edge::canny_u8;
use super::grayscale::to_gray_plane;
use super::morphology::{dilate_u8, StructuringElement};
use super::noise::bilateral_plane;

/// Tube color used for every edge when color mapping is off.
pub const NEON_CYAN: [u8; 3] = [0, 255, 255];

/// Neon glow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeonParams {
    /// Tint each tube by the hue of the source pixel under it.
    pub color_mapping: bool,
    /// Blur sigmas of the glow layers, added on top of the sharp tubes.
    pub glow_sigmas: Vec<f32>,
    /// Dilation passes thickening the tubes.
    pub thickness: usize,
}

impl Default for NeonParams {
    fn default() -> Self {
        Self {
            color_mapping: true,
            glow_sigmas: vec![8.0, 15.0, 25.0, 35.0],
            thickness: 2,
        }
    }
}

/// Saturated tube color for a hue on the 0-179 scale.
pub fn neon_color_for_hue(hue: u8) -> [u8; 3] {
    match hue {
        h if h < 15 || h > 165 => [255, 0, 0],
        h if h < 30 => [255, 165, 0],
        h if h < 45 => [255, 255, 0],
        h if h < 90 => [0, 255, 0],
        h if h < 110 => NEON_CYAN,
        h if h < 150 => [0, 0, 255],
        _ => [255, 0, 255],
    }
}

/// Convert an image to glowing neon outlines on black.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Color mapping and glow settings
///
/// # Returns
/// RGB image with the same dimensions
pub fn neon_glow(input: ArrayView3<u8>, params: &NeonParams) -> Array3<u8> {
    let (height, width, _) = input.dim();

    let gray = to_gray_plane(input);
    let smooth = bilateral_plane(gray.view(), 9, 75.0, 75.0);
    let edges = canny_u8(smooth.view(), 50.0, 150.0);
    let edges = dilate_u8(
        edges.view(),
        StructuringElement::Ellipse { width: 3, height: 3 },
        params.thickness,
    );

    // Sharp tubes on a black background
    let mut tubes = Array3::<u8>::zeros((height, width, 3));
    Zip::from(tubes.lanes_mut(Axis(2)))
        .and(input.lanes(Axis(2)))
        .and(&edges)
        .par_for_each(|mut out, px, &edge| {
            if edge == 0 {
                return;
            }
            let color = if params.color_mapping {
                let (h, _, _) = rgb_to_hsv(px[0], px[1], px[2]);
                neon_color_for_hue(h)
            } else {
                NEON_CYAN
            };
            out[0] = color[0];
            out[1] = color[1];
            out[2] = color[2];
        });

    // Saturating sum of the glow layers and the sharp layer
    let mut accum = tubes.mapv(u16::from);
    for &sigma in &params.glow_sigmas {
        let glow = gaussian_blur_radius_u8(tubes.view(), sigma);
        Zip::from(&mut accum).and(&glow).for_each(|a, &g| *a = (*a + u16::from(g)).min(255));
    }
    accum.mapv(|v| v as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_on(color: [u8; 3], background: [u8; 3]) -> Array3<u8> {
        Array3::from_shape_fn((40, 40, 3), |(y, x, c)| {
            if (12..28).contains(&y) && (12..28).contains(&x) {
                color[c]
            } else {
                background[c]
            }
        })
    }

    #[test]
    fn test_hue_buckets() {
        assert_eq!(neon_color_for_hue(0), [255, 0, 0]);
        assert_eq!(neon_color_for_hue(170), [255, 0, 0]);
        assert_eq!(neon_color_for_hue(20), [255, 165, 0]);
        assert_eq!(neon_color_for_hue(60), [0, 255, 0]);
        assert_eq!(neon_color_for_hue(100), NEON_CYAN);
        assert_eq!(neon_color_for_hue(120), [0, 0, 255]);
        assert_eq!(neon_color_for_hue(160), [255, 0, 255]);
        assert_eq!(neon_color_for_hue(165), [255, 0, 255]);
    }

    #[test]
    fn test_flat_image_is_black() {
        let flat = Array3::<u8>::from_elem((20, 20, 3), 128);
        let out = neon_glow(flat.view(), &NeonParams::default());
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_single_color_tubes_are_cyan() {
        let input = square_on([0, 255, 0], [0, 0, 0]);
        let params = NeonParams {
            color_mapping: false,
            ..Default::default()
        };
        let out = neon_glow(input.view(), &params);
        assert!(out.lanes(Axis(2)).into_iter().all(|p| p[0] == 0));
        assert!(out.iter().any(|&v| v == 255));
    }

    #[test]
    fn test_tubes_follow_source_hue() {
        // Green square on blue: green tubes inside, blue tubes outside.
        let input = square_on([0, 255, 0], [0, 0, 120]);
        let out = neon_glow(input.view(), &NeonParams::default());
        assert!(out.lanes(Axis(2)).into_iter().all(|p| p[0] == 0));
        assert!(out.lanes(Axis(2)).into_iter().any(|p| p[1] == 255));
        assert!(out.lanes(Axis(2)).into_iter().any(|p| p[2] == 255));
    }
}
