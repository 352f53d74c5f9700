//! Stylize filters: Posterize.
//!
//! ## Supported Formats
//!
//! Accepts images with 1, 3, or 4 channels. Every channel, alpha included,
//! is reduced; callers drop alpha beforehand when it should be kept.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

// ============================================================================
// Posterize
// ============================================================================

/// Reduce color levels by flooring onto a fixed grid - u8 version.
///
/// Each value becomes `(v / step) * step` with `step = 256 / levels`, so
/// 4 levels give {0, 64, 128, 192} and 8 levels give multiples of 32.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
/// * `levels` - Number of levels per channel (2-256)
///
/// # Returns
/// Posterized image with same channel count
pub fn posterize_u8(input: ArrayView3<u8>, levels: u16) -> Array3<u8> {
    let step = posterize_step(levels);
    input.mapv(|v| quantize(v, step))
}

/// Posterize a single plane.
pub fn posterize_plane(input: ArrayView2<u8>, levels: u16) -> Array2<u8> {
    let step = posterize_step(levels);
    input.mapv(|v| quantize(v, step))
}

fn posterize_step(levels: u16) -> u16 {
    let levels = levels.clamp(2, 256);
    256 / levels
}

#[inline]
fn quantize(v: u8, step: u16) -> u8 {
    ((u16::from(v) / step) * step) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posterize_four_levels() {
        let input = Array3::from_shape_vec((1, 4, 1), vec![0u8, 63, 64, 255]).unwrap();
        let out = posterize_u8(input.view(), 4);
        assert_eq!(out.as_slice().unwrap(), &[0, 0, 64, 192]);
    }

    #[test]
    fn test_posterize_plane_eight_levels() {
        let input = Array2::from_shape_vec((1, 3), vec![31u8, 32, 250]).unwrap();
        let out = posterize_plane(input.view(), 8);
        assert_eq!(out.as_slice().unwrap(), &[0, 32, 224]);
    }

    #[test]
    fn test_posterize_levels_clamped() {
        let input = Array2::from_shape_vec((1, 2), vec![100u8, 200]).unwrap();
        assert_eq!(posterize_plane(input.view(), 1).as_slice().unwrap(), &[0, 128]);
        assert_eq!(posterize_plane(input.view(), 1000).as_slice().unwrap(), &[100, 200]);
    }
}
