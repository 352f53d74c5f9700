//! Grayscale conversion.
//!
//! Uses ITU-R BT.601 luma coefficients in 14-bit fixed point, which keeps
//! results bit-exact across platforms and identical for every pixel of a
//! uniform image.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

/// ITU-R BT.601 coefficients scaled by 2^14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const SHIFT: u32 = 14;

/// Luma of a single RGB triple.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * LUMA_R + u32::from(g) * LUMA_G + u32::from(b) * LUMA_B + (1 << (SHIFT - 1)))
        >> SHIFT) as u8
}

/// Convert an RGB(A) or single-channel matrix to a grayscale plane.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
///
/// # Returns
/// Plane of shape (height, width). Alpha is ignored.
pub fn to_gray_plane(input: ArrayView3<u8>) -> Array2<u8> {
    let (height, width, channels) = input.dim();
    if channels < 3 {
        return input.index_axis(Axis(2), 0).to_owned();
    }
    Array2::from_shape_fn((height, width), |(y, x)| {
        luma(input[[y, x, 0]], input[[y, x, 1]], input[[y, x, 2]])
    })
}

/// Wrap a plane as a `(height, width, 1)` matrix.
pub fn plane_to_matrix(plane: Array2<u8>) -> Array3<u8> {
    plane.insert_axis(Axis(2))
}

/// Replicate a plane into a 3-channel matrix.
pub fn plane_to_rgb(plane: ArrayView2<u8>) -> Array3<u8> {
    let (height, width) = plane.dim();
    Array3::from_shape_fn((height, width, 3), |(y, x, _)| plane[[y, x]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_to_gray_plane_shapes() {
        let rgb = Array3::<u8>::from_elem((4, 5, 3), 200);
        let gray = to_gray_plane(rgb.view());
        assert_eq!(gray.dim(), (4, 5));
        assert!(gray.iter().all(|&v| v == 200));

        let single = Array3::<u8>::from_elem((2, 2, 1), 17);
        assert_eq!(to_gray_plane(single.view())[[1, 1]], 17);
    }

    #[test]
    fn test_plane_round_trip() {
        let plane = Array2::<u8>::from_elem((3, 2), 9);
        assert_eq!(plane_to_matrix(plane.clone()).dim(), (3, 2, 1));
        assert_eq!(plane_to_rgb(plane.view()).dim(), (3, 2, 3));
    }
}
