//! Edge detection: Laplacian, Canny, thresholding.
//!
//! All functions operate on single-channel byte planes `(height, width)`;
//! callers convert to grayscale first (see [`super::grayscale`]).

use image::GrayImage;
use ndarray::{Array2, ArrayView2, Zip};

use super::blur::Border;

// ============================================================================
// Laplacian Edge Detection
// ============================================================================

/// Build the 5x5 second-derivative kernel.
///
/// It is the sum of the separable `d2/dx2` and `d2/dy2` aperture-5 kernels:
/// `outer([1,4,6,4,1], [1,0,-2,0,1])` plus its transpose.
fn build_laplacian_kernel_5() -> [[i32; 5]; 5] {
    const SMOOTH: [i32; 5] = [1, 4, 6, 4, 1];
    const DERIV: [i32; 5] = [1, 0, -2, 0, 1];
    let mut kernel = [[0i32; 5]; 5];
    for (y, row) in kernel.iter_mut().enumerate() {
        for (x, value) in row.iter_mut().enumerate() {
            *value = SMOOTH[y] * DERIV[x] + DERIV[y] * SMOOTH[x];
        }
    }
    kernel
}

/// Apply the aperture-5 Laplacian - u8 version.
///
/// Responses are saturated into `0..=255`, so negative responses (bright
/// side of an edge) become 0. Borders use reflect-101.
///
/// # Arguments
/// * `input` - Grayscale plane (height, width)
///
/// # Returns
/// Edge response plane
pub fn laplacian_u8(input: ArrayView2<u8>) -> Array2<u8> {
    let (height, width) = input.dim();
    let kernel = build_laplacian_kernel_5();

    let mut output = Array2::<u8>::zeros((height, width));
    Zip::indexed(&mut output).par_for_each(|(y, x), out| {
        let mut sum = 0i32;
        for (ky, row) in kernel.iter().enumerate() {
            let sy = Border::Reflect101.index(y as isize + ky as isize - 2, height);
            for (kx, &k) in row.iter().enumerate() {
                if k == 0 {
                    continue;
                }
                let sx = Border::Reflect101.index(x as isize + kx as isize - 2, width);
                sum += k * i32::from(input[[sy, sx]]);
            }
        }
        *out = sum.clamp(0, 255) as u8;
    });

    output
}

// ============================================================================
// Canny Edge Detection
// ============================================================================

/// Canny edge detection with hysteresis thresholds on the gradient
/// magnitude.
///
/// # Arguments
/// * `input` - Grayscale plane (height, width)
/// * `low_threshold` - Weak-edge threshold (e.g. 50)
/// * `high_threshold` - Strong-edge threshold (e.g. 150)
///
/// # Returns
/// Binary plane, 255 on edges and 0 elsewhere
pub fn canny_u8(input: ArrayView2<u8>, low_threshold: f32, high_threshold: f32) -> Array2<u8> {
    let (height, width) = input.dim();
    let gray = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([input[[y as usize, x as usize]]])
    });
    let edges = imageproc::edges::canny(&gray, low_threshold, high_threshold);
    Array2::from_shape_fn((height, width), |(y, x)| edges.get_pixel(x as u32, y as u32)[0])
}

// ============================================================================
// Thresholding
// ============================================================================

/// Inverse binary threshold: `0` where `v > thresh`, `max_value` otherwise.
pub fn threshold_binary_inv(input: ArrayView2<u8>, thresh: u8, max_value: u8) -> Array2<u8> {
    input.mapv(|v| if v > thresh { 0 } else { max_value })
}

/// Invert a plane (`255 - v`).
pub fn invert(input: ArrayView2<u8>) -> Array2<u8> {
    input.mapv(|v| 255 - v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laplacian_kernel_sums_to_zero() {
        let kernel = build_laplacian_kernel_5();
        let sum: i32 = kernel.iter().flatten().sum();
        assert_eq!(sum, 0);
        assert_eq!(kernel[2][2], -24);
        assert_eq!(kernel[0][0], 2);
    }

    #[test]
    fn test_laplacian_flat_is_zero() {
        let plane = Array2::<u8>::from_elem((8, 8), 140);
        let out = laplacian_u8(plane.view());
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_laplacian_dark_side_of_step_responds() {
        let mut plane = Array2::<u8>::zeros((9, 9));
        for y in 0..9 {
            for x in 5..9 {
                plane[[y, x]] = 200;
            }
        }
        let out = laplacian_u8(plane.view());
        // Dark pixel next to the step sees a positive second derivative.
        assert_eq!(out[[4, 4]], 255);
        // Bright pixel next to the step is negative, saturated to 0.
        assert_eq!(out[[4, 5]], 0);
        assert_eq!(out[[4, 0]], 0);
    }

    #[test]
    fn test_canny_finds_square_outline() {
        let mut plane = Array2::<u8>::zeros((40, 40));
        for y in 10..30 {
            for x in 10..30 {
                plane[[y, x]] = 255;
            }
        }
        let edges = canny_u8(plane.view(), 50.0, 150.0);
        assert!(edges.iter().all(|&v| v == 0 || v == 255));
        assert!(edges.iter().any(|&v| v == 255));
        assert_eq!(edges[[20, 20]], 0);
        assert_eq!(edges[[2, 2]], 0);
    }

    #[test]
    fn test_threshold_binary_inv() {
        let plane = Array2::from_shape_vec((1, 3), vec![10u8, 80, 81]).unwrap();
        let out = threshold_binary_inv(plane.view(), 80, 255);
        assert_eq!(out.as_slice().unwrap(), &[255, 255, 0]);
    }
}
