//! Gaussian blur on byte planes and matrices.
//!
//! Two kernel conventions are provided:
//! - **Sized** kernels (`ksize`, `sigma`) with reflect-101 borders, where
//!   `sigma <= 0` derives sigma from the kernel size. Small sizes use the
//!   exact binomial weights.
//! - **Radius** kernels (sigma only, size 6σ rounded up to odd) with
//!   replicated borders, used for soft glows.
//!
//! All blurs are separable 2-pass convolutions computed in f32 and rounded
//! back to u8.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};

/// How samples outside the image are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

impl Border {
    /// Map a possibly out-of-range index into `0..len`.
    #[inline]
    pub fn index(self, i: isize, len: usize) -> usize {
        let n = len as isize;
        if n == 1 {
            return 0;
        }
        match self {
            Border::Replicate => i.clamp(0, n - 1) as usize,
            Border::Reflect101 => {
                let period = 2 * (n - 1);
                let mut j = i.rem_euclid(period);
                if j >= n {
                    j = period - j;
                }
                j as usize
            }
        }
    }
}

// ============================================================================
// Kernels
// ============================================================================

/// Generate a normalized 1D Gaussian kernel of size `6 * sigma` (odd).
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }

    let kernel_size = ((sigma * 6.0).ceil() as usize) | 1;
    gaussian_weights(kernel_size, sigma)
}

/// Generate a normalized 1D Gaussian kernel with a fixed odd size.
///
/// When `sigma <= 0` it is derived as `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`,
/// and sizes 1, 3, 5 and 7 use the binomial approximations.
pub fn gaussian_kernel_sized(ksize: usize, sigma: f32) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    if sigma <= 0.0 {
        let fixed: Option<&[f32]> = match ksize {
            1 => Some(&[1.0]),
            3 => Some(&[0.25, 0.5, 0.25]),
            5 => Some(&[0.0625, 0.25, 0.375, 0.25, 0.0625]),
            7 => Some(&[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125]),
            _ => None,
        };
        if let Some(k) = fixed {
            return k.to_vec();
        }
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    gaussian_weights(ksize, sigma)
}

fn gaussian_weights(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let half = kernel_size / 2;
    let mut kernel: Vec<f32> = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - half as f32;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in kernel.iter_mut() {
        *v /= sum;
    }

    kernel
}

// ============================================================================
// Separable convolution
// ============================================================================

/// Convolve a float plane with `kernel` horizontally then vertically.
pub fn convolve_separable(plane: ArrayView2<f32>, kernel: &[f32], border: Border) -> Array2<f32> {
    let (height, width) = plane.dim();
    let half = (kernel.len() / 2) as isize;

    let mut temp = Array2::<f32>::zeros((height, width));
    Zip::indexed(&mut temp).par_for_each(|(y, x), out| {
        let mut sum = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let sx = border.index(x as isize + ki as isize - half, width);
            sum += plane[[y, sx]] * kv;
        }
        *out = sum;
    });

    let mut result = Array2::<f32>::zeros((height, width));
    Zip::indexed(&mut result).par_for_each(|(y, x), out| {
        let mut sum = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let sy = border.index(y as isize + ki as isize - half, height);
            sum += temp[[sy, x]] * kv;
        }
        *out = sum;
    });

    result
}

/// Blur a byte plane with an explicit kernel, rounding back to u8.
pub fn blur_plane_u8(plane: ArrayView2<u8>, kernel: &[f32], border: Border) -> Array2<u8> {
    let float = plane.mapv(f32::from);
    convolve_separable(float.view(), kernel, border).mapv(|v| v.round().clamp(0.0, 255.0) as u8)
}

/// Gaussian blur of a byte plane with a fixed kernel size (reflect-101 border).
pub fn gaussian_blur_plane(plane: ArrayView2<u8>, ksize: usize, sigma: f32) -> Array2<u8> {
    let kernel = gaussian_kernel_sized(ksize, sigma);
    blur_plane_u8(plane, &kernel, Border::Reflect101)
}

/// Gaussian blur of every channel of an (H, W, C) matrix with a glow-style
/// radius (sigma), replicating edge pixels.
///
/// # Arguments
/// * `input` - Image with 1, 3, or 4 channels (height, width, channels)
/// * `sigma` - Standard deviation in pixels; `<= 0` returns a copy
///
/// # Returns
/// Blurred image with the same channel count
pub fn gaussian_blur_radius_u8(input: ArrayView3<u8>, sigma: f32) -> Array3<u8> {
    if sigma <= 0.0 {
        return input.to_owned();
    }
    let kernel = gaussian_kernel_1d(sigma);
    let (height, width, channels) = input.dim();
    let mut output = Array3::<u8>::zeros((height, width, channels));
    for c in 0..channels {
        let blurred = blur_plane_u8(input.index_axis(Axis(2), c), &kernel, Border::Replicate);
        output.index_axis_mut(Axis(2), c).assign(&blurred);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_normalized() {
        for kernel in [gaussian_kernel_1d(2.5), gaussian_kernel_sized(21, 0.0)] {
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert_eq!(kernel.len() % 2, 1);
        }
        assert_eq!(gaussian_kernel_sized(21, 0.0).len(), 21);
        assert_eq!(gaussian_kernel_sized(5, 0.0), vec![0.0625, 0.25, 0.375, 0.25, 0.0625]);
    }

    #[test]
    fn test_border_reflect101() {
        assert_eq!(Border::Reflect101.index(-1, 5), 1);
        assert_eq!(Border::Reflect101.index(-2, 5), 2);
        assert_eq!(Border::Reflect101.index(5, 5), 3);
        assert_eq!(Border::Reflect101.index(13, 5), 3);
        assert_eq!(Border::Replicate.index(-3, 5), 0);
        assert_eq!(Border::Reflect101.index(7, 1), 0);
    }

    #[test]
    fn test_uniform_plane_unchanged() {
        let plane = Array2::<u8>::from_elem((9, 13), 77);
        let blurred = gaussian_blur_plane(plane.view(), 21, 0.0);
        assert!(blurred.iter().all(|&v| v == 77));
    }

    #[test]
    fn test_radius_blur_spreads_energy() {
        let mut img = Array3::<u8>::zeros((15, 15, 3));
        img[[7, 7, 0]] = 255;
        let blurred = gaussian_blur_radius_u8(img.view(), 2.0);
        assert!(blurred[[7, 7, 0]] < 255);
        assert!(blurred[[7, 8, 0]] > 0);
        assert_eq!(blurred[[7, 8, 1]], 0);
    }
}
