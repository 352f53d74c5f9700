//! Noise removal filters: Bilateral, Median.
//!
//! ## Supported Formats
//!
//! - **Bilateral**: 1 or 3 channels. For color input the range distance is
//!   the L1 sum of per-channel differences, so all channels share one weight.
//! - **Median**: any channel count, each channel filtered independently.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};

use super::blur::Border;

// ============================================================================
// Bilateral Filter
// ============================================================================

/// Apply an edge-preserving bilateral filter - u8 version.
///
/// Neighbors inside a disc of diameter `diameter` are averaged, weighted by
/// both spatial distance and intensity similarity. Borders use reflect-101.
///
/// # Arguments
/// * `input` - Image with 1 or 3 channels (height, width, channels)
/// * `diameter` - Neighborhood diameter in pixels (e.g. 9)
/// * `sigma_color` - Range sigma; larger mixes more dissimilar colors
/// * `sigma_space` - Spatial sigma in pixels
///
/// # Returns
/// Filtered image with same channel count
pub fn bilateral_u8(
    input: ArrayView3<u8>,
    diameter: usize,
    sigma_color: f32,
    sigma_space: f32,
) -> Array3<u8> {
    let (height, width, channels) = input.dim();
    let radius = (diameter / 2).max(1) as isize;
    let sigma_color = if sigma_color <= 0.0 { 1.0 } else { sigma_color };
    let sigma_space = if sigma_space <= 0.0 { 1.0 } else { sigma_space };

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    // Range weights indexed by the (L1) intensity distance.
    let color_weights: Vec<f32> = (0..=(255 * channels))
        .map(|d| {
            let d = d as f32;
            (d * d * color_coeff).exp()
        })
        .collect();

    // Spatial offsets restricted to the disc.
    let mut offsets: Vec<(isize, isize, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r_sq = (dx * dx + dy * dy) as f32;
            if r_sq <= (radius * radius) as f32 {
                offsets.push((dy, dx, (r_sq * space_coeff).exp()));
            }
        }
    }

    let mut output = Array3::<u8>::zeros((height, width, channels));
    Zip::indexed(output.lanes_mut(Axis(2))).par_for_each(|(y, x), mut out| {
        let mut sum = [0.0f32; 4];
        let mut weight_sum = 0.0f32;
        for &(dy, dx, space_w) in &offsets {
            let sy = Border::Reflect101.index(y as isize + dy, height);
            let sx = Border::Reflect101.index(x as isize + dx, width);
            let mut dist = 0usize;
            for c in 0..channels {
                dist += (i32::from(input[[sy, sx, c]]) - i32::from(input[[y, x, c]])).unsigned_abs()
                    as usize;
            }
            let w = space_w * color_weights[dist];
            for c in 0..channels {
                sum[c] += w * f32::from(input[[sy, sx, c]]);
            }
            weight_sum += w;
        }
        for c in 0..channels {
            out[c] = (sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
        }
    });

    output
}

/// Bilateral filter of a single grayscale plane.
pub fn bilateral_plane(
    plane: ArrayView2<u8>,
    diameter: usize,
    sigma_color: f32,
    sigma_space: f32,
) -> Array2<u8> {
    let input = plane.insert_axis(Axis(2));
    let filtered = bilateral_u8(input, diameter, sigma_color, sigma_space);
    filtered.index_axis_move(Axis(2), 0)
}

// ============================================================================
// Median Filter
// ============================================================================

/// Apply median filter - u8 version.
///
/// Removes salt-and-pepper noise while preserving edges. Borders replicate
/// the outermost pixels.
///
/// # Arguments
/// * `input` - Single channel plane (height, width)
/// * `ksize` - Odd aperture size (e.g. 5 for a 5x5 window)
///
/// # Returns
/// Median-filtered plane
pub fn median_plane(input: ArrayView2<u8>, ksize: usize) -> Array2<u8> {
    let (height, width) = input.dim();
    let radius = (ksize.max(1) / 2) as isize;
    let window_size = ((radius * 2 + 1) * (radius * 2 + 1)) as usize;

    let mut output = Array2::<u8>::zeros((height, width));
    Zip::indexed(&mut output).par_for_each(|(y, x), out| {
        let mut values: Vec<u8> = Vec::with_capacity(window_size);
        for dy in -radius..=radius {
            let sy = Border::Replicate.index(y as isize + dy, height);
            for dx in -radius..=radius {
                let sx = Border::Replicate.index(x as isize + dx, width);
                values.push(input[[sy, sx]]);
            }
        }
        values.sort_unstable();
        *out = values[values.len() / 2];
    });

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilateral_uniform_is_identity() {
        let img = Array3::<u8>::from_elem((6, 7, 3), 120);
        let out = bilateral_u8(img.view(), 9, 75.0, 75.0);
        assert!(out.iter().all(|&v| v == 120));
    }

    #[test]
    fn test_bilateral_preserves_strong_edge() {
        let mut plane = Array2::<u8>::zeros((10, 10));
        for y in 0..10 {
            for x in 5..10 {
                plane[[y, x]] = 255;
            }
        }
        let out = bilateral_plane(plane.view(), 9, 20.0, 75.0);
        // A 255-level step is far beyond sigma_color, so the sides stay apart.
        assert!(out[[5, 4]] < 10);
        assert!(out[[5, 5]] > 245);
    }

    #[test]
    fn test_bilateral_smooths_small_noise() {
        let mut plane = Array2::<u8>::from_elem((9, 9), 100);
        plane[[4, 4]] = 120;
        let out = bilateral_plane(plane.view(), 9, 75.0, 75.0);
        assert!(out[[4, 4]] < 120);
        assert!(out[[4, 4]] >= 100);
    }

    #[test]
    fn test_median_removes_salt() {
        let mut plane = Array2::<u8>::from_elem((7, 7), 50);
        plane[[3, 3]] = 255;
        plane[[0, 0]] = 0;
        let out = median_plane(plane.view(), 5);
        assert_eq!(out[[3, 3]], 50);
        assert_eq!(out[[0, 0]], 50);
    }
}
