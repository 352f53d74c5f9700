//! Comic art filter: bold outlines over flat k-means colors.

use ndarray::{Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::blur::gaussian_blur_plane;
use super::edge::{laplacian_u8, threshold_binary_inv};
use super::grayscale::to_gray_plane;
use super::quantize::{kmeans_posterize_u8, KMeansParams};

/// Comic art settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComicParams {
    /// Laplacian responses above this become outline.
    pub edge_threshold: u8,
    pub clusters: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub attempts: usize,
    pub seed: u64,
}

impl Default for ComicParams {
    fn default() -> Self {
        let kmeans = KMeansParams::default();
        Self {
            edge_threshold: 80,
            clusters: kmeans.clusters,
            max_iterations: kmeans.max_iterations,
            epsilon: kmeans.epsilon,
            attempts: kmeans.attempts,
            seed: kmeans.seed,
        }
    }
}

impl ComicParams {
    fn kmeans(&self) -> KMeansParams {
        KMeansParams {
            clusters: self.clusters,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            attempts: self.attempts,
            seed: self.seed,
        }
    }
}

/// Convert an image to a comic look.
///
/// The outline mask is the inverse-thresholded 5x5 Laplacian of the blurred
/// gray image; colors are the k-means palette of the input. Outline pixels
/// are forced to black via bitwise AND.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Clustering and outline settings
///
/// # Returns
/// RGB image with the same dimensions
pub fn comic_art(input: ArrayView3<u8>, params: &ComicParams) -> Array3<u8> {
    let gray = to_gray_plane(input);
    let blurred = gaussian_blur_plane(gray.view(), 5, 0.0);
    let edges = laplacian_u8(blurred.view());
    let mask = threshold_binary_inv(edges.view(), params.edge_threshold, 255);

    let mut posterized = kmeans_posterize_u8(input, &params.kmeans());
    Zip::from(posterized.lanes_mut(Axis(2)))
        .and(&mask)
        .par_for_each(|mut px, &m| px.mapv_inplace(|v| v & m));
    posterized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_comic_flat_image_has_no_outline() {
        let input = Array3::<u8>::from_elem((16, 16, 3), 90);
        let out = comic_art(input.view(), &ComicParams::default());
        assert!(out.iter().all(|&v| v == 90));
    }

    #[test]
    fn test_comic_outlines_step_and_limits_palette() {
        let input = Array3::from_shape_fn((20, 20, 3), |(_, x, c)| {
            if x < 10 {
                [200u8, 40, 40][c]
            } else {
                [20u8, 20, 20][c]
            }
        });
        let out = comic_art(input.view(), &ComicParams::default());
        assert_eq!(out.dim(), (20, 20, 3));
        // Dark pixel beside the step is outlined.
        assert_eq!(out[[10, 10, 0]], 0);
        // Far from the step the flat color survives.
        assert_eq!(out[[10, 2, 0]], 200);

        let colors: HashSet<[u8; 3]> = out
            .lanes(Axis(2))
            .into_iter()
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        assert!(colors.len() <= 6);
    }
}
