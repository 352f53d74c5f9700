//! Histogram utilities: per-plane histogram and equalization.

use ndarray::{Array2, ArrayView2};

/// Compute a 256-bin histogram of a plane.
pub fn compute_histogram(input: ArrayView2<u8>) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &v in input.iter() {
        hist[v as usize] += 1;
    }
    hist
}

/// Histogram equalization of a plane.
///
/// The cumulative distribution is stretched so the lowest occupied bin maps
/// to 0 and the highest to 255. A plane holding a single value is returned
/// unchanged.
///
/// # Arguments
/// * `input` - Single channel plane (height, width)
///
/// # Returns
/// Equalized plane
pub fn equalize_plane(input: ArrayView2<u8>) -> Array2<u8> {
    let hist = compute_histogram(input);
    let total: u32 = hist.iter().sum();

    let Some(first) = hist.iter().position(|&count| count > 0) else {
        return input.to_owned();
    };
    if hist[first] == total {
        return input.to_owned();
    }

    let scale = 255.0 / (total - hist[first]) as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0u32;
    for i in (first + 1)..256 {
        sum += hist[i];
        lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }

    input.mapv(|v| lut[v as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_counts() {
        let plane = Array2::from_shape_vec((2, 2), vec![0u8, 0, 7, 255]).unwrap();
        let hist = compute_histogram(plane.view());
        assert_eq!(hist[0], 2);
        assert_eq!(hist[7], 1);
        assert_eq!(hist[255], 1);
    }

    #[test]
    fn test_equalize_stretches_range() {
        let plane = Array2::from_shape_vec((1, 4), vec![100u8, 101, 102, 103]).unwrap();
        let out = equalize_plane(plane.view());
        assert_eq!(out.as_slice().unwrap(), &[0, 85, 170, 255]);
    }

    #[test]
    fn test_equalize_uniform_unchanged() {
        let plane = Array2::<u8>::from_elem((3, 3), 42);
        assert!(equalize_plane(plane.view()).iter().all(|&v| v == 42));
    }
}
