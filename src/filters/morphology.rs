//! Morphology filters: Dilate with a structuring element.
//!
//! Operates on single-channel byte planes. Pixels outside the image do not
//! participate in the maximum.

use ndarray::{Array2, ArrayView2, Zip};

/// Shape of the neighborhood taken into the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// Filled rectangle of `width x height`.
    Rect { width: usize, height: usize },
    /// Ellipse inscribed in `width x height`. A 3x3 ellipse is a cross.
    Ellipse { width: usize, height: usize },
}

impl StructuringElement {
    /// Build the element's offsets relative to its anchor (the center,
    /// `size / 2` on each axis).
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        match *self {
            StructuringElement::Rect { width, height } => {
                let (ax, ay) = ((width / 2) as isize, (height / 2) as isize);
                let mut offsets = Vec::with_capacity(width * height);
                for y in 0..height as isize {
                    for x in 0..width as isize {
                        offsets.push((y - ay, x - ax));
                    }
                }
                offsets
            }
            StructuringElement::Ellipse { width, height } => {
                let r = (width / 2) as isize;
                let c = (height / 2) as isize;
                let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
                let mut offsets = Vec::new();
                for i in 0..height as isize {
                    let dy = i - c;
                    if dy.abs() > r {
                        continue;
                    }
                    let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
                    let j1 = (c - dx).max(0);
                    let j2 = (c + dx + 1).min(width as isize);
                    for j in j1..j2 {
                        offsets.push((dy, j - r));
                    }
                }
                offsets
            }
        }
    }
}

// ============================================================================
// Dilate
// ============================================================================

/// Apply dilation to a plane - u8 version.
///
/// Dilate takes the maximum value in the neighborhood,
/// making bright regions grow and dark regions shrink.
///
/// # Arguments
/// * `input` - Single channel plane (height, width)
/// * `element` - Structuring element
/// * `iterations` - Number of successive dilations
///
/// # Returns
/// Dilated plane
pub fn dilate_u8(input: ArrayView2<u8>, element: StructuringElement, iterations: usize) -> Array2<u8> {
    let offsets = element.offsets();
    let mut current = input.to_owned();
    for _ in 0..iterations {
        current = dilate_once(current.view(), &offsets);
    }
    current
}

fn dilate_once(input: ArrayView2<u8>, offsets: &[(isize, isize)]) -> Array2<u8> {
    let (height, width) = input.dim();
    let mut output = Array2::<u8>::zeros((height, width));
    Zip::indexed(&mut output).par_for_each(|(y, x), out| {
        let mut max_val = 0u8;
        for &(dy, dx) in offsets {
            let sy = y as isize + dy;
            let sx = x as isize + dx;
            if sy < 0 || sy >= height as isize || sx < 0 || sx >= width as isize {
                continue;
            }
            max_val = max_val.max(input[[sy as usize, sx as usize]]);
        }
        *out = max_val;
    });
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipse_3x3_is_cross() {
        let mut offsets = StructuringElement::Ellipse { width: 3, height: 3 }.offsets();
        offsets.sort();
        assert_eq!(offsets, vec![(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_rect_2x2_anchor() {
        let mut offsets = StructuringElement::Rect { width: 2, height: 2 }.offsets();
        offsets.sort();
        assert_eq!(offsets, vec![(-1, -1), (-1, 0), (0, -1), (0, 0)]);
    }

    #[test]
    fn test_dilate_grows_point() {
        let mut plane = Array2::<u8>::zeros((7, 7));
        plane[[3, 3]] = 255;
        let cross = StructuringElement::Ellipse { width: 3, height: 3 };

        let once = dilate_u8(plane.view(), cross, 1);
        assert_eq!(once.iter().filter(|&&v| v == 255).count(), 5);
        assert_eq!(once[[2, 2]], 0);

        let twice = dilate_u8(plane.view(), cross, 2);
        // Diamond of radius 2
        assert_eq!(twice.iter().filter(|&&v| v == 255).count(), 13);
        assert_eq!(twice[[2, 2]], 255);
    }

    #[test]
    fn test_dilate_at_border() {
        let mut plane = Array2::<u8>::zeros((3, 3));
        plane[[0, 0]] = 9;
        let out = dilate_u8(plane.view(), StructuringElement::Rect { width: 2, height: 2 }, 1);
        // Offsets point up/left, so the value spreads down/right.
        assert_eq!(out[[1, 1]], 9);
        assert_eq!(out[[0, 0]], 9);
        assert_eq!(out[[2, 2]], 0);
    }
}
