//! False-color lookup tables.
//!
//! Each [`Colormap`] expands to a 256-entry RGB table. Piecewise-linear maps
//! are given as `(position, value)` anchors per channel; the rest are closed
//! formulas.

use ndarray::{Array3, ArrayView2};

/// Supported colormaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Jet,
    Hsv,
    Ocean,
    Pink,
}

type Anchors = &'static [(f32, f32)];

const JET: [Anchors; 3] = [
    &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)],
    &[(0.0, 0.0), (0.125, 0.0), (0.375, 1.0), (0.64, 1.0), (0.91, 0.0), (1.0, 0.0)],
    &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)],
];

const HSV: [Anchors; 3] = [
    &[
        (0.0, 1.0),
        (0.158730, 1.0),
        (0.174603, 0.968750),
        (0.333333, 0.031250),
        (0.349206, 0.0),
        (0.666667, 0.0),
        (0.682540, 0.031250),
        (0.841270, 0.968750),
        (0.857143, 1.0),
        (1.0, 1.0),
    ],
    &[
        (0.0, 0.0),
        (0.158730, 0.937500),
        (0.174603, 1.0),
        (0.507937, 1.0),
        (0.666667, 0.062500),
        (0.682540, 0.0),
        (1.0, 0.0),
    ],
    &[
        (0.0, 0.0),
        (0.333333, 0.0),
        (0.349206, 0.062500),
        (0.507937, 1.0),
        (0.841270, 1.0),
        (0.857143, 0.937500),
        (1.0, 0.09375),
    ],
];

fn interpolate(anchors: Anchors, x: f32) -> f32 {
    for pair in anchors.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            if x1 <= x0 {
                return y1;
            }
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    anchors.last().map_or(0.0, |&(_, y)| y)
}

impl Colormap {
    /// Normalized RGB (0.0-1.0) at position `x` in 0.0-1.0.
    pub fn sample(self, x: f32) -> [f32; 3] {
        let x = x.clamp(0.0, 1.0);
        match self {
            Colormap::Jet => [
                interpolate(JET[0], x),
                interpolate(JET[1], x),
                interpolate(JET[2], x),
            ],
            Colormap::Hsv => [
                interpolate(HSV[0], x),
                interpolate(HSV[1], x),
                interpolate(HSV[2], x),
            ],
            Colormap::Ocean => [
                (3.0 * x - 2.0).clamp(0.0, 1.0),
                ((3.0 * x - 1.0) / 2.0).abs().clamp(0.0, 1.0),
                x,
            ],
            Colormap::Pink => {
                // sqrt((2 * gray + hot) / 3)
                let hot = [
                    (x / 0.365079).clamp(0.0, 1.0),
                    ((x - 0.365079) / (0.746032 - 0.365079)).clamp(0.0, 1.0),
                    ((x - 0.746032) / (1.0 - 0.746032)).clamp(0.0, 1.0),
                ];
                hot.map(|h| ((2.0 * x + h) / 3.0).sqrt())
            }
        }
    }

    /// 256-entry u8 lookup table.
    pub fn lut(self) -> [[u8; 3]; 256] {
        let mut table = [[0u8; 3]; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let rgb = self.sample(i as f32 / 255.0);
            *entry = rgb.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8);
        }
        table
    }
}

/// Apply a colormap to a grayscale plane.
///
/// # Arguments
/// * `input` - Single channel plane (height, width)
/// * `map` - Colormap to apply
///
/// # Returns
/// RGB image (height, width, 3)
pub fn apply_colormap(input: ArrayView2<u8>, map: Colormap) -> Array3<u8> {
    let lut = map.lut();
    let (height, width) = input.dim();
    Array3::from_shape_fn((height, width, 3), |(y, x, c)| lut[input[[y, x]] as usize][c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_jet_endpoints() {
        let lut = Colormap::Jet.lut();
        assert_eq!(lut[0], [0, 0, 128]);
        assert_eq!(lut[255], [128, 0, 0]);
    }

    #[test]
    fn test_hsv_starts_and_ends_red() {
        let lut = Colormap::Hsv.lut();
        assert_eq!(lut[0], [255, 0, 0]);
        assert_eq!(lut[255][0], 255);
        assert_eq!(lut[255][1], 0);
    }

    #[test]
    fn test_ocean_and_pink_endpoints() {
        assert_eq!(Colormap::Ocean.lut()[255], [255, 255, 255]);
        assert_eq!(Colormap::Ocean.lut()[0][2], 0);
        assert_eq!(Colormap::Pink.lut()[255], [255, 255, 255]);
        assert_eq!(Colormap::Pink.lut()[0], [0, 0, 0]);
    }

    #[test]
    fn test_apply_colormap_shape() {
        let plane = Array2::<u8>::from_elem((3, 4), 0);
        let out = apply_colormap(plane.view(), Colormap::Jet);
        assert_eq!(out.dim(), (3, 4, 3));
        assert_eq!(out[[2, 3, 2]], 128);
    }
}
