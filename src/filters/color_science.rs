//! Color space conversions: RGB <-> HSV and RGB <-> CIE L*a*b*.
//!
//! Both use the 8-bit storage conventions common to image tooling:
//! - **HSV**: H in 0-179 (degrees / 2), S and V in 0-255
//! - **Lab**: L scaled to 0-255 (`L * 255 / 100`), a and b offset by 128
//!
//! Lab assumes sRGB primaries with a D65 white point.

use ndarray::{Array3, ArrayView3, Zip};

// ============================================================================
// Pixel Conversions
// ============================================================================

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;

    let s = if v > 0.0 { diff * 255.0 / v } else { 0.0 };

    let mut h = if diff == 0.0 {
        0.0
    } else if v == rf {
        (gf - bf) * 60.0 / diff
    } else if v == gf {
        120.0 + (bf - rf) * 60.0 / diff
    } else {
        240.0 + (rf - gf) * 60.0 / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h8 = (h / 2.0).round() as u32 % 180;
    (h8 as u8, s.round().min(255.0) as u8, v as u8)
}

/// Convert one 8-bit HSV pixel back to RGB.
pub fn hsv_to_rgb(h: u8, s: u8, v: u8) -> (u8, u8, u8) {
    let s = f32::from(s) / 255.0;
    let v = f32::from(v) / 255.0;
    if s == 0.0 {
        let c = (v * 255.0).round() as u8;
        return (c, c, c);
    }

    let h = (f32::from(h) * 2.0).rem_euclid(360.0) / 60.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let to_u8 = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_u8(r), to_u8(g), to_u8(b))
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

const LAB_EPSILON: f32 = 0.008856;
const LAB_KAPPA: f32 = 903.3;
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

/// Convert one RGB pixel to 8-bit Lab.
pub fn rgb_to_lab(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rl = srgb_to_linear(f32::from(r) / 255.0);
    let gl = srgb_to_linear(f32::from(g) / 255.0);
    let bl = srgb_to_linear(f32::from(b) / 255.0);

    let x = (0.412453 * rl + 0.357580 * gl + 0.180423 * bl) / WHITE_X;
    let y = 0.212671 * rl + 0.715160 * gl + 0.072169 * bl;
    let z = (0.019334 * rl + 0.119193 * gl + 0.950227 * bl) / WHITE_Z;

    let l = if y > LAB_EPSILON { 116.0 * y.cbrt() - 16.0 } else { LAB_KAPPA * y };
    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let a = 500.0 * (fx - fy) + 128.0;
    let bb = 200.0 * (fy - fz) + 128.0;

    let to_u8 = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    (to_u8(l * 255.0 / 100.0), to_u8(a), to_u8(bb))
}

/// Convert one 8-bit Lab pixel back to RGB.
pub fn lab_to_rgb(l: u8, a: u8, b: u8) -> (u8, u8, u8) {
    let l = f32::from(l) * 100.0 / 255.0;
    let a = f32::from(a) - 128.0;
    let b = f32::from(b) - 128.0;

    let y = if l > LAB_KAPPA * LAB_EPSILON {
        ((l + 16.0) / 116.0).powi(3)
    } else {
        l / LAB_KAPPA
    };
    let fy = lab_f(y);
    let x = lab_f_inv(a / 500.0 + fy) * WHITE_X;
    let z = lab_f_inv(fy - b / 200.0) * WHITE_Z;

    let rl = 3.240479 * x - 1.53715 * y - 0.498535 * z;
    let gl = -0.969256 * x + 1.875991 * y + 0.041556 * z;
    let bl = 0.055648 * x - 0.204043 * y + 1.057311 * z;

    let to_u8 = |c: f32| (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_u8(rl), to_u8(gl), to_u8(bl))
}

// ============================================================================
// Image Conversions
// ============================================================================

fn map_pixels(input: ArrayView3<u8>, f: impl Fn(u8, u8, u8) -> (u8, u8, u8) + Sync) -> Array3<u8> {
    let (height, width, _) = input.dim();
    let mut output = Array3::<u8>::zeros((height, width, 3));
    Zip::from(output.lanes_mut(ndarray::Axis(2)))
        .and(input.lanes(ndarray::Axis(2)))
        .par_for_each(|mut out, px| {
            let (a, b, c) = f(px[0], px[1], px[2]);
            out[0] = a;
            out[1] = b;
            out[2] = c;
        });
    output
}

/// RGB(A) matrix to HSV matrix (alpha dropped).
pub fn rgb_to_hsv_u8(input: ArrayView3<u8>) -> Array3<u8> {
    map_pixels(input, rgb_to_hsv)
}

/// HSV matrix to RGB matrix.
pub fn hsv_to_rgb_u8(input: ArrayView3<u8>) -> Array3<u8> {
    map_pixels(input, hsv_to_rgb)
}

/// RGB(A) matrix to Lab matrix (alpha dropped).
pub fn rgb_to_lab_u8(input: ArrayView3<u8>) -> Array3<u8> {
    map_pixels(input, rgb_to_lab)
}

/// Lab matrix to RGB matrix.
pub fn lab_to_rgb_u8(input: ArrayView3<u8>) -> Array3<u8> {
    map_pixels(input, lab_to_rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 255), (90, 255, 255));
        assert_eq!(rgb_to_hsv(128, 128, 128), (0, 0, 128));
    }

    #[test]
    fn test_hsv_round_trip_close() {
        for &(r, g, b) in &[(200u8, 30u8, 90u8), (12, 240, 77), (255, 255, 0), (40, 40, 41)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let (r2, g2, b2) = hsv_to_rgb(h, s, v);
            assert!((i32::from(r) - i32::from(r2)).abs() <= 5, "{r} vs {r2}");
            assert!((i32::from(g) - i32::from(g2)).abs() <= 5, "{g} vs {g2}");
            assert!((i32::from(b) - i32::from(b2)).abs() <= 5, "{b} vs {b2}");
        }
    }

    #[test]
    fn test_lab_gray_axis() {
        let (l, a, b) = rgb_to_lab(255, 255, 255);
        assert_eq!((l, a, b), (255, 128, 128));
        let (l, a, b) = rgb_to_lab(0, 0, 0);
        assert_eq!((l, a, b), (0, 128, 128));
    }

    #[test]
    fn test_lab_round_trip_close() {
        for &(r, g, b) in &[(180u8, 90u8, 120u8), (90, 140, 60), (90, 90, 90)] {
            let (l, a, bb) = rgb_to_lab(r, g, b);
            let (r2, g2, b2) = lab_to_rgb(l, a, bb);
            assert!((i32::from(r) - i32::from(r2)).abs() <= 6, "{r} vs {r2}");
            assert!((i32::from(g) - i32::from(g2)).abs() <= 6, "{g} vs {g2}");
            assert!((i32::from(b) - i32::from(b2)).abs() <= 6, "{b} vs {b2}");
        }
    }

    #[test]
    fn test_matrix_conversion_drops_alpha() {
        let rgba = Array3::<u8>::from_elem((2, 2, 4), 255);
        let hsv = rgb_to_hsv_u8(rgba.view());
        assert_eq!(hsv.dim(), (2, 2, 3));
        assert_eq!(hsv[[0, 0, 2]], 255);
    }
}
