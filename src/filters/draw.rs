//! Raster primitives on byte planes: lines and filled circles.
//!
//! Coordinates are `(x, y)` and may lie outside the plane; only the visible
//! part of a shape is drawn.

use ndarray::Array2;

#[inline]
fn put(plane: &mut Array2<u8>, x: i64, y: i64, value: u8) {
    let (height, width) = plane.dim();
    if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
        plane[[y as usize, x as usize]] = value;
    }
}

/// Draw an 8-connected, one pixel wide line with Bresenham's algorithm.
pub fn draw_line(plane: &mut Array2<u8>, from: (i64, i64), to: (i64, i64), value: u8) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(plane, x0, y0, value);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draw a filled disc of the given radius centered on `center`.
pub fn fill_circle(plane: &mut Array2<u8>, center: (i64, i64), radius: i64, value: u8) {
    let (cx, cy) = center;
    let r_sq = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r_sq {
                put(plane, cx + dx, cy + dy, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_line() {
        let mut plane = Array2::<u8>::zeros((5, 5));
        draw_line(&mut plane, (0, 0), (4, 4), 9);
        for i in 0..5 {
            assert_eq!(plane[[i, i]], 9);
        }
        assert_eq!(plane.iter().filter(|&&v| v == 9).count(), 5);
    }

    #[test]
    fn test_line_clipped_outside() {
        let mut plane = Array2::<u8>::zeros((4, 4));
        draw_line(&mut plane, (0, -2), (6, 4), 1);
        assert_eq!(plane[[0, 2]], 1);
        assert_eq!(plane[[3, 3]], 0);
        assert_eq!(plane[[1, 3]], 1);
    }

    #[test]
    fn test_fill_circle() {
        let mut plane = Array2::<u8>::from_elem((7, 7), 255);
        fill_circle(&mut plane, (3, 3), 1, 0);
        assert_eq!(plane.iter().filter(|&&v| v == 0).count(), 5);
        fill_circle(&mut plane, (0, 0), 2, 0);
        assert_eq!(plane[[0, 0]], 0);
        assert_eq!(plane[[2, 0]], 0);
        assert_eq!(plane[[2, 2]], 255);
    }
}
