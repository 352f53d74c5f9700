//! Color quantization: k-means clustering and median-cut palettes.
//!
//! ## Supported Formats
//!
//! Inputs are RGB matrices `(height, width, 3)`. Extra channels are ignored.

use std::collections::HashMap;

use ndarray::{Array3, ArrayView3, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

// ============================================================================
// K-Means
// ============================================================================

/// Termination and restart settings for [`kmeans`].
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    /// Number of clusters (K).
    pub clusters: usize,
    /// Maximum Lloyd iterations per attempt.
    pub max_iterations: usize,
    /// Stop once no center moves farther than this.
    pub epsilon: f32,
    /// Independent restarts; the most compact result wins.
    pub attempts: usize,
    /// Seed for center initialization.
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            clusters: 6,
            max_iterations: 20,
            epsilon: 0.001,
            attempts: 10,
            seed: 0x5EED,
        }
    }
}

/// Result of a k-means run.
#[derive(Debug, Clone)]
pub struct Clustering {
    pub centers: Vec<[f32; 3]>,
    pub labels: Vec<usize>,
    /// Sum of squared distances of points to their centers.
    pub compactness: f64,
}

#[inline]
fn dist_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

fn nearest(point: &[f32; 3], centers: &[[f32; 3]]) -> (usize, f32) {
    let mut best = (0, f32::MAX);
    for (i, c) in centers.iter().enumerate() {
        let d = dist_sq(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// k-means++ seeding: each new center is drawn with probability
/// proportional to its squared distance from the nearest chosen center.
fn init_centers(points: &[[f32; 3]], k: usize, rng: &mut StdRng) -> Vec<[f32; 3]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..points.len())]);

    let mut dists: Vec<f32> = points.iter().map(|p| dist_sq(p, &centers[0])).collect();
    while centers.len() < k {
        let total: f64 = dists.iter().map(|&d| f64::from(d)).sum();
        let next = if total <= 0.0 {
            rng.random_range(0..points.len())
        } else {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, &d) in dists.iter().enumerate() {
                target -= f64::from(d);
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        let center = points[next];
        centers.push(center);
        dists
            .par_iter_mut()
            .zip(points.par_iter())
            .for_each(|(d, p)| *d = d.min(dist_sq(p, &center)));
    }
    centers
}

fn run_attempt(points: &[[f32; 3]], k: usize, params: &KMeansParams, rng: &mut StdRng) -> Clustering {
    let mut centers = init_centers(points, k, rng);
    let mut labels = vec![0usize; points.len()];
    let eps_sq = params.epsilon * params.epsilon;

    for _ in 0..params.max_iterations.max(1) {
        labels
            .par_iter_mut()
            .zip(points.par_iter())
            .for_each(|(label, p)| *label = nearest(p, &centers).0);

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(labels.iter()) {
            for c in 0..3 {
                sums[label][c] += f64::from(p[c]);
            }
            counts[label] += 1;
        }

        let mut max_shift = 0.0f32;
        for (i, center) in centers.iter_mut().enumerate() {
            if counts[i] == 0 {
                continue;
            }
            let n = counts[i] as f64;
            let updated = [
                (sums[i][0] / n) as f32,
                (sums[i][1] / n) as f32,
                (sums[i][2] / n) as f32,
            ];
            max_shift = max_shift.max(dist_sq(center, &updated));
            *center = updated;
        }

        if max_shift <= eps_sq {
            break;
        }
    }

    let compactness: f64 = labels
        .par_iter_mut()
        .zip(points.par_iter())
        .map(|(label, p)| {
            let (idx, d) = nearest(p, &centers);
            *label = idx;
            f64::from(d)
        })
        .sum();

    Clustering {
        centers,
        labels,
        compactness,
    }
}

/// Cluster 3-component points with k-means.
///
/// Runs `params.attempts` seeded restarts and keeps the one with the lowest
/// compactness. `clusters` is capped at the number of points.
pub fn kmeans(points: &[[f32; 3]], params: &KMeansParams) -> Clustering {
    if points.is_empty() {
        return Clustering {
            centers: Vec::new(),
            labels: Vec::new(),
            compactness: 0.0,
        };
    }
    let k = params.clusters.clamp(1, points.len());
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut best = run_attempt(points, k, params, &mut rng);
    for _ in 1..params.attempts.max(1) {
        let attempt = run_attempt(points, k, params, &mut rng);
        if attempt.compactness < best.compactness {
            best = attempt;
        }
    }
    best
}

/// Replace each pixel by its k-means cluster center.
///
/// # Arguments
/// * `input` - RGB image (height, width, 3)
/// * `params` - Clustering settings
///
/// # Returns
/// RGB image using at most `params.clusters` distinct colors. Centers are
/// truncated to u8.
pub fn kmeans_posterize_u8(input: ArrayView3<u8>, params: &KMeansParams) -> Array3<u8> {
    let (height, width, _) = input.dim();
    let points: Vec<[f32; 3]> = input
        .lanes(Axis(2))
        .into_iter()
        .map(|px| [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])])
        .collect();

    let clustering = kmeans(&points, params);
    let palette: Vec<[u8; 3]> = clustering
        .centers
        .iter()
        .map(|c| [c[0].clamp(0.0, 255.0) as u8, c[1].clamp(0.0, 255.0) as u8, c[2].clamp(0.0, 255.0) as u8])
        .collect();

    let mut output = Array3::<u8>::zeros((height, width, 3));
    for (mut out, &label) in output.lanes_mut(Axis(2)).into_iter().zip(clustering.labels.iter()) {
        let color = palette[label];
        out[0] = color[0];
        out[1] = color[1];
        out[2] = color[2];
    }
    output
}

// ============================================================================
// Median Cut
// ============================================================================

struct ColorBox {
    colors: Vec<([u8; 3], u32)>,
}

impl ColorBox {
    fn pixel_count(&self) -> u64 {
        self.colors.iter().map(|&(_, n)| u64::from(n)).sum()
    }

    /// Longest channel and its extent.
    fn longest_axis(&self) -> (usize, u8) {
        let mut best = (0, 0u8);
        for c in 0..3 {
            let min = self.colors.iter().map(|(rgb, _)| rgb[c]).min().unwrap_or(0);
            let max = self.colors.iter().map(|(rgb, _)| rgb[c]).max().unwrap_or(0);
            if max - min > best.1 {
                best = (c, max - min);
            }
        }
        best
    }

    fn priority(&self) -> u64 {
        u64::from(self.longest_axis().1) * self.pixel_count()
    }

    /// Split at the pixel-weighted median of the longest axis.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (axis, _) = self.longest_axis();
        self.colors.sort_unstable_by_key(|(rgb, _)| rgb[axis]);
        let half = self.pixel_count() / 2;
        let mut acc = 0u64;
        let mut cut = 1;
        for (i, &(_, n)) in self.colors.iter().enumerate() {
            acc += u64::from(n);
            if acc >= half {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.colors.len() - 1);
        let upper = self.colors.split_off(cut);
        (self, ColorBox { colors: upper })
    }

    fn average(&self) -> [u8; 3] {
        let total = self.pixel_count().max(1) as f64;
        let mut sum = [0.0f64; 3];
        for &(rgb, n) in &self.colors {
            for c in 0..3 {
                sum[c] += f64::from(rgb[c]) * f64::from(n);
            }
        }
        [
            (sum[0] / total).round() as u8,
            (sum[1] / total).round() as u8,
            (sum[2] / total).round() as u8,
        ]
    }
}

/// Build an adaptive palette of at most `colors` entries with median cut.
///
/// Boxes are split in order of (extent x population) until the palette is
/// full or every box holds a single color.
pub fn median_cut_palette(input: ArrayView3<u8>, colors: usize) -> Vec<[u8; 3]> {
    let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
    for px in input.lanes(Axis(2)) {
        *counts.entry([px[0], px[1], px[2]]).or_insert(0) += 1;
    }
    if counts.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![ColorBox {
        colors: counts.into_iter().collect(),
    }];

    while boxes.len() < colors.max(1) {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| b.priority())
            .map(|(i, _)| i);
        let Some(index) = candidate else {
            break;
        };
        let (a, b) = boxes.swap_remove(index).split();
        boxes.push(a);
        boxes.push(b);
    }

    let mut palette: Vec<[u8; 3]> = boxes.iter().map(ColorBox::average).collect();
    palette.sort_unstable();
    palette.dedup();
    palette
}

/// Map every pixel to the nearest palette entry (squared RGB distance).
pub fn map_to_palette(input: ArrayView3<u8>, palette: &[[u8; 3]]) -> Array3<u8> {
    let (height, width, _) = input.dim();
    let mut output = Array3::<u8>::zeros((height, width, 3));
    if palette.is_empty() {
        return output;
    }
    let entries: Vec<[f32; 3]> = palette
        .iter()
        .map(|c| [f32::from(c[0]), f32::from(c[1]), f32::from(c[2])])
        .collect();

    Zip::from(output.lanes_mut(Axis(2)))
        .and(input.lanes(Axis(2)))
        .par_for_each(|mut out, px| {
            let point = [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])];
            let (idx, _) = nearest(&point, &entries);
            out[0] = palette[idx][0];
            out[1] = palette[idx][1];
            out[2] = palette[idx][2];
        });
    output
}

/// Reduce an RGB image to an adaptive palette of at most `colors` entries.
pub fn reduce_colors_u8(input: ArrayView3<u8>, colors: usize) -> Array3<u8> {
    let palette = median_cut_palette(input, colors);
    map_to_palette(input, &palette)
}
