//! Minimal CPU tensor operations for the stylization networks.
//!
//! Activations are single images in (C, H, W) layout. Batching happens one
//! level up: the [`Model`](crate::inference::Model) implementations squeeze
//! and unsqueeze the leading batch axis.
//!
//! Layers own their parameters and start from the initialization a missing
//! checkpoint entry leaves behind: convolution weights and biases zero,
//! normalization scale one and shift zero.

pub mod animegan;
pub mod checkpoint;
pub mod transformer_net;

use ndarray::parallel::prelude::*;
use ndarray::{s, Array1, Array3, Array4, ArrayView3, Axis, Zip};

use crate::error::Result;
use crate::filters::blur::Border;
use checkpoint::Binder;

pub use animegan::AnimeGanGenerator;
pub use checkpoint::{BindReport, Checkpoint, Migration, MIGRATIONS};
pub use transformer_net::TransformerNet;

/// Epsilon of instance and group normalization.
const NORM_EPS: f32 = 1e-5;

// ============================================================================
// Layers
// ============================================================================

/// 2D convolution without padding. Pad explicitly before calling
/// [`Conv2d::forward`].
#[derive(Debug, Clone)]
pub struct Conv2d {
    /// (out, in / groups, kh, kw)
    pub weight: Array4<f32>,
    pub bias: Option<Array1<f32>>,
    pub stride: usize,
    pub groups: usize,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, stride: usize, bias: bool) -> Self {
        Self::grouped(in_channels, out_channels, kernel, stride, 1, bias)
    }

    pub fn grouped(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        bias: bool,
    ) -> Self {
        Self {
            weight: Array4::zeros((out_channels, in_channels / groups, kernel, kernel)),
            bias: bias.then(|| Array1::zeros(out_channels)),
            stride: stride.max(1),
            groups: groups.max(1),
        }
    }

    pub fn bind(&mut self, binder: &mut Binder, prefix: &str) -> Result<()> {
        binder.bind(&format!("{prefix}.weight"), &mut self.weight)?;
        if let Some(bias) = self.bias.as_mut() {
            binder.bind(&format!("{prefix}.bias"), bias)?;
        }
        Ok(())
    }

    /// Valid convolution. Output channels are computed in parallel.
    pub fn forward(&self, input: ArrayView3<f32>) -> Array3<f32> {
        let (_, height, width) = input.dim();
        let (out_channels, group_in, kh, kw) = self.weight.dim();
        let stride = self.stride;
        let out_h = height.saturating_sub(kh) / stride + 1;
        let out_w = width.saturating_sub(kw) / stride + 1;
        let group_out = (out_channels / self.groups).max(1);
        let step = stride as isize;

        let mut output = Array3::<f32>::zeros((out_channels, out_h, out_w));
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(oc, mut plane)| {
                if let Some(bias) = &self.bias {
                    plane.fill(bias[oc]);
                }
                let first_in = (oc / group_out) * group_in;
                for ic in 0..group_in {
                    let src = input.index_axis(Axis(0), first_in + ic);
                    for ky in 0..kh {
                        for kx in 0..kw {
                            let w = self.weight[[oc, ic, ky, kx]];
                            if w == 0.0 {
                                continue;
                            }
                            let window = src.slice(s![
                                ky..ky + stride * (out_h - 1) + 1;step,
                                kx..kx + stride * (out_w - 1) + 1;step
                            ]);
                            plane.scaled_add(w, &window);
                        }
                    }
                }
            });
        output
    }
}

/// Per-channel normalization over (H, W) with an affine transform.
#[derive(Debug, Clone)]
pub struct InstanceNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
}

impl InstanceNorm {
    pub fn new(channels: usize) -> Self {
        Self {
            weight: Array1::ones(channels),
            bias: Array1::zeros(channels),
        }
    }

    pub fn bind(&mut self, binder: &mut Binder, prefix: &str) -> Result<()> {
        binder.bind(&format!("{prefix}.weight"), &mut self.weight)?;
        binder.bind(&format!("{prefix}.bias"), &mut self.bias)
    }

    pub fn forward(&self, input: &mut Array3<f32>) {
        input
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(c, mut plane)| {
                let n = plane.len().max(1) as f32;
                let mean = plane.sum() / n;
                let var = plane.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n;
                let scale = self.weight[c] / (var + NORM_EPS).sqrt();
                let shift = self.bias[c] - mean * scale;
                plane.mapv_inplace(|v| v * scale + shift);
            });
    }
}

/// Normalization over groups of channels with a per-channel affine
/// transform. One group normalizes over the whole (C, H, W) activation.
#[derive(Debug, Clone)]
pub struct GroupNorm {
    pub groups: usize,
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
}

impl GroupNorm {
    pub fn new(groups: usize, channels: usize) -> Self {
        Self {
            groups: groups.max(1),
            weight: Array1::ones(channels),
            bias: Array1::zeros(channels),
        }
    }

    pub fn bind(&mut self, binder: &mut Binder, prefix: &str) -> Result<()> {
        binder.bind(&format!("{prefix}.weight"), &mut self.weight)?;
        binder.bind(&format!("{prefix}.bias"), &mut self.bias)
    }

    pub fn forward(&self, input: &mut Array3<f32>) {
        let channels = input.dim().0;
        let per_group = (channels / self.groups).max(1);
        for g in 0..self.groups {
            let range = g * per_group..((g + 1) * per_group).min(channels);
            let mut group = input.slice_mut(s![range.clone(), .., ..]);
            let n = group.len().max(1) as f64;
            let mean = group.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
            let var = group
                .iter()
                .map(|&v| (f64::from(v) - mean).powi(2))
                .sum::<f64>()
                / n;
            let inv_std = 1.0 / (var + f64::from(NORM_EPS)).sqrt();
            let (mean, inv_std) = (mean as f32, inv_std as f32);

            for (i, mut plane) in group.axis_iter_mut(Axis(0)).enumerate() {
                let c = range.start + i;
                let scale = self.weight[c] * inv_std;
                let shift = self.bias[c] - mean * scale;
                plane.par_mapv_inplace(|v| v * scale + shift);
            }
        }
    }
}

// ============================================================================
// Functional ops
// ============================================================================

/// Reflection padding (edge pixel not repeated). Works for any spatial size,
/// including pads larger than the input.
pub fn reflection_pad(input: ArrayView3<f32>, top: usize, bottom: usize, left: usize, right: usize) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    let out_h = height + top + bottom;
    let out_w = width + left + right;
    let rows: Vec<usize> = (0..out_h)
        .map(|y| Border::Reflect101.index(y as isize - top as isize, height))
        .collect();
    let cols: Vec<usize> = (0..out_w)
        .map(|x| Border::Reflect101.index(x as isize - left as isize, width))
        .collect();

    let mut output = Array3::<f32>::zeros((channels, out_h, out_w));
    Zip::indexed(&mut output).par_for_each(|(c, y, x), out| {
        *out = input[[c, rows[y], cols[x]]];
    });
    output
}

/// Symmetric reflection padding.
pub fn reflection_pad_same(input: ArrayView3<f32>, pad: usize) -> Array3<f32> {
    reflection_pad(input, pad, pad, pad, pad)
}

pub fn relu(input: &mut Array3<f32>) {
    input.par_mapv_inplace(|v| v.max(0.0));
}

pub fn leaky_relu(input: &mut Array3<f32>, slope: f32) {
    input.par_mapv_inplace(|v| if v >= 0.0 { v } else { v * slope });
}

pub fn tanh(input: &mut Array3<f32>) {
    input.par_mapv_inplace(f32::tanh);
}

/// Nearest-neighbor upsampling by an integer factor.
pub fn upsample_nearest(input: ArrayView3<f32>, factor: usize) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    let factor = factor.max(1);
    let mut output = Array3::<f32>::zeros((channels, height * factor, width * factor));
    Zip::indexed(&mut output).par_for_each(|(c, y, x), out| {
        *out = input[[c, y / factor, x / factor]];
    });
    output
}

/// Bilinear resize with aligned corners: the corner samples of input and
/// output coincide.
pub fn resize_bilinear_align_corners(input: ArrayView3<f32>, out_h: usize, out_w: usize) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    let ratio = |src: usize, dst: usize| {
        if dst > 1 {
            (src - 1) as f32 / (dst - 1) as f32
        } else {
            0.0
        }
    };
    let (ry, rx) = (ratio(height, out_h), ratio(width, out_w));

    let mut output = Array3::<f32>::zeros((channels, out_h, out_w));
    Zip::indexed(&mut output).par_for_each(|(c, y, x), out| {
        let fy = y as f32 * ry;
        let fx = x as f32 * rx;
        let y0 = (fy.floor() as usize).min(height - 1);
        let x0 = (fx.floor() as usize).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);
        let (dy, dx) = (fy - y0 as f32, fx - x0 as f32);

        let top = input[[c, y0, x0]] * (1.0 - dx) + input[[c, y0, x1]] * dx;
        let bottom = input[[c, y1, x0]] * (1.0 - dx) + input[[c, y1, x1]] * dx;
        *out = top * (1.0 - dy) + bottom * dy;
    });
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_conv_identity_kernel() {
        let mut conv = Conv2d::new(1, 1, 3, 1, false);
        conv.weight[[0, 0, 1, 1]] = 1.0;
        let input = Array3::from_shape_fn((1, 4, 5), |(_, y, x)| (y * 5 + x) as f32);
        let out = conv.forward(input.view());
        assert_eq!(out.dim(), (1, 2, 3));
        assert_eq!(out[[0, 0, 0]], input[[0, 1, 1]]);
        assert_eq!(out[[0, 1, 2]], input[[0, 2, 3]]);
    }

    #[test]
    fn test_conv_stride_and_bias() {
        let mut conv = Conv2d::new(2, 1, 1, 2, true);
        conv.weight[[0, 0, 0, 0]] = 1.0;
        conv.weight[[0, 1, 0, 0]] = 2.0;
        conv.bias.as_mut().unwrap()[0] = 0.5;
        let input = Array3::from_elem((2, 4, 4), 1.0f32);
        let out = conv.forward(input.view());
        assert_eq!(out.dim(), (1, 2, 2));
        assert!(out.iter().all(|&v| (v - 3.5).abs() < 1e-6));
    }

    #[test]
    fn test_depthwise_conv_keeps_channels_apart() {
        let mut conv = Conv2d::grouped(2, 2, 1, 1, 2, false);
        conv.weight[[0, 0, 0, 0]] = 1.0;
        conv.weight[[1, 0, 0, 0]] = -1.0;
        let mut input = Array3::<f32>::zeros((2, 2, 2));
        input.index_axis_mut(Axis(0), 0).fill(3.0);
        input.index_axis_mut(Axis(0), 1).fill(5.0);
        let out = conv.forward(input.view());
        assert_eq!(out[[0, 0, 0]], 3.0);
        assert_eq!(out[[1, 1, 1]], -5.0);
    }

    #[test]
    fn test_reflection_pad() {
        let input = Array3::from_shape_fn((1, 1, 3), |(_, _, x)| x as f32);
        let padded = reflection_pad(input.view(), 0, 0, 2, 2);
        let row: Vec<f32> = padded.iter().copied().collect();
        assert_eq!(row, vec![2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_instance_norm_standardizes() {
        let mut x = Array3::from_shape_fn((2, 3, 3), |(c, y, x)| (c * 10 + y * 3 + x) as f32);
        InstanceNorm::new(2).forward(&mut x);
        for plane in x.axis_iter(Axis(0)) {
            let mean = plane.sum() / 9.0;
            let var = plane.fold(0.0, |a, &v| a + v * v) / 9.0;
            assert!(mean.abs() < 1e-4);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_group_norm_single_group() {
        let mut x = Array3::from_shape_fn((2, 2, 2), |(c, _, _)| c as f32);
        let mut norm = GroupNorm::new(1, 2);
        norm.bias[1] = 1.0;
        norm.forward(&mut x);
        assert!((x[[0, 0, 0]] + 1.0).abs() < 1e-3);
        assert!((x[[1, 0, 0]] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_upsample_and_bilinear() {
        let input = Array3::from_shape_fn((1, 2, 2), |(_, y, x)| (y * 2 + x) as f32);
        let up = upsample_nearest(input.view(), 2);
        assert_eq!(up.dim(), (1, 4, 4));
        assert_eq!(up[[0, 3, 3]], 3.0);

        let resized = resize_bilinear_align_corners(input.view(), 3, 3);
        assert_eq!(resized[[0, 0, 0]], 0.0);
        assert_eq!(resized[[0, 2, 2]], 3.0);
        assert!((resized[[0, 1, 1]] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_activations() {
        let mut x = Array3::from_shape_vec((1, 1, 3), vec![-2.0, 0.0, 2.0]).unwrap();
        let mut y = x.clone();
        relu(&mut x);
        assert_eq!(x.as_slice().unwrap(), &[0.0, 0.0, 2.0]);
        leaky_relu(&mut y, 0.2);
        assert!((y[[0, 0, 0]] + 0.4).abs() < 1e-6);
        let mut z = Array3::from_elem((1, 1, 1), 100.0f32);
        tanh(&mut z);
        assert!((z[[0, 0, 0]] - 1.0).abs() < 1e-6);
    }
}
