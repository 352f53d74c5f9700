//! AnimeGAN v2 generator (the `face_paint_512_v2` checkpoint family).
//!
//! Parameter names follow the PyTorch `nn.Sequential` indexing of the
//! reference generator, e.g. `block_c.1.layers.1.1.weight` for the depthwise
//! conv of the first inverted residual block.

use ndarray::{Array3, ArrayView3};

use super::checkpoint::{BindReport, Binder, Checkpoint};
use super::{leaky_relu, reflection_pad, resize_bilinear_align_corners, tanh, Conv2d, GroupNorm};
use crate::error::Result;

const LEAKY_SLOPE: f32 = 0.2;

/// Reflect pad → conv → single-group norm → leaky ReLU.
#[derive(Debug, Clone)]
struct ConvNormLReLU {
    /// (top, bottom, left, right)
    padding: (usize, usize, usize, usize),
    conv: Conv2d,
    norm: GroupNorm,
}

impl ConvNormLReLU {
    fn new(in_ch: usize, out_ch: usize) -> Self {
        Self::with(in_ch, out_ch, 3, 1, 1, 1, false)
    }

    fn kernel(in_ch: usize, out_ch: usize, kernel: usize, pad: usize) -> Self {
        Self::with(in_ch, out_ch, kernel, 1, pad, 1, false)
    }

    /// Stride 2 with the asymmetric (right, bottom) padding of the
    /// downsampling layers.
    fn downsample(in_ch: usize, out_ch: usize) -> Self {
        Self {
            padding: (0, 1, 0, 1),
            ..Self::with(in_ch, out_ch, 3, 2, 0, 1, false)
        }
    }

    fn depthwise(channels: usize) -> Self {
        Self::with(channels, channels, 3, 1, 1, channels, true)
    }

    fn with(in_ch: usize, out_ch: usize, kernel: usize, stride: usize, pad: usize, groups: usize, bias: bool) -> Self {
        Self {
            padding: (pad, pad, pad, pad),
            conv: Conv2d::grouped(in_ch, out_ch, kernel, stride, groups, bias),
            norm: GroupNorm::new(1, out_ch),
        }
    }

    fn bind(&mut self, binder: &mut Binder, prefix: &str) -> Result<()> {
        self.conv.bind(binder, &format!("{prefix}.1"))?;
        self.norm.bind(binder, &format!("{prefix}.2"))
    }

    fn forward(&self, input: ArrayView3<f32>) -> Array3<f32> {
        let (top, bottom, left, right) = self.padding;
        let padded = reflection_pad(input, top, bottom, left, right);
        let mut out = self.conv.forward(padded.view());
        self.norm.forward(&mut out);
        leaky_relu(&mut out, LEAKY_SLOPE);
        out
    }
}

/// Expand (1x1) → depthwise (3x3) → project (1x1) with a residual
/// connection when the channel count is unchanged.
#[derive(Debug, Clone)]
struct InvertedResBlock {
    expand: ConvNormLReLU,
    depthwise: ConvNormLReLU,
    project: Conv2d,
    norm: GroupNorm,
    residual: bool,
}

impl InvertedResBlock {
    fn new(in_ch: usize, out_ch: usize) -> Self {
        let bottleneck = in_ch * 2;
        Self {
            expand: ConvNormLReLU::kernel(in_ch, bottleneck, 1, 0),
            depthwise: ConvNormLReLU::depthwise(bottleneck),
            project: Conv2d::new(bottleneck, out_ch, 1, 1, false),
            norm: GroupNorm::new(1, out_ch),
            residual: in_ch == out_ch,
        }
    }

    fn bind(&mut self, binder: &mut Binder, prefix: &str) -> Result<()> {
        self.expand.bind(binder, &format!("{prefix}.layers.0"))?;
        self.depthwise.bind(binder, &format!("{prefix}.layers.1"))?;
        self.project.bind(binder, &format!("{prefix}.layers.2"))?;
        self.norm.bind(binder, &format!("{prefix}.layers.3"))
    }

    fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let out = self.expand.forward(input.view());
        let out = self.depthwise.forward(out.view());
        let mut out = self.project.forward(out.view());
        self.norm.forward(&mut out);
        if self.residual {
            out += input;
        }
        out
    }
}

#[derive(Debug, Clone)]
enum Stage {
    Conv(ConvNormLReLU),
    Residual(InvertedResBlock),
}

impl Stage {
    fn bind(&mut self, binder: &mut Binder, prefix: &str) -> Result<()> {
        match self {
            Stage::Conv(layer) => layer.bind(binder, prefix),
            Stage::Residual(block) => block.bind(binder, prefix),
        }
    }

    fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        match self {
            Stage::Conv(layer) => layer.forward(input.view()),
            Stage::Residual(block) => block.forward(input),
        }
    }
}

#[derive(Debug, Clone)]
struct Block {
    name: &'static str,
    stages: Vec<Stage>,
}

impl Block {
    fn bind(&mut self, binder: &mut Binder) -> Result<()> {
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.bind(binder, &format!("{}.{i}", self.name))?;
        }
        Ok(())
    }

    fn forward(&self, input: Array3<f32>) -> Array3<f32> {
        self.stages.iter().fold(input, |x, stage| stage.forward(&x))
    }
}

/// AnimeGAN v2 generator. Inputs are (3, H, W) in [-1, 1]; outputs are
/// (3, H, W) in [-1, 1].
#[derive(Debug, Clone)]
pub struct AnimeGanGenerator {
    block_a: Block,
    block_b: Block,
    block_c: Block,
    block_d: Block,
    block_e: Block,
    out_layer: Conv2d,
}

impl Default for AnimeGanGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimeGanGenerator {
    pub fn new() -> Self {
        use Stage::{Conv, Residual};
        Self {
            block_a: Block {
                name: "block_a",
                stages: vec![
                    Conv(ConvNormLReLU::kernel(3, 32, 7, 3)),
                    Conv(ConvNormLReLU::downsample(32, 64)),
                    Conv(ConvNormLReLU::new(64, 64)),
                ],
            },
            block_b: Block {
                name: "block_b",
                stages: vec![
                    Conv(ConvNormLReLU::downsample(64, 128)),
                    Conv(ConvNormLReLU::new(128, 128)),
                ],
            },
            block_c: Block {
                name: "block_c",
                stages: vec![
                    Conv(ConvNormLReLU::new(128, 128)),
                    Residual(InvertedResBlock::new(128, 256)),
                    Residual(InvertedResBlock::new(256, 256)),
                    Residual(InvertedResBlock::new(256, 256)),
                    Residual(InvertedResBlock::new(256, 256)),
                    Conv(ConvNormLReLU::new(256, 128)),
                ],
            },
            block_d: Block {
                name: "block_d",
                stages: vec![
                    Conv(ConvNormLReLU::new(128, 128)),
                    Conv(ConvNormLReLU::new(128, 128)),
                ],
            },
            block_e: Block {
                name: "block_e",
                stages: vec![
                    Conv(ConvNormLReLU::new(128, 64)),
                    Conv(ConvNormLReLU::new(64, 64)),
                    Conv(ConvNormLReLU::kernel(64, 32, 7, 3)),
                ],
            },
            out_layer: Conv2d::new(32, 3, 1, 1, false),
        }
    }

    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<(Self, BindReport)> {
        let mut net = Self::new();
        let mut binder = checkpoint.binder();
        for block in [
            &mut net.block_a,
            &mut net.block_b,
            &mut net.block_c,
            &mut net.block_d,
            &mut net.block_e,
        ] {
            block.bind(&mut binder)?;
        }
        net.out_layer.bind(&mut binder, "out_layer.0")?;
        Ok((net, binder.finish()))
    }

    pub fn forward(&self, input: ArrayView3<f32>) -> Array3<f32> {
        let (_, height, width) = input.dim();

        let out = self.block_a.forward(input.to_owned());
        let (_, half_h, half_w) = out.dim();
        let out = self.block_b.forward(out);
        let out = self.block_c.forward(out);

        let out = resize_bilinear_align_corners(out.view(), half_h, half_w);
        let out = self.block_d.forward(out);

        let out = resize_bilinear_align_corners(out.view(), height, width);
        let out = self.block_e.forward(out);

        let mut out = self.out_layer.forward(out.view());
        tanh(&mut out);
        out
    }
}
