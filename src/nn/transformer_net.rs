//! Fast neural style transfer network.
//!
//! Layout and parameter names follow the PyTorch `TransformerNet` state
//! dict: three downsampling convs, five residual blocks, two upsampling
//! convs and a final 9x9 projection. Every conv is preceded by reflection
//! padding of `kernel / 2`.

use ndarray::{Array3, ArrayView3};

use super::checkpoint::{BindReport, Checkpoint};
use super::{reflection_pad_same, relu, upsample_nearest, Conv2d, InstanceNorm};
use crate::error::Result;

#[derive(Debug, Clone)]
struct ConvLayer {
    conv: Conv2d,
    upsample: Option<usize>,
}

impl ConvLayer {
    fn new(in_ch: usize, out_ch: usize, kernel: usize, stride: usize) -> Self {
        Self {
            conv: Conv2d::new(in_ch, out_ch, kernel, stride, true),
            upsample: None,
        }
    }

    fn upsampling(in_ch: usize, out_ch: usize, kernel: usize, factor: usize) -> Self {
        Self {
            upsample: Some(factor),
            ..Self::new(in_ch, out_ch, kernel, 1)
        }
    }

    fn forward(&self, input: ArrayView3<f32>) -> Array3<f32> {
        let pad = self.conv.weight.dim().2 / 2;
        match self.upsample {
            Some(factor) => {
                let up = upsample_nearest(input, factor);
                self.conv.forward(reflection_pad_same(up.view(), pad).view())
            }
            None => self.conv.forward(reflection_pad_same(input, pad).view()),
        }
    }
}

#[derive(Debug, Clone)]
struct ResidualBlock {
    conv1: ConvLayer,
    in1: InstanceNorm,
    conv2: ConvLayer,
    in2: InstanceNorm,
}

impl ResidualBlock {
    fn new(channels: usize) -> Self {
        Self {
            conv1: ConvLayer::new(channels, channels, 3, 1),
            in1: InstanceNorm::new(channels),
            conv2: ConvLayer::new(channels, channels, 3, 1),
            in2: InstanceNorm::new(channels),
        }
    }

    fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let mut out = self.conv1.forward(input.view());
        self.in1.forward(&mut out);
        relu(&mut out);
        let mut out = self.conv2.forward(out.view());
        self.in2.forward(&mut out);
        out + input
    }
}

/// Johnson et al. image transformation network with instance norm.
#[derive(Debug, Clone)]
pub struct TransformerNet {
    conv1: ConvLayer,
    in1: InstanceNorm,
    conv2: ConvLayer,
    in2: InstanceNorm,
    conv3: ConvLayer,
    in3: InstanceNorm,
    res: [ResidualBlock; 5],
    deconv1: ConvLayer,
    in4: InstanceNorm,
    deconv2: ConvLayer,
    in5: InstanceNorm,
    deconv3: ConvLayer,
}

impl Default for TransformerNet {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerNet {
    pub fn new() -> Self {
        Self {
            conv1: ConvLayer::new(3, 32, 9, 1),
            in1: InstanceNorm::new(32),
            conv2: ConvLayer::new(32, 64, 3, 2),
            in2: InstanceNorm::new(64),
            conv3: ConvLayer::new(64, 128, 3, 2),
            in3: InstanceNorm::new(128),
            res: std::array::from_fn(|_| ResidualBlock::new(128)),
            deconv1: ConvLayer::upsampling(128, 64, 3, 2),
            in4: InstanceNorm::new(64),
            deconv2: ConvLayer::upsampling(64, 32, 3, 2),
            in5: InstanceNorm::new(32),
            deconv3: ConvLayer::new(32, 3, 9, 1),
        }
    }

    /// Build the network and bind a (migrated) checkpoint non-strictly.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<(Self, BindReport)> {
        let mut net = Self::new();
        let mut binder = checkpoint.binder();
        net.conv1.conv.bind(&mut binder, "conv1.conv2d")?;
        net.in1.bind(&mut binder, "in1")?;
        net.conv2.conv.bind(&mut binder, "conv2.conv2d")?;
        net.in2.bind(&mut binder, "in2")?;
        net.conv3.conv.bind(&mut binder, "conv3.conv2d")?;
        net.in3.bind(&mut binder, "in3")?;
        for (i, block) in net.res.iter_mut().enumerate() {
            let prefix = format!("res{}", i + 1);
            block.conv1.conv.bind(&mut binder, &format!("{prefix}.conv1.conv2d"))?;
            block.in1.bind(&mut binder, &format!("{prefix}.in1"))?;
            block.conv2.conv.bind(&mut binder, &format!("{prefix}.conv2.conv2d"))?;
            block.in2.bind(&mut binder, &format!("{prefix}.in2"))?;
        }
        net.deconv1.conv.bind(&mut binder, "deconv1.conv2d")?;
        net.in4.bind(&mut binder, "in4")?;
        net.deconv2.conv.bind(&mut binder, "deconv2.conv2d")?;
        net.in5.bind(&mut binder, "in5")?;
        net.deconv3.conv.bind(&mut binder, "deconv3.conv2d")?;
        Ok((net, binder.finish()))
    }

    /// Forward pass over a (3, H, W) activation. The output can be a few
    /// pixels larger than the input when H or W is not a multiple of 4.
    pub fn forward(&self, input: ArrayView3<f32>) -> Array3<f32> {
        let mut y = self.conv1.forward(input);
        self.in1.forward(&mut y);
        relu(&mut y);
        let mut y = self.conv2.forward(y.view());
        self.in2.forward(&mut y);
        relu(&mut y);
        let mut y = self.conv3.forward(y.view());
        self.in3.forward(&mut y);
        relu(&mut y);

        for block in &self.res {
            y = block.forward(&y);
        }

        let mut y = self.deconv1.forward(y.view());
        self.in4.forward(&mut y);
        relu(&mut y);
        let mut y = self.deconv2.forward(y.view());
        self.in5.forward(&mut y);
        relu(&mut y);
        self.deconv3.forward(y.view())
    }
}
