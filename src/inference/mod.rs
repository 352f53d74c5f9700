//! Neural model abstraction, device selection and the loaded-model handle.

pub mod cache;
pub mod geometry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::nn::{AnimeGanGenerator, TransformerNet};
use crate::raster::FloatTensor;
use crate::style::NeuralStyle;

pub use cache::{CheckpointLoader, ModelCache, ModelLoader};
pub use geometry::{run_inference, GeometryMeta, Normalization, ResizeStrategy};

// ============================================================================
// Devices
// ============================================================================

/// Compute device preference from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    Cpu,
    Cuda,
    #[default]
    Auto,
}

impl DeviceSpec {
    /// Resolve the preference against the runtime. CUDA is only reported
    /// when the ONNX runtime can register its CUDA provider.
    pub fn resolve(self) -> Device {
        let device = match self {
            DeviceSpec::Cpu => Device::Cpu,
            DeviceSpec::Cuda | DeviceSpec::Auto if cuda_available() => Device::Cuda,
            DeviceSpec::Cuda => {
                warn!("CUDA requested but unavailable, using CPU");
                Device::Cpu
            }
            DeviceSpec::Auto => Device::Cpu,
        };
        info!(preference = ?self, %device, "compute device selected");
        device
    }
}

impl std::str::FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceSpec::Cpu),
            "cuda" | "gpu" => Ok(DeviceSpec::Cuda),
            "auto" => Ok(DeviceSpec::Auto),
            other => Err(Error::invalid_parameter("device", format!("unknown device '{other}'"))),
        }
    }
}

#[cfg(feature = "onnx")]
fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
    CUDAExecutionProvider::default().is_available().unwrap_or(false)
}

#[cfg(not(feature = "onnx"))]
fn cuda_available() -> bool {
    false
}

/// A resolved compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Device used by the native ndarray networks, which only run on CPU.
    pub fn native(self) -> Device {
        if self == Device::Cuda {
            tracing::debug!("native networks run on CPU");
        }
        Device::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        })
    }
}

// ============================================================================
// Models
// ============================================================================

/// A forward pass over a (1, C, H, W) tensor. Weights are immutable after
/// load, so a model can serve concurrent calls.
pub trait Model: Send + Sync {
    fn infer(&self, input: &FloatTensor) -> Result<FloatTensor>;
}

fn single_image(input: &FloatTensor) -> Result<ndarray::ArrayView3<'_, f32>> {
    let (n, c, _, _) = input.dim();
    if n != 1 || c != 3 {
        return Err(Error::inference(format!(
            "expected a (1, 3, H, W) tensor, got {:?}",
            input.shape()
        )));
    }
    Ok(input.index_axis(Axis(0), 0))
}

impl Model for TransformerNet {
    fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
        let image = single_image(input)?;
        Ok(self.forward(image).insert_axis(Axis(0)))
    }
}

impl Model for AnimeGanGenerator {
    fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
        let image = single_image(input)?;
        Ok(self.forward(image).insert_axis(Axis(0)))
    }
}

/// A model that finished loading, with its placement.
pub struct LoadedModel {
    style: NeuralStyle,
    model: Box<dyn Model>,
    device: Device,
    source: PathBuf,
    ready: AtomicBool,
}

impl LoadedModel {
    pub fn new(style: NeuralStyle, model: Box<dyn Model>, device: Device, source: impl Into<PathBuf>) -> Self {
        Self {
            style,
            model,
            device,
            source: source.into(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn style(&self) -> NeuralStyle {
        self.style
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Checkpoint the weights were read from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Set once the handle is published in the cache; never cleared.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("style", &self.style)
            .field("device", &self.device)
            .field("source", &self.source)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec_parsing() {
        assert_eq!("CPU".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cpu);
        assert_eq!("cuda".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cuda);
        assert!("tpu".parse::<DeviceSpec>().is_err());
        assert_eq!(DeviceSpec::Cpu.resolve(), Device::Cpu);
        assert_eq!(Device::Cuda.native(), Device::Cpu);
    }

    #[test]
    fn test_device_spec_serde() {
        let spec: DeviceSpec = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(spec, DeviceSpec::Auto);
    }

    #[test]
    fn test_native_model_rejects_batches() {
        let net = TransformerNet::new();
        let batch = FloatTensor::zeros((2, 3, 8, 8));
        assert!(net.infer(&batch).is_err());
    }

    #[test]
    fn test_ready_flag() {
        let model = LoadedModel::new(NeuralStyle::Cartoon, Box::new(TransformerNet::new()), Device::Cpu, "x");
        assert!(!model.is_ready());
        model.mark_ready();
        assert!(model.is_ready());
    }
}
