//! Engine configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inference::DeviceSpec;
use crate::style::NeuralStyle;

/// Settings resolved once when an [`Engine`](crate::engine::Engine) is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory of the checkpoints.
    pub model_dir: PathBuf,
    /// Compute device preference.
    pub device: DeviceSpec,
    /// Neural style identifiers loaded eagerly at startup.
    pub preload: Vec<String>,
    /// Side of the square canvas used by the cartoon generator.
    pub cartoon_square: u32,
    /// Canvas color around padded content.
    pub background_fill: [u8; 3],
    /// Seed of the comic-art k-means initialization.
    pub kmeans_seed: u64,
    /// Intra-op threads of the matting session.
    pub matting_threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            device: DeviceSpec::Auto,
            preload: Vec::new(),
            cartoon_square: 512,
            background_fill: [255, 255, 255],
            kmeans_seed: 0,
            matting_threads: None,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON configuration file. Missing fields take
    /// their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `InvalidParameter` for a zero canvas size or thread count,
    /// `InvalidStyle` for a preload entry that is not a neural style.
    pub fn validate(&self) -> Result<()> {
        if self.cartoon_square == 0 {
            return Err(Error::invalid_parameter("cartoon_square", "must be positive"));
        }
        if self.matting_threads == Some(0) {
            return Err(Error::invalid_parameter("matting_threads", "must be positive"));
        }
        for id in &self.preload {
            NeuralStyle::parse(id)?;
        }
        Ok(())
    }

    /// Neural styles named in `preload`.
    pub fn preload_styles(&self) -> Result<Vec<NeuralStyle>> {
        self.preload.iter().map(|id| NeuralStyle::parse(id)).collect()
    }

    /// Location of the U²-Net matting model.
    pub fn matting_model_path(&self) -> PathBuf {
        self.model_dir.join("u2net.onnx")
    }
}
