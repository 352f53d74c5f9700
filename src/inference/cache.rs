//! Load-once registry of neural models.
//!
//! Every known [`NeuralStyle`] gets a slot when the cache is built, so the
//! slot map itself is immutable and only the `OnceCell` inside a slot is
//! ever written. `get_or_try_init` serializes concurrent first access to a
//! slot: one caller loads while the others wait for its result, and after
//! that reads are lock-free. A failed load leaves the slot empty so a later
//! call can retry once the checkpoint is in place.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::{Device, LoadedModel, Model};
use crate::error::{Error, Result};
use crate::nn::{AnimeGanGenerator, Checkpoint, TransformerNet};
use crate::style::NeuralStyle;

/// Builds a model for a style. Called at most once per style per cache.
pub trait ModelLoader: Send + Sync {
    /// # Errors
    ///
    /// `ModelNotFound` if the checkpoint is absent, `Checkpoint` if it cannot
    /// be read or bound.
    fn load(&self, style: NeuralStyle, device: Device) -> Result<LoadedModel>;
}

/// Loads native networks from safetensors checkpoints under `model_dir`.
#[derive(Debug, Clone)]
pub struct CheckpointLoader {
    model_dir: PathBuf,
}

impl CheckpointLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }
}

impl ModelLoader for CheckpointLoader {
    fn load(&self, style: NeuralStyle, device: Device) -> Result<LoadedModel> {
        let path = style.checkpoint_path(&self.model_dir);
        if !path.is_file() {
            return Err(Error::ModelNotFound {
                style: style.id(),
                path,
            });
        }

        let mut checkpoint = Checkpoint::from_file(&path)?;
        let dropped = checkpoint.migrate();
        if !dropped.is_empty() {
            debug!(style = %style, keys = ?dropped, "legacy keys stripped");
        }

        let (model, report): (Box<dyn Model>, _) = match style {
            NeuralStyle::Cartoon => {
                let (net, report) = AnimeGanGenerator::from_checkpoint(&checkpoint)?;
                (Box::new(net), report)
            }
            NeuralStyle::StyleTransfer(_) => {
                let (net, report) = TransformerNet::from_checkpoint(&checkpoint)?;
                (Box::new(net), report)
            }
        };
        info!(
            style = %style,
            stripped = dropped.len(),
            missing = report.missing.len(),
            unexpected = report.unexpected.len(),
            "checkpoint bound"
        );

        Ok(LoadedModel::new(style, model, device.native(), path))
    }
}

/// Process-lifetime model registry, injected into the engine.
pub struct ModelCache {
    loader: Box<dyn ModelLoader>,
    device: Device,
    slots: HashMap<NeuralStyle, OnceCell<Arc<LoadedModel>>>,
    loads: AtomicUsize,
}

impl ModelCache {
    pub fn new(loader: Box<dyn ModelLoader>, device: Device) -> Self {
        let slots = NeuralStyle::ALL.iter().map(|&s| (s, OnceCell::new())).collect();
        Self {
            loader,
            device,
            slots,
            loads: AtomicUsize::new(0),
        }
    }

    /// Look up a model by identifier. The identifier is validated before
    /// any file is touched.
    ///
    /// # Errors
    ///
    /// `InvalidStyle` for identifiers outside the neural style set, plus any
    /// load error on first access.
    pub fn get_model(&self, style_id: &str) -> Result<Arc<LoadedModel>> {
        let style = NeuralStyle::parse(style_id)?;
        self.get(style)
    }

    /// Return the cached model for `style`, loading it on first use.
    pub fn get(&self, style: NeuralStyle) -> Result<Arc<LoadedModel>> {
        let slot = self
            .slots
            .get(&style)
            .ok_or_else(|| Error::invalid_style(style.id(), "no model slot"))?;

        let model = slot.get_or_try_init(|| {
            info!(style = %style, device = %self.device, "loading model");
            let started = Instant::now();
            let model = self.loader.load(style, self.device)?;
            model.mark_ready();
            self.loads.fetch_add(1, Ordering::Relaxed);
            info!(style = %style, elapsed_ms = started.elapsed().as_millis() as u64, "model ready");
            Ok::<_, Error>(Arc::new(model))
        })?;
        Ok(Arc::clone(model))
    }

    pub fn is_loaded(&self, style: NeuralStyle) -> bool {
        self.slots.get(&style).is_some_and(|slot| slot.get().is_some())
    }

    /// Number of successful loads so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(style, _)| style.id())
            .collect();
        f.debug_struct("ModelCache")
            .field("device", &self.device)
            .field("loaded", &loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::nn::checkpoint::serialize_tensors;
    use crate::raster::FloatTensor;
    use crate::style::TransferStyle;
    use ndarray::{Array1, ArrayD};
    use std::collections::BTreeMap;
    use std::thread;
    use std::time::Duration;

    struct Identity;

    impl Model for Identity {
        fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
            Ok(input.clone())
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, style: NeuralStyle, device: Device) -> Result<LoadedModel> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(LoadedModel::new(style, Box::new(Identity), device, "stub"))
        }
    }

    #[test]
    fn test_sequential_calls_share_instance() {
        let cache = ModelCache::new(Box::new(CountingLoader::default()), Device::Cpu);
        let a = cache.get_model("cartoon").unwrap();
        let b = cache.get_model("cartoon").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_ready());
        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        let cache = Arc::new(ModelCache::new(Box::new(CountingLoader::default()), Device::Cpu));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_model("style-transfer:candy").unwrap())
            })
            .collect();
        let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn test_unknown_style_rejected_before_loading() {
        let cache = ModelCache::new(Box::new(CountingLoader::default()), Device::Cpu);
        let err = cache.get_model("style-transfer:starry_night").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
        assert_eq!(cache.load_count(), 0);
    }

    #[test]
    fn test_missing_checkpoint_reported_and_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(Box::new(CheckpointLoader::new(dir.path())), Device::Cpu);
        let style = NeuralStyle::StyleTransfer(TransferStyle::Mosaic);
        let err = cache.get(style).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert!(!cache.is_loaded(style));

        // Drop a legacy checkpoint in place; the next call loads it.
        let mut tensors: BTreeMap<String, ArrayD<f32>> = BTreeMap::new();
        tensors.insert("in1.weight".into(), Array1::<f32>::ones(32).into_dyn());
        tensors.insert("in1.running_var".into(), Array1::<f32>::ones(32).into_dyn());
        let path = style.checkpoint_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serialize_tensors(&tensors, None).unwrap()).unwrap();

        let model = cache.get(style).unwrap();
        assert_eq!(model.source(), path.as_path());
        assert_eq!(model.device(), Device::Cpu);
        assert!(cache.is_loaded(style));
    }
}
