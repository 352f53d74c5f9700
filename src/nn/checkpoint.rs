//! Checkpoint loading, legacy migrations and non-strict parameter binding.
//!
//! Checkpoints are `safetensors` files using PyTorch state-dict key names.
//! An optional `format_version` metadata entry records which of the
//! [`MIGRATIONS`] the file already satisfies; a file without it is treated
//! as version 0 and every migration applies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array, ArrayD, Dimension, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Metadata key holding the checkpoint format version.
pub const FORMAT_VERSION_KEY: &str = "format_version";

/// A versioned rewrite of a raw checkpoint. Dropping is the only rewrite
/// needed so far: keys ending in any of `dropped_suffixes` are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub dropped_suffixes: &'static [&'static str],
}

impl Migration {
    pub fn matches(&self, key: &str) -> bool {
        self.dropped_suffixes.iter().any(|suffix| key.ends_with(suffix))
    }
}

/// Migrations in ascending version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "strip-instance-norm-running-stats",
    dropped_suffixes: &["running_mean", "running_var", "num_batches_tracked"],
}];

/// Named f32 tensors read from a checkpoint file.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    format_version: u32,
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl Checkpoint {
    /// Read a safetensors checkpoint.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Checkpoint` if it cannot be parsed
    /// or holds a tensor type other than f32/f64.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes, path)
    }

    /// Parse a checkpoint from memory. `path` is only used in messages.
    pub fn from_bytes(bytes: &[u8], path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let invalid = |reason: String| Error::Checkpoint {
            path: path.clone(),
            reason,
        };

        let (_, metadata) = SafeTensors::read_metadata(bytes).map_err(|e| invalid(e.to_string()))?;
        let format_version = match metadata.metadata().as_ref().and_then(|m| m.get(FORMAT_VERSION_KEY)) {
            Some(v) => v
                .parse()
                .map_err(|_| invalid(format!("format_version '{v}' is not an integer")))?,
            None => 0,
        };

        let safetensors = SafeTensors::deserialize(bytes).map_err(|e| invalid(e.to_string()))?;
        let mut tensors = BTreeMap::new();
        for (name, view) in safetensors.tensors() {
            let array = tensor_to_array(&view).map_err(|reason| invalid(format!("{name}: {reason}")))?;
            tensors.insert(name, array);
        }
        debug!(path = %path.display(), tensors = tensors.len(), format_version, "checkpoint read");

        Ok(Self {
            path,
            format_version,
            tensors,
        })
    }

    /// Build a checkpoint from in-memory tensors.
    pub fn from_tensors(tensors: BTreeMap<String, ArrayD<f32>>, format_version: u32) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            format_version,
            tensors,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(key)
    }

    /// Apply every migration newer than the checkpoint's format version.
    ///
    /// # Returns
    /// The removed keys, in sorted order
    pub fn migrate(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        for migration in MIGRATIONS.iter() {
            if migration.version <= self.format_version {
                continue;
            }
            let before = dropped.len();
            self.tensors.retain(|key, _| {
                let drop = migration.matches(key);
                if drop {
                    dropped.push(key.clone());
                }
                !drop
            });
            if dropped.len() > before {
                info!(
                    migration = migration.name,
                    dropped = dropped.len() - before,
                    "checkpoint migrated"
                );
            }
            self.format_version = migration.version;
        }
        dropped.sort();
        dropped
    }

    /// Start binding this checkpoint's tensors to a network.
    pub fn binder(&self) -> Binder<'_> {
        Binder {
            checkpoint: self,
            used: BTreeSet::new(),
            missing: Vec::new(),
        }
    }
}

fn tensor_to_array(view: &TensorView<'_>) -> std::result::Result<ArrayD<f32>, String> {
    let shape = IxDyn(view.shape());
    let data = view.data();
    let values: Vec<f32> = match view.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        other => return Err(format!("unsupported dtype {other:?}")),
    };
    ArrayD::from_shape_vec(shape, values).map_err(|e| e.to_string())
}

// ============================================================================
// Binding
// ============================================================================

/// Keys that did not line up during non-strict binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Requested by the network but absent from the checkpoint.
    pub missing: Vec<String>,
    /// Present in the checkpoint but never requested.
    pub unexpected: Vec<String>,
}

impl BindReport {
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Hands checkpoint tensors to layers by key.
///
/// Missing keys leave the layer's initialization in place and unused keys
/// are ignored; both are collected into the [`BindReport`]. A key that is
/// present with the wrong shape is an error.
pub struct Binder<'a> {
    checkpoint: &'a Checkpoint,
    used: BTreeSet<String>,
    missing: Vec<String>,
}

impl Binder<'_> {
    pub fn bind<D: Dimension>(&mut self, key: &str, target: &mut Array<f32, D>) -> Result<()> {
        let Some(tensor) = self.checkpoint.get(key) else {
            self.missing.push(key.to_string());
            return Ok(());
        };
        if tensor.shape() != target.shape() {
            return Err(Error::Checkpoint {
                path: self.checkpoint.path.clone(),
                reason: format!(
                    "{key}: expected shape {:?}, checkpoint has {:?}",
                    target.shape(),
                    tensor.shape()
                ),
            });
        }
        let view = tensor
            .view()
            .into_dimensionality::<D>()
            .map_err(|e| Error::Checkpoint {
                path: self.checkpoint.path.clone(),
                reason: format!("{key}: {e}"),
            })?;
        target.assign(&view);
        self.used.insert(key.to_string());
        Ok(())
    }

    pub fn finish(self) -> BindReport {
        let unexpected: Vec<String> = self
            .checkpoint
            .keys()
            .filter(|k| !self.used.contains(*k))
            .map(str::to_string)
            .collect();
        let report = BindReport {
            missing: self.missing,
            unexpected,
        };
        if !report.is_exact() {
            warn!(
                path = %self.checkpoint.path.display(),
                missing = report.missing.len(),
                unexpected = report.unexpected.len(),
                "non-strict checkpoint binding"
            );
            debug!(missing = ?report.missing, unexpected = ?report.unexpected, "binding mismatch");
        }
        report
    }
}

/// Serialize tensors as a safetensors file body. Used to produce fixtures
/// and converted checkpoints.
pub fn serialize_tensors(
    tensors: &BTreeMap<String, ArrayD<f32>>,
    format_version: Option<u32>,
) -> Result<Vec<u8>> {
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, array)| {
            let bytes = array.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.clone(), array.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(|e| Error::Checkpoint {
            path: PathBuf::from(name),
            reason: e.to_string(),
        })?;
        views.push((name.as_str(), view));
    }
    let metadata =
        format_version.map(|v| HashMap::from([(FORMAT_VERSION_KEY.to_string(), v.to_string())]));
    safetensors::serialize(views, &metadata).map_err(|e| Error::Checkpoint {
        path: PathBuf::from("<memory>"),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn legacy_tensors() -> BTreeMap<String, ArrayD<f32>> {
        let mut tensors = BTreeMap::new();
        tensors.insert("conv1.conv2d.weight".to_string(), Array2::<f32>::ones((2, 3)).into_dyn());
        tensors.insert("in1.weight".to_string(), Array1::<f32>::ones(2).into_dyn());
        tensors.insert("in1.running_mean".to_string(), Array1::<f32>::zeros(2).into_dyn());
        tensors.insert("in1.running_var".to_string(), Array1::<f32>::ones(2).into_dyn());
        tensors.insert("in1.num_batches_tracked".to_string(), Array1::<f32>::zeros(1).into_dyn());
        tensors
    }

    #[test]
    fn test_migration_strips_running_stats() {
        let mut checkpoint = Checkpoint::from_tensors(legacy_tensors(), 0);
        let dropped = checkpoint.migrate();
        assert_eq!(
            dropped,
            vec!["in1.num_batches_tracked", "in1.running_mean", "in1.running_var"]
        );
        assert_eq!(checkpoint.len(), 2);
        assert_eq!(checkpoint.format_version(), 1);
        assert!(checkpoint.migrate().is_empty());
    }

    #[test]
    fn test_migration_skipped_for_current_version() {
        let mut checkpoint = Checkpoint::from_tensors(legacy_tensors(), 1);
        assert!(checkpoint.migrate().is_empty());
        assert_eq!(checkpoint.len(), 5);
    }

    #[test]
    fn test_file_round_trip_keeps_version() {
        let bytes = serialize_tensors(&legacy_tensors(), Some(1)).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), &bytes).unwrap();

        let checkpoint = Checkpoint::from_file(file.path()).unwrap();
        assert_eq!(checkpoint.format_version(), 1);
        assert_eq!(checkpoint.get("conv1.conv2d.weight").unwrap().shape(), &[2, 3]);

        let unversioned = serialize_tensors(&legacy_tensors(), None).unwrap();
        assert_eq!(Checkpoint::from_bytes(&unversioned, "x").unwrap().format_version(), 0);
    }

    #[test]
    fn test_garbage_is_checkpoint_error() {
        let err = Checkpoint::from_bytes(b"not a checkpoint", "bad.safetensors").unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
    }

    #[test]
    fn test_non_strict_binding_report() {
        let mut checkpoint = Checkpoint::from_tensors(legacy_tensors(), 0);
        checkpoint.migrate();
        let mut binder = checkpoint.binder();

        let mut weight = Array1::<f32>::zeros(2);
        binder.bind("in1.weight", &mut weight).unwrap();
        assert_eq!(weight[0], 1.0);

        let mut bias = Array1::<f32>::zeros(2);
        binder.bind("in1.bias", &mut bias).unwrap();
        assert_eq!(bias[0], 0.0);

        let report = binder.finish();
        assert_eq!(report.missing, vec!["in1.bias"]);
        assert_eq!(report.unexpected, vec!["conv1.conv2d.weight"]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let checkpoint = Checkpoint::from_tensors(legacy_tensors(), 1);
        let mut binder = checkpoint.binder();
        let mut wrong = Array1::<f32>::zeros(3);
        assert!(binder.bind("in1.weight", &mut wrong).is_err());
    }
}
