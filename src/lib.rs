//! Pictoon: image stylization engine.
//!
//! Turns one raster image into another under a named style:
//!
//! - **Classical** filters: `gray-sketch`, `color-sketch`, `comic-art`,
//!   `manga`, `neon-glow`, `pop-art`, `pixel-art:{8bit,16bit,modern,mosaic}`
//! - **Neural** filters: `cartoon`, `style-transfer:{candy,mosaic,rain_princess,udnie}`
//! - **Segmentation**: `sticker` (background removal)
//!
//! ## Image Format
//! [`RasterImage`] carries a packed buffer with a color space tag:
//! - **Grayscale**: 1 channel
//! - **RGB / BGR**: 3 channels
//! - **RGBA / BGRA**: 4 channels
//!
//! Classical filters work on RGB; alpha survives only through the sticker
//! path, whose output is always RGBA.
//!
//! ## Architecture
//! - [`filters`] - pure ndarray pipelines, parallelized with rayon
//! - [`nn`] - native CPU implementations of the style networks
//! - [`inference`] - model cache and geometry-preserving inference
//! - [`engine`] - the dispatching entry point
//!
//! Python bindings (`python` feature) and WASM exports (`wasm` feature) are
//! thin wrappers over the same functions.

pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod inference;
pub mod neural;
pub mod nn;
pub mod raster;
pub mod segmentation;
pub mod style;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::EngineConfig;
pub use engine::{apply_classical_filter, Engine};
pub use error::{Error, ErrorKind, Result};
pub use inference::{Device, DeviceSpec, LoadedModel, Model, ModelCache};
pub use raster::{ColorSpace, PixelBuffer, PixelMatrix, RasterImage};
pub use segmentation::BackgroundRemover;
pub use style::{ClassicalStyle, NeuralStyle, PixelArtPreset, StyleParams, StyleSpec, TransferStyle};

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use ndarray::Array3;
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::{PyFileNotFoundError, PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use crate::config::EngineConfig;
    use crate::engine::{self, Engine};
    use crate::error::{Error, ErrorKind};
    use crate::raster::{PixelBuffer, RasterImage};
    use crate::style::StyleParams;

    fn to_py_err(err: Error) -> PyErr {
        match err.kind() {
            ErrorKind::ModelNotFound => PyFileNotFoundError::new_err(err.to_string()),
            _ if err.is_client_error() => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }

    fn to_raster(image: &PyReadonlyArray3<'_, u8>) -> PyResult<RasterImage> {
        let array = image.as_array();
        let (height, width, channels) = array.dim();
        let data = array.as_standard_layout().iter().copied().collect();
        RasterImage::from_u8(width as u32, height as u32, channels, data).map_err(to_py_err)
    }

    fn to_array(image: RasterImage) -> PyResult<Array3<u8>> {
        let shape = (image.height() as usize, image.width() as usize, image.channels());
        let data = match image.into_data() {
            PixelBuffer::U8(data) => data,
            PixelBuffer::F32(data) => data.iter().map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8).collect(),
        };
        Array3::from_shape_vec(shape, data).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    // ========================================================================
    // Classical filters
    // ========================================================================

    /// Apply a classical filter to an (H, W, C) u8 image.
    ///
    /// Gray sketch and manga return (H, W, 1); every other style returns
    /// (H, W, 3). Pop art returns twice the working size.
    #[pyfunction]
    #[pyo3(signature = (image, style, preset=None))]
    pub fn apply_classical_filter<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, u8>,
        style: &str,
        preset: Option<String>,
    ) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let raster = to_raster(&image)?;
        let params = preset.map(StyleParams::with_preset);
        let result = py
            .allow_threads(|| engine::apply_classical_filter(&raster, style, params.as_ref()))
            .map_err(to_py_err)?;
        Ok(to_array(result)?.into_pyarray(py))
    }

    // ========================================================================
    // Engine
    // ========================================================================

    /// Stylization engine with a model cache.
    #[pyclass(name = "Engine")]
    pub struct PyEngine {
        inner: Engine,
    }

    #[pymethods]
    impl PyEngine {
        #[new]
        #[pyo3(signature = (config_path=None, model_dir=None, device=None))]
        fn new(config_path: Option<String>, model_dir: Option<String>, device: Option<String>) -> PyResult<Self> {
            let mut config = match config_path {
                Some(path) => EngineConfig::from_json_file(path).map_err(to_py_err)?,
                None => EngineConfig::default(),
            };
            if let Some(dir) = model_dir {
                config.model_dir = dir.into();
            }
            if let Some(device) = device {
                config.device = device.parse().map_err(to_py_err)?;
            }
            let inner = Engine::new(config).map_err(to_py_err)?;
            Ok(Self { inner })
        }

        #[pyo3(signature = (image, style, preset=None))]
        fn apply<'py>(
            &self,
            py: Python<'py>,
            image: PyReadonlyArray3<'py, u8>,
            style: &str,
            preset: Option<String>,
        ) -> PyResult<Bound<'py, PyArray3<u8>>> {
            let raster = to_raster(&image)?;
            let params = preset.map(StyleParams::with_preset);
            let result = py
                .allow_threads(|| self.inner.apply(&raster, style, params.as_ref()))
                .map_err(to_py_err)?;
            Ok(to_array(result)?.into_pyarray(py))
        }

        fn apply_neural_filter<'py>(
            &self,
            py: Python<'py>,
            image: PyReadonlyArray3<'py, u8>,
            style: &str,
        ) -> PyResult<Bound<'py, PyArray3<u8>>> {
            let raster = to_raster(&image)?;
            let result = py
                .allow_threads(|| self.inner.apply_neural_filter(&raster, style))
                .map_err(to_py_err)?;
            Ok(to_array(result)?.into_pyarray(py))
        }

        fn remove_background<'py>(
            &self,
            py: Python<'py>,
            image: PyReadonlyArray3<'py, u8>,
        ) -> PyResult<Bound<'py, PyArray3<u8>>> {
            let raster = to_raster(&image)?;
            let result = py
                .allow_threads(|| self.inner.remove_background(&raster))
                .map_err(to_py_err)?;
            Ok(to_array(result)?.into_pyarray(py))
        }
    }

    /// Python module definition
    #[pymodule]
    pub fn pictoon(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(apply_classical_filter, m)?)?;
        m.add_class::<PyEngine>()?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::pictoon;
