//! The stylization engine: one entry point per style family.
//!
//! ```no_run
//! use pictoon::{Engine, EngineConfig, RasterImage};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let image = RasterImage::decode(&std::fs::read("photo.jpg")?)?;
//! let sketch = engine.apply(&image, "gray-sketch", None)?;
//! std::fs::write("sketch.png", sketch.encode_png()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::filters;
use crate::inference::{CheckpointLoader, Device, ModelCache};
use crate::neural::{self, CartoonCanvas};
use crate::raster::RasterImage;
use crate::segmentation::{self, BackgroundRemover};
use crate::style::{ClassicalStyle, NeuralStyle, StyleParams, StyleSpec};

/// Apply a classical filter without an engine, using default seeds.
///
/// # Errors
///
/// `InvalidStyle` / `InvalidParameter` for a bad identifier or parameters
/// (checked first), `InvalidImage` for an invalid image.
pub fn apply_classical_filter(image: &RasterImage, style_id: &str, params: Option<&StyleParams>) -> Result<RasterImage> {
    let style = ClassicalStyle::resolve(style_id, params)?;
    run_classical(image, &style)
}

fn run_classical(image: &RasterImage, style: &ClassicalStyle) -> Result<RasterImage> {
    let matrix = image.to_rgb_matrix()?;
    let (output, color_space) = filters::apply(&matrix, style)?;
    RasterImage::from_matrix(output, color_space)
}

/// Stylization engine holding the model cache and the matting capability.
pub struct Engine {
    config: EngineConfig,
    device: Device,
    cache: Arc<ModelCache>,
    remover: OnceCell<Arc<dyn BackgroundRemover>>,
}

impl Engine {
    /// Build an engine from configuration: resolve the device, create the
    /// checkpoint-backed cache and load every `preload` style.
    ///
    /// # Errors
    ///
    /// Configuration errors, and `ModelNotFound` for a preloaded style
    /// whose checkpoint is missing.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let device = config.device.resolve();
        let loader = CheckpointLoader::new(config.model_dir.clone());
        let cache = Arc::new(ModelCache::new(Box::new(loader), device));
        Self::with_parts(config, cache, None)
    }

    /// Build an engine around an existing cache and, optionally, a matting
    /// implementation. Without one, the U²-Net session is created on first
    /// use.
    pub fn with_parts(
        config: EngineConfig,
        cache: Arc<ModelCache>,
        remover: Option<Arc<dyn BackgroundRemover>>,
    ) -> Result<Self> {
        config.validate()?;
        let device = cache.device();
        let engine = Self {
            config,
            device,
            cache,
            remover: remover.map_or_else(OnceCell::new, OnceCell::with_value),
        };
        engine.preload()?;
        Ok(engine)
    }

    fn preload(&self) -> Result<()> {
        for style in self.config.preload_styles()? {
            info!(style = %style, "preloading model");
            self.cache.get(style)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Apply a classical filter.
    ///
    /// Comic art uses the configured k-means seed unless `params` sets one.
    pub fn apply_classical_filter(
        &self,
        image: &RasterImage,
        style_id: &str,
        params: Option<&StyleParams>,
    ) -> Result<RasterImage> {
        let mut style = ClassicalStyle::resolve(style_id, params)?;
        if let ClassicalStyle::ComicArt(comic) = &mut style {
            if params.and_then(|p| p.seed).is_none() {
                comic.seed = self.config.kmeans_seed;
            }
        }
        run_classical(image, &style)
    }

    /// Apply a neural filter (`cartoon` or `style-transfer:<name>`).
    pub fn apply_neural_filter(&self, image: &RasterImage, style_id: &str) -> Result<RasterImage> {
        let style = NeuralStyle::parse(style_id)?;
        neural::apply(image, style, &self.cache, self.cartoon_canvas())
    }

    /// Remove the background, returning RGBA.
    pub fn remove_background(&self, image: &RasterImage) -> Result<RasterImage> {
        image.validate()?;
        let remover = self.remover.get_or_try_init(|| self.open_remover())?;
        segmentation::remove_background(image, remover.as_ref())
    }

    /// Dispatch any style identifier to its family.
    pub fn apply(&self, image: &RasterImage, style_id: &str, params: Option<&StyleParams>) -> Result<RasterImage> {
        let spec = StyleSpec::parse(style_id, params)?;
        debug!(style = style_id, neural = spec.is_neural(), "dispatching");
        match spec {
            StyleSpec::Classical(_) => self.apply_classical_filter(image, style_id, params),
            StyleSpec::Neural(style) => neural::apply(image, style, &self.cache, self.cartoon_canvas()),
            StyleSpec::Sticker => self.remove_background(image),
        }
    }

    fn cartoon_canvas(&self) -> CartoonCanvas {
        CartoonCanvas {
            square: self.config.cartoon_square,
            fill: self.config.background_fill,
        }
    }

    #[cfg(feature = "onnx")]
    fn open_remover(&self) -> Result<Arc<dyn BackgroundRemover>> {
        let remover = segmentation::U2NetRemover::from_file(
            &self.config.matting_model_path(),
            self.device,
            self.config.matting_threads,
        )?;
        Ok(Arc::new(remover))
    }

    #[cfg(not(feature = "onnx"))]
    fn open_remover(&self) -> Result<Arc<dyn BackgroundRemover>> {
        Err(crate::error::Error::Segmentation {
            reason: "built without the onnx feature".to_string(),
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("device", &self.device)
            .field("cache", &self.cache)
            .field("remover", &self.remover.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::inference::{LoadedModel, Model, ModelLoader};
    use crate::raster::{ColorSpace, FloatTensor, PixelBuffer};
    use std::collections::HashSet;

    struct Identity;

    impl Model for Identity {
        fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
            Ok(input.clone())
        }
    }

    struct StubLoader;

    impl ModelLoader for StubLoader {
        fn load(&self, style: NeuralStyle, device: Device) -> Result<LoadedModel> {
            Ok(LoadedModel::new(style, Box::new(Identity), device, "stub"))
        }
    }

    /// Returns its input unchanged.
    struct Passthrough;

    impl BackgroundRemover for Passthrough {
        fn remove(&self, encoded: &[u8]) -> Result<Vec<u8>> {
            Ok(encoded.to_vec())
        }
    }

    fn engine() -> Engine {
        let cache = Arc::new(ModelCache::new(Box::new(StubLoader), Device::Cpu));
        let config = EngineConfig {
            cartoon_square: 64,
            ..Default::default()
        };
        Engine::with_parts(config, cache, Some(Arc::new(Passthrough))).unwrap()
    }

    fn white(width: u32, height: u32) -> RasterImage {
        RasterImage::filled(width, height, ColorSpace::Rgb, &[255, 255, 255]).unwrap()
    }

    fn gradient(width: u32, height: u32) -> RasterImage {
        let data = (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [(x * 4 % 256) as u8, (y * 4 % 256) as u8, 128]))
            .collect();
        RasterImage::from_u8(width, height, 3, data).unwrap()
    }

    #[test]
    fn test_gray_sketch_of_white_image() {
        let out = engine().apply(&white(100, 50), "gray-sketch", None).unwrap();
        assert_eq!((out.width(), out.height()), (100, 50));
        assert_eq!(out.color_space(), ColorSpace::Gray);
        let PixelBuffer::U8(data) = out.data() else {
            panic!("expected bytes");
        };
        assert_eq!(out.channels(), 1);
        assert_eq!(data.len(), 100 * 50);
        // Color dodge of white against its blurred inverse stays white
        assert!(data.iter().all(|&v| v >= 250));
    }

    #[test]
    fn test_classical_styles_keep_dimensions() {
        let engine = engine();
        let image = gradient(40, 30);
        for id in [
            "gray-sketch",
            "color-sketch",
            "comic-art",
            "manga",
            "neon-glow",
            "pixel-art:8bit",
            "pixel-art:16bit",
            "pixel-art:modern",
            "pixel-art:mosaic",
        ] {
            let out = engine.apply(&image, id, None).unwrap();
            assert_eq!((out.width(), out.height()), (40, 30), "{id}");
        }
    }

    #[test]
    fn test_pop_art_scenario() {
        let out = engine().apply(&gradient(300, 200), "pop-art", None).unwrap();
        assert_eq!((out.width(), out.height()), (600, 400));
    }

    #[test]
    fn test_pixel_art_eight_bit_palette() {
        let out = engine().apply(&gradient(512, 512), "pixel-art:8bit", None).unwrap();
        let PixelBuffer::U8(data) = out.data() else {
            panic!("expected bytes");
        };
        let colors: HashSet<&[u8]> = data.chunks(3).collect();
        assert!(colors.len() <= 12);
    }

    #[test]
    fn test_unknown_pixel_art_preset_rejected() {
        let params = StyleParams::with_preset("unknown");
        let err = engine()
            .apply_classical_filter(&white(10, 10), "pixel-art", Some(&params))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
    }

    #[test]
    fn test_style_checked_before_image() {
        let engine = engine();
        let empty = RasterImage::unchecked(0, 0, ColorSpace::Rgb, PixelBuffer::U8(Vec::new()));

        let err = engine.apply_classical_filter(&empty, "watercolor", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
        let err = apply_classical_filter(&empty, "pixel-art:gameboy", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
        let err = engine.apply_classical_filter(&empty, "comic-art", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);

        let err = engine.apply_neural_filter(&empty, "style-transfer:starry").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
        let err = engine.apply_neural_filter(&empty, "cartoon").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
        assert_eq!(engine.cache().load_count(), 0);

        let err = engine.apply(&empty, "sketchy", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
    }

    #[test]
    fn test_bgr_input_is_swizzled() {
        let bgr = RasterImage::new(8, 8, 3, ColorSpace::Bgr, PixelBuffer::U8([10, 20, 200].repeat(64))).unwrap();
        let out = apply_classical_filter(&bgr, "pixel-art:modern", None).unwrap();
        assert_eq!(out.color_space(), ColorSpace::Rgb);
        let matrix = out.to_matrix().unwrap();
        assert_eq!([matrix[[3, 5, 0]], matrix[[3, 5, 1]], matrix[[3, 5, 2]]], [200, 20, 10]);
    }

    #[test]
    fn test_gray_input_is_expanded() {
        let gray = RasterImage::filled(6, 4, ColorSpace::Gray, &[90]).unwrap();
        let out = apply_classical_filter(&gray, "pixel-art:mosaic", None).unwrap();
        assert_eq!(out.channels(), 3);
        assert!(out.to_matrix().unwrap().iter().all(|&v| v == 90));
    }

    #[test]
    fn test_remover_given_to_engine_is_used() {
        let engine = engine();
        assert!(format!("{engine:?}").contains("remover: true"));
    }

    #[test]
    fn test_zero_byte_upload_rejected() {
        let err = RasterImage::decode(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
    }

    #[test]
    fn test_comic_uses_configured_seed() {
        let image = gradient(24, 24);
        let engine = engine();
        let a = engine.apply(&image, "comic-art", None).unwrap();
        let b = engine.apply(&image, "comic-art", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_neural_dispatch() {
        let engine = engine();
        let out = engine.apply(&gradient(90, 60), "cartoon", None).unwrap();
        assert_eq!((out.width(), out.height()), (90, 60));
        let out = engine.apply_neural_filter(&gradient(90, 60), "style-transfer:candy").unwrap();
        assert_eq!((out.width(), out.height()), (90, 60));
        assert_eq!(engine.cache().load_count(), 2);

        let err = engine.apply_neural_filter(&gradient(4, 4), "style-transfer:starry").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
        let err = engine.apply_neural_filter(&gradient(4, 4), "pop-art").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
    }

    #[test]
    fn test_sticker_is_rgba() {
        let out = engine().apply(&gradient(10, 10), "sticker", None).unwrap();
        assert_eq!(out.color_space(), ColorSpace::Rgba);
    }

    #[test]
    fn test_missing_preload_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            model_dir: dir.path().to_path_buf(),
            device: crate::inference::DeviceSpec::Cpu,
            preload: vec!["cartoon".into()],
            ..Default::default()
        };
        let err = Engine::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
    }

    #[test]
    fn test_free_function_matches_engine_defaults() {
        let image = gradient(16, 16);
        let out = apply_classical_filter(&image, "manga", None).unwrap();
        assert_eq!(out.channels(), 1);
        assert!(apply_classical_filter(&image, "cartoon", None).is_err());
    }
}
