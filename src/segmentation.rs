//! Background removal ("sticker").
//!
//! The matting model is an opaque capability behind [`BackgroundRemover`]:
//! it receives an encoded RGBA image and returns an encoded image whose
//! background is transparent. With the `onnx` feature, [`U2NetRemover`]
//! provides it through a U²-Net ONNX session.

use image::DynamicImage;
use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::{ColorSpace, RasterImage};

/// Encoded image in, encoded RGBA image with a transparent background out.
pub trait BackgroundRemover: Send + Sync {
    fn remove(&self, encoded: &[u8]) -> Result<Vec<u8>>;
}

fn segmentation_error(reason: impl std::fmt::Display) -> Error {
    Error::Segmentation {
        reason: reason.to_string(),
    }
}

/// Cut the subject of `image` out of its background.
///
/// # Returns
/// RGBA image; alpha is 0 on the background
///
/// # Errors
///
/// `InvalidImage` for an invalid input, `Segmentation` if the remover fails
/// or returns bytes that do not decode.
pub fn remove_background(image: &RasterImage, remover: &dyn BackgroundRemover) -> Result<RasterImage> {
    let rgba = RasterImage::from_matrix(image.to_rgba_matrix()?, ColorSpace::Rgba)?;
    let encoded = rgba.encode_png()?;
    debug!(width = image.width(), height = image.height(), bytes = encoded.len(), "removing background");

    let result = remover.remove(&encoded)?;
    let decoded = image::load_from_memory(&result)
        .map_err(|e| segmentation_error(format!("matting output is not an image: {e}")))?;
    RasterImage::from_dynamic(DynamicImage::ImageRgba8(decoded.into_rgba8()))
}

/// Min-max normalize a raw saliency map to 0-255.
pub fn normalize_mask(raw: &[f32]) -> Vec<u8> {
    let (min, max) = raw
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    raw.iter()
        .map(|&v| {
            if range > f32::EPSILON {
                (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect()
}

#[cfg(feature = "onnx")]
pub use self::u2net::U2NetRemover;

#[cfg(feature = "onnx")]
mod u2net {
    use std::path::Path;
    use std::sync::Mutex;

    use image::imageops::{self, FilterType};
    use image::{GrayImage, RgbaImage};
    use ndarray::Array4;
    use ort::execution_providers::CUDAExecutionProvider;
    use ort::session::Session;
    use ort::value::Tensor;
    use tracing::info;

    use super::{normalize_mask, segmentation_error, BackgroundRemover};
    use crate::error::{Error, Result};
    use crate::inference::Device;
    use crate::raster::RasterImage;

    /// Network input side.
    const INPUT_SIZE: u32 = 320;
    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    /// U²-Net salient object matting over an ONNX session.
    pub struct U2NetRemover {
        session: Mutex<Session>,
    }

    impl U2NetRemover {
        /// # Errors
        ///
        /// `ModelNotFound` if `path` does not exist, `Segmentation` if the
        /// session cannot be created.
        pub fn from_file(path: &Path, device: Device, threads: Option<usize>) -> Result<Self> {
            if !path.is_file() {
                return Err(Error::ModelNotFound {
                    style: "sticker".to_string(),
                    path: path.to_path_buf(),
                });
            }
            let mut builder = Session::builder().map_err(segmentation_error)?;
            if let Some(threads) = threads {
                builder = builder.with_intra_threads(threads).map_err(segmentation_error)?;
            }
            if device == Device::Cuda {
                builder = builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .map_err(segmentation_error)?;
            }
            let session = builder.commit_from_file(path).map_err(segmentation_error)?;
            info!(path = %path.display(), %device, "matting session ready");
            Ok(Self {
                session: Mutex::new(session),
            })
        }

        fn input_tensor(image: &RgbaImage) -> Array4<f32> {
            let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Lanczos3);
            let peak = resized
                .pixels()
                .flat_map(|p| [p[0], p[1], p[2]])
                .max()
                .unwrap_or(0)
                .max(1);
            let peak = f32::from(peak);
            let side = INPUT_SIZE as usize;
            Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
                let v = f32::from(resized.get_pixel(x as u32, y as u32)[c]) / peak;
                (v - MEAN[c]) / STD[c]
            })
        }

        fn predict_mask(&self, image: &RgbaImage) -> Result<GrayImage> {
            let input = Tensor::from_array(Self::input_tensor(image)).map_err(segmentation_error)?;
            let mut session = self
                .session
                .lock()
                .map_err(|_| segmentation_error("matting session poisoned"))?;
            let outputs = session.run(ort::inputs![input]).map_err(segmentation_error)?;
            let output = outputs
                .values()
                .next()
                .ok_or_else(|| segmentation_error("matting model returned no output"))?;
            let (shape, data) = output.try_extract_tensor::<f32>().map_err(segmentation_error)?;

            let side = INPUT_SIZE as usize;
            if data.len() < side * side {
                return Err(segmentation_error(format!("unexpected mask shape {shape:?}")));
            }
            let mask = normalize_mask(&data[..side * side]);
            GrayImage::from_raw(INPUT_SIZE, INPUT_SIZE, mask)
                .ok_or_else(|| segmentation_error("mask buffer size mismatch"))
        }
    }

    impl BackgroundRemover for U2NetRemover {
        fn remove(&self, encoded: &[u8]) -> Result<Vec<u8>> {
            let mut rgba = image::load_from_memory(encoded)
                .map_err(segmentation_error)?
                .into_rgba8();
            let mask = self.predict_mask(&rgba)?;
            let mask = imageops::resize(&mask, rgba.width(), rgba.height(), FilterType::Lanczos3);
            for (pixel, alpha) in rgba.pixels_mut().zip(mask.pixels()) {
                pixel[3] = pixel[3].min(alpha[0]);
            }
            let width = rgba.width();
            let height = rgba.height();
            RasterImage::from_u8(width, height, 4, rgba.into_raw())?.encode_png()
        }
    }
}
