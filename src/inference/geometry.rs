//! Geometry-preserving inference.
//!
//! Networks are run on a resized copy of the input. Two strategies exist:
//!
//! | Strategy | Before inference | After inference |
//! |----------|------------------|-----------------|
//! | [`ResizeStrategy::PadAndCrop`] | fit the long side to a square, center on a filled canvas | crop the content box, optionally resize back |
//! | [`ResizeStrategy::FitLongSide`] | downscale if the long side exceeds a limit | trim any output overshoot |
//!
//! The padding never reaches the caller: the crop box is computed from the
//! same [`GeometryMeta`] that placed the content.

use std::panic::{self, AssertUnwindSafe};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{s, Array4};
use tracing::debug;

use super::Model;
use crate::error::{Error, Result};
use crate::raster::{
    matrix_to_rgb_image, rgb_image_to_matrix, tensor_to_matrix, ColorSpace, FloatTensor, RasterImage,
};

/// Placement of resized content on a square canvas.
///
/// Invariant: `pad_x + content_width <= square_size` and
/// `pad_y + content_height <= square_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryMeta {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
    pub content_width: u32,
    pub content_height: u32,
    pub square_size: u32,
}

impl GeometryMeta {
    /// Fit a `width` x `height` image into a centered `square` canvas.
    pub fn fit_square(width: u32, height: u32, square: u32) -> Self {
        let scale = f64::from(square) / f64::from(width.max(height).max(1));
        let fit = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, square);
        let content_width = fit(width);
        let content_height = fit(height);
        Self {
            scale,
            pad_x: (square - content_width) / 2,
            pad_y: (square - content_height) / 2,
            content_width,
            content_height,
            square_size: square,
        }
    }
}

/// How an image is brought to the network's input size and back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResizeStrategy {
    /// Fixed square input with padding, cropped back afterwards.
    PadAndCrop {
        square: u32,
        fill: [u8; 3],
        /// Resize the cropped content back to the caller's dimensions.
        restore_size: bool,
    },
    /// Any input size; only downscale when the long side exceeds `max_size`.
    FitLongSide { max_size: u32 },
}

/// Input normalization and output range of a network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Outputs are in [-1, 1] rather than [0, 1].
    pub symmetric_output: bool,
}

impl Normalization {
    /// Map [0, 1] to [-1, 1] and back.
    pub const SYMMETRIC: Normalization = Normalization {
        mean: [0.5; 3],
        std: [0.5; 3],
        symmetric_output: true,
    };

    /// ImageNet statistics in, [0, 1] out.
    pub const IMAGENET: Normalization = Normalization {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
        symmetric_output: false,
    };

    fn to_tensor(&self, image: &RgbImage) -> FloatTensor {
        let (w, h) = image.dimensions();
        Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
            let v = f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0;
            (v - self.mean[c]) / self.std[c]
        })
    }

    fn denormalize(&self, output: &mut FloatTensor) {
        if self.symmetric_output {
            output.mapv_inplace(|v| (v * 0.5 + 0.5).clamp(0.0, 1.0));
        } else {
            output.mapv_inplace(|v| v.clamp(0.0, 1.0));
        }
    }
}

/// Prepare the network input for `strategy`.
fn prepare(source: &RgbImage, strategy: &ResizeStrategy) -> (RgbImage, Option<GeometryMeta>) {
    let (width, height) = source.dimensions();
    match *strategy {
        ResizeStrategy::PadAndCrop { square, fill, .. } => {
            let meta = GeometryMeta::fit_square(width, height, square);
            let resized = imageops::resize(
                source,
                meta.content_width,
                meta.content_height,
                FilterType::CatmullRom,
            );
            let mut canvas = RgbImage::from_pixel(square, square, Rgb(fill));
            imageops::replace(&mut canvas, &resized, i64::from(meta.pad_x), i64::from(meta.pad_y));
            (canvas, Some(meta))
        }
        ResizeStrategy::FitLongSide { max_size } => {
            let long = width.max(height);
            if long <= max_size {
                return (source.clone(), None);
            }
            let scale = f64::from(max_size) / f64::from(long);
            let new_w = ((f64::from(width) * scale) as u32).max(1);
            let new_h = ((f64::from(height) * scale) as u32).max(1);
            (imageops::resize(source, new_w, new_h, FilterType::Lanczos3), None)
        }
    }
}

/// Run a forward pass, turning panics and non-finite outputs into
/// `Inference` errors.
fn forward_checked(model: &dyn Model, input: &FloatTensor) -> Result<FloatTensor> {
    let output = panic::catch_unwind(AssertUnwindSafe(|| model.infer(input))).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Error::inference(format!("forward pass panicked: {reason}"))
    })??;

    let (n, c, _, _) = output.dim();
    if n != 1 || c != 3 {
        return Err(Error::inference(format!(
            "expected a (1, 3, H, W) output, got {:?}",
            output.shape()
        )));
    }
    if output.iter().any(|v| !v.is_finite()) {
        return Err(Error::inference("non-finite values in model output"));
    }
    Ok(output)
}

/// Run `model` over `image` while preserving its geometry.
///
/// # Arguments
/// * `image` - Any supported raster; alpha is dropped
/// * `model` - Network taking and returning (1, 3, H, W)
/// * `strategy` - Resize strategy
/// * `normalization` - Input statistics and output range
///
/// # Returns
/// RGB image. With pad-and-crop and `restore_size` it has the input's
/// dimensions; otherwise it has the content or inference dimensions.
///
/// # Errors
///
/// `InvalidImage` for an invalid input, `Inference` if the forward pass
/// fails, panics, produces non-finite values or an output too small to crop.
pub fn run_inference(
    image: &RasterImage,
    model: &dyn Model,
    strategy: &ResizeStrategy,
    normalization: &Normalization,
) -> Result<RasterImage> {
    let source = matrix_to_rgb_image(&image.to_rgb_matrix()?);
    let (width, height) = source.dimensions();
    let (input, meta) = prepare(&source, strategy);
    let (in_w, in_h) = input.dimensions();
    debug!(width, height, in_w, in_h, ?meta, "running inference");

    let tensor = normalization.to_tensor(&input);
    drop(input);
    let mut output = forward_checked(model, &tensor)?;
    normalization.denormalize(&mut output);
    let (_, _, out_h, out_w) = output.dim();

    let matrix = match (strategy, meta) {
        (ResizeStrategy::PadAndCrop { restore_size, .. }, Some(meta)) => {
            let (x0, y0) = (meta.pad_x as usize, meta.pad_y as usize);
            let (x1, y1) = (x0 + meta.content_width as usize, y0 + meta.content_height as usize);
            if out_w < x1 || out_h < y1 {
                return Err(Error::inference(format!(
                    "output {out_w}x{out_h} does not cover the content box to ({x1}, {y1})"
                )));
            }
            let cropped = output.slice(s![.., .., y0..y1, x0..x1]).to_owned();
            let content = tensor_to_matrix(&cropped)?;
            if *restore_size && (meta.content_width, meta.content_height) != (width, height) {
                let restored = imageops::resize(
                    &matrix_to_rgb_image(&content),
                    width,
                    height,
                    FilterType::CatmullRom,
                );
                rgb_image_to_matrix(&restored)
            } else {
                content
            }
        }
        _ => {
            // Stride arithmetic can overshoot by a few pixels; trim back.
            let trimmed = output
                .slice(s![.., .., ..out_h.min(in_h as usize), ..out_w.min(in_w as usize)])
                .to_owned();
            tensor_to_matrix(&trimmed)?
        }
    };
    RasterImage::from_matrix(matrix, ColorSpace::Rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::raster::PixelBuffer;

    struct Identity;

    impl Model for Identity {
        fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
            Ok(input.clone())
        }
    }

    /// Pads the output by `extra` pixels on the right and bottom.
    struct Overshoot {
        extra: usize,
    }

    impl Model for Overshoot {
        fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
            let (n, c, h, w) = input.dim();
            let mut out = FloatTensor::zeros((n, c, h + self.extra, w + self.extra));
            out.slice_mut(s![.., .., ..h, ..w]).assign(input);
            Ok(out)
        }
    }

    struct Panics;

    impl Model for Panics {
        fn infer(&self, _: &FloatTensor) -> Result<FloatTensor> {
            panic!("device exhausted")
        }
    }

    struct NotANumber;

    impl Model for NotANumber {
        fn infer(&self, input: &FloatTensor) -> Result<FloatTensor> {
            Ok(input.mapv(|_| f32::NAN))
        }
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RasterImage {
        RasterImage::filled(width, height, ColorSpace::Rgb, &color).unwrap()
    }

    fn pad_and_crop(square: u32, restore_size: bool) -> ResizeStrategy {
        ResizeStrategy::PadAndCrop {
            square,
            fill: [255, 255, 255],
            restore_size,
        }
    }

    #[test]
    fn test_fit_square_meta() {
        let meta = GeometryMeta::fit_square(300, 100, 64);
        assert_eq!((meta.content_width, meta.content_height), (64, 21));
        assert_eq!((meta.pad_x, meta.pad_y), (0, 21));
        assert!(meta.pad_y + meta.content_height <= meta.square_size);

        let meta = GeometryMeta::fit_square(1, 1000, 512);
        assert_eq!(meta.content_width, 1);
        assert!(meta.pad_x + meta.content_width <= 512);
    }

    #[test]
    fn test_pad_and_crop_restores_dimensions() {
        for (w, h) in [(300, 100), (100, 300), (50, 50), (7, 513)] {
            let image = solid(w, h, [200, 30, 30]);
            let out = run_inference(&image, &Identity, &pad_and_crop(64, true), &Normalization::SYMMETRIC)
                .unwrap();
            assert!((i64::from(out.width()) - i64::from(w)).abs() <= 1);
            assert!((i64::from(out.height()) - i64::from(h)).abs() <= 1);
        }
    }

    #[test]
    fn test_padding_never_observed() {
        let image = solid(120, 40, [200, 30, 30]);
        let out = run_inference(&image, &Identity, &pad_and_crop(64, false), &Normalization::SYMMETRIC)
            .unwrap();
        assert_eq!((out.width(), out.height()), (64, 21));
        let PixelBuffer::U8(data) = out.data() else {
            panic!("expected bytes");
        };
        for px in data.chunks(3) {
            assert!((i32::from(px[0]) - 200).abs() <= 1, "{px:?}");
            assert!((i32::from(px[1]) - 30).abs() <= 1, "{px:?}");
        }
    }

    #[test]
    fn test_fit_long_side_downscales_only() {
        let strategy = ResizeStrategy::FitLongSide { max_size: 64 };
        let small = solid(40, 20, [10, 20, 30]);
        let out = run_inference(&small, &Identity, &strategy, &Normalization::IMAGENET).unwrap();
        assert_eq!((out.width(), out.height()), (40, 20));

        let large = solid(200, 100, [10, 20, 30]);
        let out = run_inference(&large, &Identity, &strategy, &Normalization::IMAGENET).unwrap();
        assert_eq!((out.width(), out.height()), (64, 32));
    }

    #[test]
    fn test_overshoot_trimmed() {
        let strategy = ResizeStrategy::FitLongSide { max_size: 512 };
        let image = solid(30, 18, [90, 90, 90]);
        let out = run_inference(&image, &Overshoot { extra: 3 }, &strategy, &Normalization::IMAGENET).unwrap();
        assert_eq!((out.width(), out.height()), (30, 18));
    }

    #[test]
    fn test_panic_becomes_inference_error() {
        let image = solid(8, 8, [0, 0, 0]);
        let err = run_inference(&image, &Panics, &pad_and_crop(16, true), &Normalization::SYMMETRIC).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.to_string().contains("device exhausted"));
    }

    #[test]
    fn test_non_finite_output_rejected() {
        let image = solid(8, 8, [0, 0, 0]);
        let err = run_inference(&image, &NotANumber, &pad_and_crop(16, true), &Normalization::SYMMETRIC)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
    }
}
