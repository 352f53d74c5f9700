//! Neural filters: cartoonization and fast style transfer.

use tracing::debug;

use crate::error::{Error, Result};
use crate::filters::noise::bilateral_u8;
use crate::inference::{run_inference, LoadedModel, ModelCache, Normalization, ResizeStrategy};
use crate::raster::{ColorSpace, RasterImage};
use crate::style::{NeuralStyle, TransferStyle};

/// Bilateral smoothing applied to style transfer output: (diameter,
/// sigma color, sigma space).
const TRANSFER_SMOOTHING: (usize, f32, f32) = (9, 75.0, 75.0);

/// Canvas settings of the cartoon generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartoonCanvas {
    pub square: u32,
    pub fill: [u8; 3],
}

impl Default for CartoonCanvas {
    fn default() -> Self {
        Self {
            square: 512,
            fill: [255, 255, 255],
        }
    }
}

/// Anime-style rendering through the generator, padded to a square canvas
/// and cropped back to the input's geometry.
pub fn cartoonize(image: &RasterImage, model: &LoadedModel, canvas: CartoonCanvas) -> Result<RasterImage> {
    let strategy = ResizeStrategy::PadAndCrop {
        square: canvas.square,
        fill: canvas.fill,
        restore_size: true,
    };
    run_inference(image, model.model(), &strategy, &Normalization::SYMMETRIC)
}

/// Fast neural style transfer followed by a light bilateral pass that
/// softens synthesis noise.
///
/// The output keeps the input's dimensions unless the long side exceeds
/// the style's maximum, in which case it is downscaled to it.
pub fn style_transfer(image: &RasterImage, model: &LoadedModel, style: TransferStyle) -> Result<RasterImage> {
    let strategy = ResizeStrategy::FitLongSide {
        max_size: style.max_size(),
    };
    let stylized = run_inference(image, model.model(), &strategy, &Normalization::IMAGENET)?;
    let matrix = stylized.to_matrix()?;
    let (diameter, sigma_color, sigma_space) = TRANSFER_SMOOTHING;
    let smoothed = bilateral_u8(matrix.view(), diameter, sigma_color, sigma_space);
    RasterImage::from_matrix(smoothed, ColorSpace::Rgb)
}

/// Resolve the model for `style` through the cache and run it.
///
/// # Errors
///
/// `InvalidImage` before any model is touched if the image is invalid;
/// otherwise cache and inference errors.
pub fn apply(image: &RasterImage, style: NeuralStyle, cache: &ModelCache, canvas: CartoonCanvas) -> Result<RasterImage> {
    image.validate()?;
    let model = cache.get(style)?;
    if model.style() != style {
        return Err(Error::inference(format!(
            "cache returned {} for {}",
            model.style(),
            style
        )));
    }
    debug!(style = %style, width = image.width(), height = image.height(), "applying neural filter");
    match style {
        NeuralStyle::Cartoon => cartoonize(image, &model, canvas),
        NeuralStyle::StyleTransfer(transfer) => style_transfer(image, &model, transfer),
    }
}
