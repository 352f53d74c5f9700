//! Classical stylization filters and their numeric building blocks.
//!
//! ## Supported Formats
//!
//! Every stylization pipeline works on an interleaved RGB byte matrix:
//!
//! | Format | Shape | Type | Description |
//! |--------|-------|------|-------------|
//! | RGB8 | (H, W, 3) | u8 | Red, green, blue, 0-255 |
//!
//! Gray and RGBA inputs are normalized to RGB by the caller
//! ([`RasterImage::to_rgb_matrix`](crate::raster::RasterImage::to_rgb_matrix)).
//! Outputs are RGB, except gray sketch and manga which are single channel
//! (H, W, 1).
//!
//! ## Architecture
//!
//! - **Pure** - every filter is a function of its input and parameter record
//! - **Deterministic** - k-means initialization is seeded
//! - **Parallel** - per-pixel stages use rayon through `ndarray::Zip`
//!
//! ## Filter Categories
//!
//! - **Pipelines**: sketch, comic, manga, neon, pop_art, pixel_art
//! - **Smoothing**: blur (Gaussian), noise (bilateral, median)
//! - **Edges**: edge (Laplacian, Canny, threshold), morphology (dilate)
//! - **Color**: grayscale, color_science (HSV, Lab), histogram, colormap
//! - **Quantization**: stylize (posterize), quantize (k-means, median cut)
//! - **Rasterization**: draw (lines, discs)

pub mod blur;
pub mod color_science;
pub mod colormap;
pub mod draw;
pub mod edge;
pub mod grayscale;
pub mod histogram;
pub mod morphology;
pub mod noise;
pub mod quantize;
pub mod stylize;

pub mod comic;
pub mod manga;
pub mod neon;
pub mod pixel_art;
pub mod pop_art;
pub mod sketch;

use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::{ColorSpace, PixelMatrix};
use crate::style::ClassicalStyle;

/// Run a classical style over an RGB matrix.
///
/// # Arguments
/// * `matrix` - RGB image (height, width, 3)
/// * `style` - Resolved style and parameters
///
/// # Returns
/// The stylized matrix and the color space its channels are in
///
/// # Errors
///
/// `InvalidImage` for a zero-size matrix, `UnsupportedFormat` if the
/// matrix is not three-channel.
pub fn apply(matrix: &PixelMatrix, style: &ClassicalStyle) -> Result<(PixelMatrix, ColorSpace)> {
    let (height, width, channels) = matrix.dim();
    if height == 0 || width == 0 {
        return Err(Error::invalid_image(format!("zero-size matrix {width}x{height}")));
    }
    if channels != 3 {
        return Err(Error::unsupported(format!(
            "classical filters expect RGB, got {channels} channels"
        )));
    }
    debug!(style = style.name(), width, height, "applying classical filter");

    let input = matrix.view();
    let result = match style {
        ClassicalStyle::GraySketch(params) => (sketch::gray_sketch(input, params), ColorSpace::Gray),
        ClassicalStyle::ColorSketch(params) => (sketch::color_sketch(input, params), ColorSpace::Rgb),
        ClassicalStyle::ComicArt(params) => (comic::comic_art(input, params), ColorSpace::Rgb),
        ClassicalStyle::Manga(params) => (manga::manga(input, params), ColorSpace::Gray),
        ClassicalStyle::NeonGlow(params) => (neon::neon_glow(input, params), ColorSpace::Rgb),
        ClassicalStyle::PopArt(params) => (pop_art::pop_art(input, params), ColorSpace::Rgb),
        ClassicalStyle::PixelArt(params) => {
            params.validate()?;
            (pixel_art::pixel_art(input, params), ColorSpace::Rgb)
        }
    };
    Ok(result)
}
