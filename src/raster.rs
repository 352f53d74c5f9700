//! Raster image representation and the format adapter.
//!
//! A [`RasterImage`] is the library-agnostic exchange type: a packed pixel
//! buffer plus width, height and a [`ColorSpace`] tag. Internally the engine
//! works on two numeric representations:
//!
//! | Representation | Type | Layout | Range |
//! |----------------|------|--------|-------|
//! | Pixel matrix | `Array3<u8>` | (H, W, C) interleaved | 0-255 |
//! | Float tensor | `Array4<f32>` | (1, C, H, W) planar | 0.0-1.0 |
//!
//! Both internal representations always use canonical channel order
//! (gray, RGB or RGBA). BGR/BGRA inputs are swizzled on the way in and
//! back on the way out, so conversions round-trip exactly for u8 data and
//! within 1/255 through the tensor path.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use ndarray::{Array3, Array4};

use crate::error::{Error, Result};

/// Interleaved (H, W, C) byte matrix used by the classical filters.
pub type PixelMatrix = Array3<u8>;

/// Planar (1, C, H, W) float tensor used by the neural paths.
pub type FloatTensor = Array4<f32>;

/// Channel layout and ordering of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Rgba,
    Bgr,
    Bgra,
}

impl ColorSpace {
    /// Number of channels for this color space.
    pub const fn channels(self) -> usize {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb | ColorSpace::Bgr => 3,
            ColorSpace::Rgba | ColorSpace::Bgra => 4,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, ColorSpace::Rgba | ColorSpace::Bgra)
    }

    const fn is_bgr_order(self) -> bool {
        matches!(self, ColorSpace::Bgr | ColorSpace::Bgra)
    }

    /// Canonical color space for a channel count (1 → Gray, 3 → RGB, 4 → RGBA).
    pub fn from_channels(channels: usize) -> Result<Self> {
        match channels {
            1 => Ok(ColorSpace::Gray),
            3 => Ok(ColorSpace::Rgb),
            4 => Ok(ColorSpace::Rgba),
            n => Err(Error::unsupported(format!(
                "{n} channels (expected 1, 3 or 4)"
            ))),
        }
    }
}

/// Raw sample storage. Float samples are expected in 0.0-1.0.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn byte_at(&self, index: usize) -> u8 {
        match self {
            PixelBuffer::U8(v) => v[index],
            PixelBuffer::F32(v) => f32_to_byte(v[index]),
        }
    }
}

#[inline]
fn f32_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Network outputs are truncated to bytes, not rounded. The small bias keeps
/// values that started as exact bytes from dropping one level on float error.
#[inline]
fn tensor_value_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 1e-3) as u8
}

/// A raster image: dimensions, color space tag and a packed sample buffer.
///
/// Invariant: `data.len() == width * height * color_space.channels()`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    color_space: ColorSpace,
    data: PixelBuffer,
}

impl RasterImage {
    /// Create an image from a raw buffer, validating the layout.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` if `channels` is not 1, 3 or 4 or does not match
    /// the color space; `InvalidImage` for zero dimensions or a buffer whose
    /// length disagrees with the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        channels: usize,
        color_space: ColorSpace,
        data: PixelBuffer,
    ) -> Result<Self> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(Error::unsupported(format!(
                "{channels} channels (expected 1, 3 or 4)"
            )));
        }
        if channels != color_space.channels() {
            return Err(Error::unsupported(format!(
                "{color_space:?} requires {} channels, got {channels}",
                color_space.channels()
            )));
        }
        let image = Self {
            width,
            height,
            color_space,
            data,
        };
        image.validate()?;
        Ok(image)
    }

    /// Create an 8-bit image, inferring the canonical color space from the
    /// channel count.
    pub fn from_u8(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Result<Self> {
        let color_space = ColorSpace::from_channels(channels)?;
        Self::new(width, height, channels, color_space, PixelBuffer::U8(data))
    }

    /// Create an image filled with a single color. `color` must have one
    /// sample per channel of `color_space`.
    pub fn filled(width: u32, height: u32, color_space: ColorSpace, color: &[u8]) -> Result<Self> {
        let channels = color_space.channels();
        if color.len() != channels {
            return Err(Error::invalid_parameter(
                "color",
                format!("expected {channels} samples, got {}", color.len()),
            ));
        }
        let pixels = width as usize * height as usize;
        let data = color.iter().copied().cycle().take(pixels * channels).collect();
        Self::new(width, height, channels, color_space, PixelBuffer::U8(data))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.color_space.channels()
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn data(&self) -> &PixelBuffer {
        &self.data
    }

    /// Consume the image and return its sample buffer.
    pub fn into_data(self) -> PixelBuffer {
        self.data
    }

    /// Build an image without checking the layout.
    #[cfg(test)]
    pub(crate) fn unchecked(width: u32, height: u32, color_space: ColorSpace, data: PixelBuffer) -> Self {
        Self {
            width,
            height,
            color_space,
            data,
        }
    }

    /// Check the buffer/dimension invariant.
    ///
    /// # Errors
    ///
    /// `InvalidImage` for zero-size images or a length mismatch.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_image(format!(
                "zero-size image {}x{}",
                self.width, self.height
            )));
        }
        if self.data.is_empty() {
            return Err(Error::invalid_image("empty pixel buffer"));
        }
        let expected = self.width as usize * self.height as usize * self.channels();
        if self.data.len() != expected {
            return Err(Error::invalid_image(format!(
                "buffer holds {} samples, {}x{}x{} requires {expected}",
                self.data.len(),
                self.width,
                self.height,
                self.channels()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Pixel matrix conversion
    // ========================================================================

    /// Convert to an (H, W, C) byte matrix in canonical channel order,
    /// keeping the channel count of the source.
    pub fn to_matrix(&self) -> Result<PixelMatrix> {
        self.validate()?;
        let (h, w, c) = (self.height as usize, self.width as usize, self.channels());
        let bgr = self.color_space.is_bgr_order();
        let mut matrix = Array3::<u8>::zeros((h, w, c));
        for y in 0..h {
            for x in 0..w {
                let base = (y * w + x) * c;
                for ch in 0..c {
                    let src = if bgr && ch < 3 { 2 - ch } else { ch };
                    matrix[[y, x, ch]] = self.data.byte_at(base + src);
                }
            }
        }
        Ok(matrix)
    }

    /// Convert to an RGB matrix, the working format of the classical
    /// filters. Gray is replicated, alpha is dropped.
    pub fn to_rgb_matrix(&self) -> Result<PixelMatrix> {
        let matrix = self.to_matrix()?;
        Ok(match matrix.dim().2 {
            3 => matrix,
            1 => gray_to_rgb(&matrix),
            _ => matrix.slice(ndarray::s![.., .., 0..3]).to_owned(),
        })
    }

    /// Convert to an RGBA matrix. Sources without alpha become opaque.
    pub fn to_rgba_matrix(&self) -> Result<PixelMatrix> {
        let matrix = self.to_matrix()?;
        let (h, w, c) = matrix.dim();
        if c == 4 {
            return Ok(matrix);
        }
        let mut out = Array3::<u8>::from_elem((h, w, 4), 255);
        for y in 0..h {
            for x in 0..w {
                for ch in 0..3 {
                    out[[y, x, ch]] = matrix[[y, x, if c == 1 { 0 } else { ch }]];
                }
            }
        }
        Ok(out)
    }

    /// Build an image from a canonical-order matrix, tagging it with
    /// `color_space` (BGR spaces are swizzled back).
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` if the matrix channel count does not match.
    pub fn from_matrix(matrix: PixelMatrix, color_space: ColorSpace) -> Result<Self> {
        let (h, w, c) = matrix.dim();
        if c != color_space.channels() {
            return Err(Error::unsupported(format!(
                "matrix has {c} channels, {color_space:?} requires {}",
                color_space.channels()
            )));
        }
        let data = if color_space.is_bgr_order() {
            let mut data = Vec::with_capacity(h * w * c);
            for y in 0..h {
                for x in 0..w {
                    for ch in 0..c {
                        let src = if ch < 3 { 2 - ch } else { ch };
                        data.push(matrix[[y, x, src]]);
                    }
                }
            }
            data
        } else {
            matrix.as_standard_layout().iter().copied().collect()
        };
        Self::new(w as u32, h as u32, c, color_space, PixelBuffer::U8(data))
    }

    // ========================================================================
    // Tensor conversion
    // ========================================================================

    /// Convert to a (1, C, H, W) float tensor with values in 0.0-1.0.
    pub fn to_tensor(&self) -> Result<FloatTensor> {
        let matrix = self.to_matrix()?;
        Ok(matrix_to_tensor(&matrix))
    }

    /// Build an image from a (1, C, H, W) tensor in 0.0-1.0. Values are
    /// clamped and rounded to bytes.
    pub fn from_tensor(tensor: &FloatTensor, color_space: ColorSpace) -> Result<Self> {
        Self::from_matrix(tensor_to_matrix(tensor)?, color_space)
    }

    // ========================================================================
    // Codec helpers
    // ========================================================================

    /// Decode encoded bytes (PNG, JPEG, WebP). Inputs other than RGB/RGBA
    /// are normalized to RGB.
    ///
    /// # Errors
    ///
    /// `InvalidImage` if the bytes are empty or cannot be decoded.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::invalid_image("empty upload"));
        }
        let dynamic = image::load_from_memory(bytes)
            .map_err(|e| Error::invalid_image(format!("undecodable image: {e}")))?;
        Self::from_dynamic(dynamic)
    }

    /// Encode as PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let dynamic = self.to_dynamic()?;
        let mut bytes = Vec::new();
        dynamic
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| Error::invalid_image(format!("PNG encoding failed: {e}")))?;
        Ok(bytes)
    }

    /// Convert from an `image` crate buffer. RGBA stays RGBA, everything
    /// else becomes RGB.
    pub fn from_dynamic(dynamic: DynamicImage) -> Result<Self> {
        let (width, height) = (dynamic.width(), dynamic.height());
        if dynamic.color().has_alpha() {
            let rgba = dynamic.into_rgba8();
            Self::new(width, height, 4, ColorSpace::Rgba, PixelBuffer::U8(rgba.into_raw()))
        } else {
            let rgb = dynamic.into_rgb8();
            Self::new(width, height, 3, ColorSpace::Rgb, PixelBuffer::U8(rgb.into_raw()))
        }
    }

    /// Convert to an `image` crate buffer in canonical channel order.
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let matrix = self.to_matrix()?;
        let (w, h) = (self.width, self.height);
        let raw: Vec<u8> = matrix.as_standard_layout().iter().copied().collect();
        let invalid = || Error::invalid_image("buffer does not match dimensions");
        Ok(match self.channels() {
            1 => DynamicImage::ImageLuma8(image::GrayImage::from_raw(w, h, raw).ok_or_else(invalid)?),
            3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, raw).ok_or_else(invalid)?),
            _ => DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, raw).ok_or_else(invalid)?),
        })
    }
}

// ============================================================================
// Free conversion helpers
// ============================================================================

/// Convert an (H, W, C) byte matrix to a (1, C, H, W) tensor in 0.0-1.0.
pub fn matrix_to_tensor(matrix: &PixelMatrix) -> FloatTensor {
    let (h, w, c) = matrix.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = f32::from(matrix[[y, x, ch]]) / 255.0;
            }
        }
    }
    tensor
}

/// Convert a (1, C, H, W) tensor in 0.0-1.0 to an (H, W, C) byte matrix.
/// Values are clamped and truncated (`v * 255` rounded toward zero).
///
/// # Errors
///
/// `UnsupportedFormat` for a batch size other than 1 or an unsupported
/// channel count.
pub fn tensor_to_matrix(tensor: &FloatTensor) -> Result<PixelMatrix> {
    let (n, c, h, w) = tensor.dim();
    if n != 1 {
        return Err(Error::unsupported(format!("batch of {n} tensors")));
    }
    ColorSpace::from_channels(c)?;
    let mut matrix = Array3::<u8>::zeros((h, w, c));
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                matrix[[y, x, ch]] = tensor_value_to_byte(tensor[[0, ch, y, x]]);
            }
        }
    }
    Ok(matrix)
}

/// Replicate a single-channel matrix into three channels.
pub fn gray_to_rgb(matrix: &PixelMatrix) -> PixelMatrix {
    let (h, w, _) = matrix.dim();
    Array3::from_shape_fn((h, w, 3), |(y, x, _)| matrix[[y, x, 0]])
}

/// Convert an RGB(A) matrix to an `image` crate RGB buffer.
pub(crate) fn matrix_to_rgb_image(matrix: &PixelMatrix) -> RgbImage {
    let (h, w, c) = matrix.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if c == 1 {
            let v = matrix[[y, x, 0]];
            image::Rgb([v, v, v])
        } else {
            image::Rgb([matrix[[y, x, 0]], matrix[[y, x, 1]], matrix[[y, x, 2]]])
        }
    })
}

/// Convert an `image` crate RGB buffer to an (H, W, 3) matrix.
pub(crate) fn rgb_image_to_matrix(image: &RgbImage) -> PixelMatrix {
    let (w, h) = image.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c]
    })
}
