//! In-memory raster type shared by every component.
//!
//! An [`ImageBuffer`] never changes after construction. Transforms build a new
//! buffer; the pixel storage is reference counted so clones (history entries,
//! cache hits, session snapshots) share bytes instead of copying them.

use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} {mode:?}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        mode: ColorMode,
        expected: usize,
        actual: usize,
    },
    #[error("image dimensions must be non-zero (got {0}x{1})")]
    ZeroSized(u32, u32),
}

/// Channel layout of an [`ImageBuffer`]. Always 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl ColorMode {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorMode::Gray => 1,
            ColorMode::GrayAlpha => 2,
            ColorMode::Rgb => 3,
            ColorMode::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, ColorMode::GrayAlpha | ColorMode::Rgba)
    }
}

/// Immutable pixel raster: `pixels.len() == width * height * bytes_per_pixel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    mode: ColorMode,
    pixels: Arc<[u8]>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, mode: ColorMode, pixels: Vec<u8>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::ZeroSized(width, height));
        }
        let expected = width as usize * height as usize * mode.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(ImageError::InvalidBuffer {
                width,
                height,
                mode,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            mode,
            pixels: pixels.into(),
        })
    }

    /// Build a buffer by evaluating `f` for every pixel, row-major.
    pub fn from_fn(
        width: u32,
        height: u32,
        mode: ColorMode,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, ImageError> {
        let bpp = mode.bytes_per_pixel();
        let mut pixels = Vec::with_capacity(width as usize * height as usize * bpp);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y)[..bpp]);
            }
        }
        Self::new(width, height, mode, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Size of the pixel payload in bytes; used for cache budgets.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// The bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.mode.bytes_per_pixel();
        let start = (y as usize * self.width as usize + x as usize) * bpp;
        &self.pixels[start..start + bpp]
    }

    /// Whether two buffers share the same pixel storage (not just equal bytes).
    pub fn shares_pixels_with(&self, other: &ImageBuffer) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Normalize a decoded [`DynamicImage`] into one of the four 8-bit layouts.
    ///
    /// 16-bit and float images are narrowed; anything with an alpha channel
    /// becomes [`ColorMode::Rgba`] unless it is grayscale.
    pub fn from_dynamic(img: DynamicImage) -> Result<Self, ImageError> {
        let (width, height) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(buf) => Self::new(width, height, ColorMode::Gray, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => {
                Self::new(width, height, ColorMode::GrayAlpha, buf.into_raw())
            }
            DynamicImage::ImageRgb8(buf) => Self::new(width, height, ColorMode::Rgb, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => Self::new(width, height, ColorMode::Rgba, buf.into_raw()),
            other if other.color().has_alpha() => {
                Self::new(width, height, ColorMode::Rgba, other.to_rgba8().into_raw())
            }
            other => Self::new(width, height, ColorMode::Rgb, other.to_rgb8().into_raw()),
        }
    }

    /// Copy into an `image` crate value for resampling and encoding.
    pub fn to_dynamic(&self) -> DynamicImage {
        let raw = self.pixels.to_vec();
        let (w, h) = (self.width, self.height);
        // Length was validated at construction, so from_raw cannot fail here;
        // fall back to a blank image of the right size rather than panic.
        match self.mode {
            ColorMode::Gray => image::GrayImage::from_raw(w, h, raw)
                .map(DynamicImage::ImageLuma8)
                .unwrap_or_else(|| DynamicImage::new_luma8(w, h)),
            ColorMode::GrayAlpha => image::GrayAlphaImage::from_raw(w, h, raw)
                .map(DynamicImage::ImageLumaA8)
                .unwrap_or_else(|| DynamicImage::new_luma_a8(w, h)),
            ColorMode::Rgb => image::RgbImage::from_raw(w, h, raw)
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(w, h)),
            ColorMode::Rgba => image::RgbaImage::from_raw(w, h, raw)
                .map(DynamicImage::ImageRgba8)
                .unwrap_or_else(|| DynamicImage::new_rgba8(w, h)),
        }
    }

    /// Convert to RGBA, keeping existing alpha or filling it with 255.
    pub fn to_rgba(&self) -> ImageBuffer {
        if self.mode == ColorMode::Rgba {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for px in self.pixels.chunks_exact(self.mode.bytes_per_pixel()) {
            let rgba = match self.mode {
                ColorMode::Gray => [px[0], px[0], px[0], 255],
                ColorMode::GrayAlpha => [px[0], px[0], px[0], px[1]],
                ColorMode::Rgb => [px[0], px[1], px[2], 255],
                ColorMode::Rgba => [px[0], px[1], px[2], px[3]],
            };
            out.extend_from_slice(&rgba);
        }
        ImageBuffer {
            width: self.width,
            height: self.height,
            mode: ColorMode::Rgba,
            pixels: out.into(),
        }
    }

    /// Drop alpha by compositing over an opaque background color.
    ///
    /// Gray stays gray, GrayAlpha becomes Gray (using the background's red
    /// channel), Rgba becomes Rgb.
    pub fn flatten(&self, background: [u8; 3]) -> ImageBuffer {
        let blend = |c: u8, bg: u8, a: u8| -> u8 {
            ((c as u32 * a as u32 + bg as u32 * (255 - a as u32) + 127) / 255) as u8
        };
        let (mode, out): (ColorMode, Vec<u8>) = match self.mode {
            ColorMode::Gray | ColorMode::Rgb => return self.clone(),
            ColorMode::GrayAlpha => (
                ColorMode::Gray,
                self.pixels
                    .chunks_exact(2)
                    .map(|px| blend(px[0], background[0], px[1]))
                    .collect(),
            ),
            ColorMode::Rgba => (
                ColorMode::Rgb,
                self.pixels
                    .chunks_exact(4)
                    .flat_map(|px| {
                        [
                            blend(px[0], background[0], px[3]),
                            blend(px[1], background[1], px[3]),
                            blend(px[2], background[2], px[3]),
                        ]
                    })
                    .collect(),
            ),
        };
        ImageBuffer {
            width: self.width,
            height: self.height,
            mode,
            pixels: out.into(),
        }
    }
}
