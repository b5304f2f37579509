//! Background removal: an opaque mask producer plus compositing.
//!
//! Segmentation itself is behind the [`BackgroundRemover`] trait so a real
//! model can be plugged in. The crate ships [`CornerKeyRemover`], which keys
//! out the color found in the image corners and works well for product shots
//! and scans on a flat backdrop.

use super::buffer::{ColorMode, ImageBuffer, ImageError};
use super::codec::{ReadError, read_image};
use super::operations::cover;
use super::transform::TransformError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackgroundError {
    #[error("background removal failed: {0}")]
    Remover(String),
    #[error("mask is {actual:?}, image is {expected:?}")]
    MaskSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("background image: {0}")]
    Backdrop(#[from] ReadError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Per-pixel foreground coverage: 255 keeps the pixel, 0 removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32, alpha: Vec<u8>) -> Result<Self, BackgroundError> {
        if alpha.len() != width as usize * height as usize {
            return Err(BackgroundError::Remover(format!(
                "mask has {} values for {width}x{height}",
                alpha.len()
            )));
        }
        Ok(Self { width, height, alpha })
    }

    /// A mask that keeps every pixel.
    pub fn opaque(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![255; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }
}

/// Produces a foreground mask for an image.
///
/// Implementations are shared across batch workers, hence `Send + Sync`.
pub trait BackgroundRemover: Send + Sync {
    fn remove_background(&self, image: &ImageBuffer) -> Result<Mask, BackgroundError>;
}

/// What replaces the removed background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    #[default]
    Transparent,
    Color {
        rgb: [u8; 3],
    },
    Image {
        path: PathBuf,
    },
}

impl Background {
    pub const WHITE: Background = Background::Color { rgb: [255, 255, 255] };
    pub const BLACK: Background = Background::Color { rgb: [0, 0, 0] };

    /// Whether the composited result keeps an alpha channel.
    pub fn is_transparent(&self) -> bool {
        matches!(self, Background::Transparent)
    }

    /// Parse `transparent`, `white`, `black`, `#rrggbb`, or `image:<path>`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "transparent" => return Ok(Background::Transparent),
            "white" => return Ok(Background::WHITE),
            "black" => return Ok(Background::BLACK),
            _ => {}
        }
        if let Some(path) = s.strip_prefix("image:") {
            return Ok(Background::Image { path: path.into() });
        }
        if let Some(hex) = lower.strip_prefix('#')
            && hex.len() == 6
        {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
            if let (Ok(r), Ok(g), Ok(b)) = (channel(0), channel(2), channel(4)) {
                return Ok(Background::Color { rgb: [r, g, b] });
            }
        }
        Err(format!(
            "invalid background '{s}' (expected transparent, white, black, #rrggbb or image:<path>)"
        ))
    }

    /// Load whatever the background needs to composite, sized for a `width`×`height` image.
    ///
    /// Backdrop images are scaled to cover the foreground and center-cropped.
    pub fn resolve(&self, width: u32, height: u32) -> Result<Backdrop, BackgroundError> {
        Ok(match self {
            Background::Transparent => Backdrop::Transparent,
            Background::Color { rgb } => Backdrop::Color(*rgb),
            Background::Image { path } => {
                let img = cover(&read_image(path)?, width, height)?;
                Backdrop::Image(img.to_rgba().flatten([255, 255, 255]))
            }
        })
    }
}

/// A [`Background`] ready for compositing.
#[derive(Debug, Clone)]
pub enum Backdrop {
    Transparent,
    Color([u8; 3]),
    /// Opaque RGB, same size as the foreground.
    Image(ImageBuffer),
}

/// Combine `foreground` and `mask` over `backdrop`.
///
/// Transparent backdrops yield RGBA with the mask as alpha (multiplied with any
/// existing alpha). Opaque backdrops yield RGB.
pub fn composite(foreground: &ImageBuffer, mask: &Mask, backdrop: &Backdrop) -> Result<ImageBuffer, BackgroundError> {
    let (w, h) = foreground.dimensions();
    if mask.dimensions() != (w, h) {
        return Err(BackgroundError::MaskSize {
            expected: (w, h),
            actual: mask.dimensions(),
        });
    }
    if let Backdrop::Image(img) = backdrop
        && img.dimensions() != (w, h)
    {
        return Err(BackgroundError::MaskSize {
            expected: (w, h),
            actual: img.dimensions(),
        });
    }

    let fg = foreground.to_rgba();
    let coverage = fg
        .pixels()
        .chunks_exact(4)
        .zip(mask.alpha())
        .map(|(px, &m)| ((px[3] as u32 * m as u32 + 127) / 255) as u8);

    match backdrop {
        Backdrop::Transparent => {
            let mut out = Vec::with_capacity(fg.byte_len());
            for (px, a) in fg.pixels().chunks_exact(4).zip(coverage) {
                out.extend_from_slice(&[px[0], px[1], px[2], a]);
            }
            Ok(ImageBuffer::new(w, h, ColorMode::Rgba, out)?)
        }
        Backdrop::Color(rgb) => {
            let mut out = Vec::with_capacity(w as usize * h as usize * 3);
            for (px, a) in fg.pixels().chunks_exact(4).zip(coverage) {
                for c in 0..3 {
                    out.push(blend(px[c], rgb[c], a));
                }
            }
            Ok(ImageBuffer::new(w, h, ColorMode::Rgb, out)?)
        }
        Backdrop::Image(bg) => {
            let mut out = Vec::with_capacity(w as usize * h as usize * 3);
            let rows = fg.pixels().chunks_exact(4).zip(bg.pixels().chunks_exact(3));
            for ((px, under), a) in rows.zip(coverage) {
                for c in 0..3 {
                    out.push(blend(px[c], under[c], a));
                }
            }
            Ok(ImageBuffer::new(w, h, ColorMode::Rgb, out)?)
        }
    }
}

fn blend(fg: u8, bg: u8, alpha: u8) -> u8 {
    ((fg as u32 * alpha as u32 + bg as u32 * (255 - alpha as u32) + 127) / 255) as u8
}

/// Keys out pixels close to the average color of the four corners.
#[derive(Debug, Clone, Copy)]
pub struct CornerKeyRemover {
    /// Largest per-channel difference still treated as background.
    pub tolerance: u8,
}

impl Default for CornerKeyRemover {
    fn default() -> Self {
        Self { tolerance: 24 }
    }
}

impl BackgroundRemover for CornerKeyRemover {
    fn remove_background(&self, image: &ImageBuffer) -> Result<Mask, BackgroundError> {
        let rgba = image.to_rgba();
        let (w, h) = rgba.dimensions();
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
        let mut key = [0u32; 3];
        for (x, y) in corners {
            let px = rgba.pixel(x, y);
            for c in 0..3 {
                key[c] += px[c] as u32;
            }
        }
        let key = key.map(|sum| (sum / 4) as u8);
        log::debug!("corner key {key:?}, tolerance {}", self.tolerance);

        let alpha = rgba
            .pixels()
            .chunks_exact(4)
            .map(|px| {
                let distance = (0..3).map(|c| px[c].abs_diff(key[c])).max().unwrap_or(0);
                if distance <= self.tolerance { 0 } else { 255 }
            })
            .collect();
        Mask::new(w, h, alpha)
    }
}
