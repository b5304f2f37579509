//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Encode** | per-format encoders (JPEG and WebP quality, lossless PNG/BMP/TIFF, optional lossless WebP) |
//! | **Resize / thumbnail** | Lanczos3 `resize_exact` |
//! | **Rotate / flip / crop** | byte-level copies, any color mode |
//! | **Background** | [`BackgroundRemover`] mask + compositing |
//!
//! The module is split into:
//! - **Buffer**: the immutable [`ImageBuffer`] raster
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Codec**: bytes ↔ [`ImageBuffer`]
//! - **Transform**: lossless pixel moves
//! - **Operations**: resampling built on calculations
//! - **Background**: the remover trait and compositing

pub mod background;
pub mod buffer;
pub mod calculations;
pub mod codec;
pub mod operations;
mod params;
pub mod transform;

pub use background::{Backdrop, Background, BackgroundError, BackgroundRemover, CornerKeyRemover, Mask};
pub use buffer::{ColorMode, ImageBuffer, ImageError};
pub use codec::{CodecError, OutputFormat, ReadError, decode, encode, encode_with, read_image};
pub use params::{InvalidQuality, Quality, RESIZE_PRESETS, ResizeParams, ResizePreset};
pub use transform::TransformError;
