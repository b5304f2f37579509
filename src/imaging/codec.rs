//! Image codec: decode bytes into an [`ImageBuffer`], encode one back out.
//!
//! Pure Rust apart from lossy WebP, which goes through libwebp (built from
//! source by the `webp` crate), and optional HEIC/HEIF reading via libheif.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP) | `image::load_from_memory` |
//! | Format sniffing | `image::guess_format` + ISO-BMFF brand check for HEIC/HEIF |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` (alpha flattened onto white) |
//! | Encode → PNG | `PngEncoder::new_with_quality` (best compression, adaptive filter) |
//! | Encode → BMP / TIFF | lossless encoders, quality validated but unused |
//! | Encode → WebP (lossy) | `webp::Encoder::encode_simple` at the given quality |
//! | Encode → WebP (lossless) | `WebPEncoder::new_lossless` |

use super::buffer::{ColorMode, ImageBuffer};
use super::params::{InvalidQuality, Quality};
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error(transparent)]
    InvalidQuality(#[from] InvalidQuality),
}

/// Failure to turn a file on disk into an [`ImageBuffer`].
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
}

/// Formats the encoder can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Tiff,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::WebP,
        OutputFormat::Bmp,
        OutputFormat::Tiff,
    ];

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Bmp => "image/bmp",
            OutputFormat::Tiff => "image/tiff",
        }
    }

    /// Whether encoding discards information (so quality matters).
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::WebP)
    }

    pub fn supports_alpha(self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "bmp" => Some(OutputFormat::Bmp),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Map a sniffed `image` crate format onto a writable one.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::WebP),
            ImageFormat::Bmp => Some(OutputFormat::Bmp),
            ImageFormat::Tiff => Some(OutputFormat::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WebP",
            OutputFormat::Bmp => "BMP",
            OutputFormat::Tiff => "TIFF",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            format!("unknown format '{s}' (expected jpeg, png, webp, bmp or tiff)")
        })
    }
}

/// Extensions whose decoders are compiled in.
const DECODE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
];

const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut exts: Vec<&'static str> = DECODE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect();
    if cfg!(feature = "heic") {
        exts.extend_from_slice(HEIF_EXTENSIONS);
    }
    exts
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether a path looks like an image this tool knows about, decodable or not.
pub fn is_recognized_image(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    supported_input_extensions().contains(&ext.as_str()) || HEIF_EXTENSIONS.contains(&ext.as_str())
}

/// ISO-BMFF `ftyp` brands used by HEIC/HEIF containers.
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1",
];

fn is_heif(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && HEIF_BRANDS.iter().any(|b| &bytes[8..12] == *b)
}

/// Sniff the container format of encoded bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Decode encoded bytes into an [`ImageBuffer`].
pub fn decode(bytes: &[u8]) -> Result<ImageBuffer, CodecError> {
    if is_heif(bytes) {
        return decode_heif(bytes);
    }
    match detect_format(bytes) {
        Some(fmt) if !fmt.reading_enabled() => {
            return Err(CodecError::UnsupportedFormat(format!("{fmt:?}")));
        }
        None => {
            return Err(CodecError::Decode("unrecognized image data".into()));
        }
        Some(_) => {}
    }
    let img = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    ImageBuffer::from_dynamic(img).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(feature = "heic")]
fn decode_heif(bytes: &[u8]) -> Result<ImageBuffer, CodecError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let heif_error = |e: libheif_rs::HeifError| CodecError::Decode(format!("HEIF: {e}"));
    let ctx = HeifContext::read_from_bytes(bytes).map_err(heif_error)?;
    let handle = ctx.primary_image_handle().map_err(heif_error)?;
    let (chroma, mode) = if handle.has_alpha_channel() {
        (RgbChroma::Rgba, ColorMode::Rgba)
    } else {
        (RgbChroma::Rgb, ColorMode::Rgb)
    };
    let image = LibHeif::new()
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(heif_error)?;
    let planes = image.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| CodecError::Decode("HEIF: decoder returned no interleaved plane".into()))?;

    // Rows may be padded past width * bytes_per_pixel.
    let row_len = plane.width as usize * mode.bytes_per_pixel();
    let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        let row = row
            .get(..row_len)
            .ok_or_else(|| CodecError::Decode("HEIF: truncated pixel row".into()))?;
        pixels.extend_from_slice(row);
    }
    ImageBuffer::new(plane.width, plane.height, mode, pixels).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(not(feature = "heic"))]
fn decode_heif(_bytes: &[u8]) -> Result<ImageBuffer, CodecError> {
    Err(CodecError::UnsupportedFormat(
        "HEIC/HEIF decoding needs the `heic` feature (libheif)".into(),
    ))
}

/// Read and decode an image file.
pub fn read_image(path: &Path) -> Result<ImageBuffer, ReadError> {
    let bytes = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes).map_err(|source| ReadError::Codec {
        path: path.to_path_buf(),
        source,
    })
}

fn color_type(mode: ColorMode) -> ExtendedColorType {
    match mode {
        ColorMode::Gray => ExtendedColorType::L8,
        ColorMode::GrayAlpha => ExtendedColorType::La8,
        ColorMode::Rgb => ExtendedColorType::Rgb8,
        ColorMode::Rgba => ExtendedColorType::Rgba8,
    }
}

/// Convert the buffer into a layout the target encoder accepts.
fn prepare_for(buffer: &ImageBuffer, format: OutputFormat, lossless: bool) -> ImageBuffer {
    match (format, buffer.mode()) {
        (OutputFormat::Jpeg, mode) if mode.has_alpha() => buffer.flatten([255, 255, 255]),
        (OutputFormat::Tiff, ColorMode::GrayAlpha) => buffer.to_rgba(),
        // libwebp only takes RGB or RGBA.
        (OutputFormat::WebP, ColorMode::Gray) if !lossless => buffer.to_rgba().flatten([255, 255, 255]),
        (OutputFormat::WebP, ColorMode::GrayAlpha) if !lossless => buffer.to_rgba(),
        _ => buffer.clone(),
    }
}

/// Encode an [`ImageBuffer`] into the given format.
///
/// `quality` drives JPEG and WebP compression; the lossless encoders accept
/// and ignore it. Same as [`encode_with`] with `lossless` off.
pub fn encode(buffer: &ImageBuffer, format: OutputFormat, quality: Quality) -> Result<Vec<u8>, CodecError> {
    encode_with(buffer, format, quality, false)
}

/// Encode with explicit control over WebP compression.
///
/// `lossless` only changes WebP output; every other format is either always
/// lossy (JPEG) or always lossless.
pub fn encode_with(
    buffer: &ImageBuffer,
    format: OutputFormat,
    quality: Quality,
    lossless: bool,
) -> Result<Vec<u8>, CodecError> {
    let prepared = prepare_for(buffer, format, lossless);
    if format == OutputFormat::WebP && !lossless {
        return encode_lossy_webp(&prepared, quality);
    }

    let (w, h) = prepared.dimensions();
    let color = color_type(prepared.mode());
    let px = prepared.pixels();
    let mut out = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut out, quality.value() as u8).write_image(px, w, h, color)
        }
        OutputFormat::Png => PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
            .write_image(px, w, h, color),
        OutputFormat::WebP => WebPEncoder::new_lossless(&mut out).write_image(px, w, h, color),
        OutputFormat::Bmp => BmpEncoder::new(&mut out).write_image(px, w, h, color),
        OutputFormat::Tiff => TiffEncoder::new(&mut out).write_image(px, w, h, color),
    };
    result.map_err(|e| CodecError::Encode(format!("{format}: {e}")))?;
    Ok(out.into_inner())
}

fn encode_lossy_webp(buffer: &ImageBuffer, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let (w, h) = buffer.dimensions();
    let encoder = match buffer.mode() {
        ColorMode::Rgb => webp::Encoder::from_rgb(buffer.pixels(), w, h),
        ColorMode::Rgba => webp::Encoder::from_rgba(buffer.pixels(), w, h),
        mode => {
            return Err(CodecError::Encode(format!("WebP: unexpected {mode:?} buffer")));
        }
    };
    let memory = encoder
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| CodecError::Encode(format!("WebP: {e:?}")))?;
    Ok(memory.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient;

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp"] {
            assert!(exts.contains(expected), "expected {expected} in supported extensions");
        }
    }

    fn heic_header_only() -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftypheic");
        bytes.extend_from_slice(&[0; 16]);
        bytes
    }

    #[test]
    fn heic_is_always_recognized() {
        assert!(is_recognized_image(Path::new("/photos/IMG_0001.HEIC")));
        assert!(is_heif(&heic_header_only()));
    }

    #[cfg(not(feature = "heic"))]
    #[test]
    fn heic_without_feature_is_unsupported() {
        assert!(!supported_input_extensions().contains(&"heic"));
        assert!(matches!(decode(&heic_header_only()), Err(CodecError::UnsupportedFormat(_))));
    }

    #[cfg(feature = "heic")]
    #[test]
    fn heic_with_feature_goes_to_libheif() {
        assert!(supported_input_extensions().contains(&"heic"));
        // A bare ftyp box has no image in it: a decode error, not "unsupported".
        assert!(matches!(decode(&heic_header_only()), Err(CodecError::Decode(_))));
    }

    #[test]
    fn text_files_are_not_images() {
        assert!(!is_recognized_image(Path::new("notes.txt")));
        assert!(!is_recognized_image(Path::new("no_extension")));
    }

    #[test]
    fn decode_garbage_errors() {
        assert!(matches!(decode(b"definitely not an image"), Err(CodecError::Decode(_))));
    }

    #[test]
    fn png_roundtrip_is_lossless() {
        let img = gradient(17, 9, ColorMode::Rgba);
        let bytes = encode(&img, OutputFormat::Png, Quality::default()).unwrap();
        assert_eq!(detect_format(&bytes), Some(ImageFormat::Png));
        assert_eq!(decode(&bytes).unwrap(), img);
    }

    #[test]
    fn jpeg_flattens_alpha_and_keeps_dimensions() {
        let img = gradient(40, 30, ColorMode::Rgba);
        let bytes = encode(&img, OutputFormat::Jpeg, Quality::new(85).unwrap()).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.dimensions(), (40, 30));
        assert_eq!(back.mode(), ColorMode::Rgb);
    }

    #[test]
    fn only_jpeg_and_webp_are_lossy() {
        let lossy: Vec<OutputFormat> = OutputFormat::ALL.into_iter().filter(|f| f.is_lossy()).collect();
        assert_eq!(lossy, vec![OutputFormat::Jpeg, OutputFormat::WebP]);
    }

    #[test]
    fn jpeg_quality_affects_size() {
        let img = gradient(64, 64, ColorMode::Rgb);
        let low = encode(&img, OutputFormat::Jpeg, Quality::new(10).unwrap()).unwrap();
        let high = encode(&img, OutputFormat::Jpeg, Quality::new(100).unwrap()).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn webp_quality_affects_size() {
        let img = gradient(256, 256, ColorMode::Rgb);
        let low = encode(&img, OutputFormat::WebP, Quality::new(10).unwrap()).unwrap();
        let high = encode(&img, OutputFormat::WebP, Quality::new(100).unwrap()).unwrap();
        assert_eq!(detect_format(&low), Some(ImageFormat::WebP));
        assert!(low.len() < high.len(), "q10 {} bytes, q100 {} bytes", low.len(), high.len());
    }

    #[test]
    fn lossless_webp_roundtrips_exactly() {
        let img = gradient(33, 21, ColorMode::Rgba);
        let bytes = encode_with(&img, OutputFormat::WebP, Quality::new(10).unwrap(), true).unwrap();
        assert_eq!(decode(&bytes).unwrap(), img);
    }

    #[test]
    fn lossy_webp_keeps_alpha() {
        let img = gradient(16, 16, ColorMode::GrayAlpha);
        let bytes = encode(&img, OutputFormat::WebP, Quality::new(80).unwrap()).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.dimensions(), (16, 16));
        assert_eq!(back.mode(), ColorMode::Rgba);
    }

    #[test]
    fn png_uses_best_compression() {
        let img = gradient(128, 128, ColorMode::Rgb);
        let best = encode(&img, OutputFormat::Png, Quality::default()).unwrap();
        let mut fast = Cursor::new(Vec::new());
        PngEncoder::new_with_quality(&mut fast, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.pixels(), 128, 128, ExtendedColorType::Rgb8)
            .unwrap();
        assert!(best.len() <= fast.into_inner().len());
    }

    #[test]
    fn every_output_format_encodes_and_decodes() {
        for mode in [ColorMode::Gray, ColorMode::GrayAlpha, ColorMode::Rgb, ColorMode::Rgba] {
            let img = gradient(12, 8, mode);
            for format in OutputFormat::ALL {
                let bytes = encode(&img, format, Quality::default())
                    .unwrap_or_else(|e| panic!("{format} {mode:?}: {e}"));
                let back = decode(&bytes).unwrap_or_else(|e| panic!("{format} {mode:?}: {e}"));
                assert_eq!(back.dimensions(), (12, 8), "{format} {mode:?}");
            }
        }
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("JPEG".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("tif".parse::<OutputFormat>(), Ok(OutputFormat::Tiff));
        assert!("heic".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::from_path(Path::new("a/b.WEBP")), Some(OutputFormat::WebP));
    }

    #[test]
    fn read_image_missing_file_is_io_error() {
        let err = read_image(Path::new("/nonexistent/image.png")).unwrap_err();
        assert!(matches!(err, ReadError::Io { .. }));
    }
}
