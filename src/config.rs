//! Application configuration.
//!
//! Handles loading, validating, and merging TOML config files. Stock defaults
//! are serialized to a [`toml::Value`], the user's file is merged on top, and
//! the result is deserialized and validated.
//!
//! ## Config File Location
//!
//! `--config <path>` names a file explicitly. Without it, `image-master.toml`
//! in the current directory is used when present. No file means stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [crop]
//! min_size = 10.0           # Smallest selection edge, in image pixels
//! handle_tolerance = 8.0    # Grab distance for selection handles
//!
//! [thumbnails]
//! max_dimension = 120       # Longest side of a preview
//! max_entries = 256         # Cached previews kept in memory
//! max_bytes = 67108864      # Pixel bytes kept in memory (64 MiB)
//!
//! [processing]
//! # max_processes = 4       # Max parallel workers (omit for auto = CPU cores)
//!
//! [output]
//! quality = 90              # Lossy encoding quality (1-100)
//! collision = "suffix"      # "suffix" (photo_1.jpg) or "overwrite"
//! recursive = false         # Descend into subdirectories of input folders
//!
//! [background]
//! tolerance = 24            # Corner-key color distance treated as background
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override only the values you need:
//!
//! ```toml
//! [output]
//! quality = 75
//! ```

use crate::imaging::{InvalidQuality, Quality};
use crate::naming::CollisionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Looked up in the current directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "image-master.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Application configuration.
///
/// Every key has a default, so a user file lists only what it changes.
/// Unknown keys are an error rather than silently ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Interactive crop settings.
    pub crop: CropConfig,
    /// Preview cache settings.
    pub thumbnails: ThumbnailsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Output encoding and naming.
    pub output: OutputConfig,
    /// Built-in background remover settings.
    pub background: BackgroundConfig,
}

impl AppConfig {
    /// Reject values the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.crop.min_size.is_finite() && self.crop.min_size > 0.0) {
            return Err(ConfigError::Validation(
                "crop.min_size must be a positive number".into(),
            ));
        }
        if !(self.crop.handle_tolerance.is_finite() && self.crop.handle_tolerance >= 0.0) {
            return Err(ConfigError::Validation(
                "crop.handle_tolerance must not be negative".into(),
            ));
        }
        if self.thumbnails.max_entries == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_entries must be at least 1".into(),
            ));
        }
        if self.thumbnails.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_bytes must be at least 1".into(),
            ));
        }
        if self.thumbnails.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_dimension must be at least 1".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        self.output
            .quality()
            .map_err(|e| ConfigError::Validation(format!("output.quality: {e}")))?;
        Ok(())
    }
}

/// Interactive crop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    pub min_size: f64,
    pub handle_tolerance: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            min_size: crate::geometry::DEFAULT_MIN_SIZE,
            handle_tolerance: crate::session::DEFAULT_HANDLE_TOLERANCE,
        }
    }
}

/// Preview cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub max_dimension: u32,
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            max_dimension: 120,
            max_entries: 256,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Upper bound on batch workers. Unset means one per core; larger
    /// values are capped at the core count.
    pub max_processes: Option<usize>,
}

/// Worker count for batch runs: `max_processes` capped at the core count,
/// or every core when unset. Never zero.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    config.max_processes.map_or(cores, |n| n.min(cores)).max(1)
}

/// Output encoding and naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Lossy quality, 1-100. Kept as a plain integer so a bad value is
    /// reported by [`AppConfig::validate`] with its key name.
    pub quality: u32,
    pub collision: CollisionPolicy,
    pub recursive: bool,
}

impl OutputConfig {
    pub fn quality(&self) -> Result<Quality, InvalidQuality> {
        Quality::new(self.quality)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            collision: CollisionPolicy::Suffix,
            recursive: false,
        }
    }
}

/// Built-in background remover settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundConfig {
    pub tolerance: u8,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            tolerance: crate::imaging::CornerKeyRemover::default().tolerance,
        }
    }
}

/// Stock defaults as a TOML table: the bottom layer every user file is merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Deep-merge `overlay` onto `base`.
///
/// Tables merge per key and recurse; any other overlay value replaces the
/// base value outright. Base keys absent from the overlay survive.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    let toml::Value::Table(layer) = overlay else {
        return overlay;
    };
    let toml::Value::Table(mut merged) = base else {
        return toml::Value::Table(layer);
    };
    for (key, value) in layer {
        let value = match merged.remove(&key) {
            Some(existing) => merge_toml(existing, value),
            None => value,
        };
        merged.insert(key, value);
    }
    toml::Value::Table(merged)
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Apply `overlay` (if any) to `base`, then deserialize and validate the result.
pub fn resolve_config(base: toml::Value, overlay: Option<toml::Value>) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] in the
/// current directory is used if present.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let overlay = match explicit {
        Some(path) => {
            let value = load_raw_config(path)?;
            if value.is_none() {
                return Err(ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("config file not found: {}", path.display()),
                )));
            }
            value
        }
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# image-master configuration
# ==========================
#
# Save as image-master.toml in the working directory, or pass --config <file>.
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.

# ---------------------------------------------------------------------------
# Interactive cropping (edit command)
# ---------------------------------------------------------------------------
[crop]
# Smallest selection edge, in image pixels. Must be positive.
min_size = 10.0
# How close (in image pixels) the pointer must be to grab a handle.
handle_tolerance = 8.0

# ---------------------------------------------------------------------------
# Preview thumbnails
# ---------------------------------------------------------------------------
[thumbnails]
# Longest side of a generated preview. Previews never upscale.
max_dimension = 120
# Maximum number of previews kept in memory.
max_entries = 256
# Maximum pixel bytes kept in memory (64 MiB).
max_bytes = 67108864

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of parallel image workers.
# Omit to use all CPU cores. Larger values are clamped to the core count.
# max_processes = 4

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Lossy encoding quality (1-100). Used by JPEG; lossless formats ignore it.
quality = 90
# When an output file already exists:
#   "suffix"    - write photo_resized_1.jpg, photo_resized_2.jpg, ...
#   "overwrite" - replace the existing file
collision = "suffix"
# Descend into subdirectories when an input is a directory.
recursive = false

# ---------------------------------------------------------------------------
# Background removal
# ---------------------------------------------------------------------------
[background]
# Largest per-channel difference from the corner color that still counts as
# background (0-255).
tolerance = 24
"##
}
