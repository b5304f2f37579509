//! # Image Master
//!
//! Image transformation toolkit: an interactive crop/rotate/flip editor with
//! undo, a preview thumbnail cache, and a batch pipeline that applies one
//! operation (resize, recompress, convert, crop, background removal, base64)
//! to many files in parallel.
//!
//! # Architecture
//!
//! Two front doors share one imaging core:
//!
//! ```text
//! edit      CropSession ──► TransformStack ──► imaging::transform
//!               │                                    │
//!               └────────── save ──► imaging::codec ─┴─► persist
//!
//! batch     scan ──► plan_jobs ──► BatchPipeline ──► imaging::* ──► persist
//!                                       │
//!                                       └─► ProgressEvent ──► output
//! ```
//!
//! The interactive side is single-owner and synchronous. The batch side runs
//! a bounded rayon pool; the [`cache::ThumbnailCache`] is the only structure
//! shared between threads.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Pixel buffers, codecs, rotate/flip/crop, resize, background compositing |
//! | [`geometry`] | Selection rectangles: drags, handles, aspect presets, clamping |
//! | [`history`] | Undoable transform history over one image |
//! | [`session`] | `CropSession` state machine driving selection, transforms and save |
//! | [`edit`] | Scripted edit steps for driving a session from the command line |
//! | [`cache`] | Bounded LRU cache of preview bitmaps |
//! | [`batch`] | Parallel batch pipeline with cancellation and progress |
//! | [`types`] | Jobs, statuses, progress events and reports shared by batch and CLI |
//! | [`naming`] | Output filenames and collision suffixes |
//! | [`encoding`] | Base64 wrappers (TXT, JSON, HTML data URI) |
//! | [`scan`] | Input discovery: files and directories |
//! | [`persist`] | Atomic temp-file-and-rename writes |
//! | [`config`] | `image-master.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Whole-Buffer History
//!
//! Each history entry keeps the image it produced, so undo is a pop rather
//! than a replay. Editing sessions are short and single-image; memory is
//! bounded by the number of steps a person actually takes.
//!
//! ## Deterministic Collision Handling
//!
//! Output names are settled for the whole batch before any worker starts,
//! in job-id order. Re-running the same batch produces the same files no
//! matter how the scheduler interleaves workers.
//!
//! ## Pure-Rust Codecs
//!
//! Decoding and encoding go through the `image` crate with only pure-Rust
//! codecs enabled, so the binary has no system dependencies. HEIC/HEIF files
//! are recognized and reported as unsupported instead of being silently
//! skipped.

pub mod batch;
pub mod cache;
pub mod config;
pub mod edit;
pub mod encoding;
pub mod geometry;
pub mod history;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod persist;
pub mod scan;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
