//! Shared batch types.
//!
//! These are produced by the CLI (or any front end), consumed by the
//! [`batch`](crate::batch) pipeline, and serialized into JSON reports, so they
//! must stay identical across all three.

use crate::encoding::Base64Wrapper;
use crate::imaging::{Background, OutputFormat, Quality, ResizeParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The one operation a batch applies to every input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationSpec {
    Resize {
        resize: ResizeParams,
        format: Option<OutputFormat>,
        quality: Quality,
    },
    Compress {
        quality: Quality,
        format: Option<OutputFormat>,
        /// WebP only: encode losslessly, ignoring `quality`.
        #[serde(default)]
        lossless: bool,
    },
    Convert {
        format: OutputFormat,
        quality: Quality,
        #[serde(default)]
        lossless: bool,
    },
    /// Fixed pixel rectangle, clamped to each image.
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: Option<OutputFormat>,
        quality: Quality,
    },
    RemoveBackground {
        background: Background,
        format: Option<OutputFormat>,
    },
    EncodeBase64 {
        wrapper: Base64Wrapper,
    },
}

impl OperationSpec {
    /// Filename suffix marking outputs of this operation (`photo_resized.jpg`).
    /// Conversions and base64 change the extension instead.
    pub fn filename_suffix(&self) -> Option<&'static str> {
        match self {
            OperationSpec::Resize { .. } => Some("resized"),
            OperationSpec::Compress { .. } => Some("compressed"),
            OperationSpec::Crop { .. } => Some("cropped"),
            OperationSpec::RemoveBackground { .. } => Some("nobg"),
            OperationSpec::Convert { .. } | OperationSpec::EncodeBase64 { .. } => None,
        }
    }

    /// Requested image format, if the operation fixes one.
    pub fn requested_format(&self) -> Option<OutputFormat> {
        match self {
            OperationSpec::Resize { format, .. }
            | OperationSpec::Compress { format, .. }
            | OperationSpec::Crop { format, .. } => *format,
            OperationSpec::Convert { format, .. } => Some(*format),
            OperationSpec::RemoveBackground { background, format } => {
                // Transparency only survives in PNG.
                if background.is_transparent() {
                    Some(OutputFormat::Png)
                } else {
                    *format
                }
            }
            OperationSpec::EncodeBase64 { .. } => None,
        }
    }

    pub fn quality(&self) -> Quality {
        match self {
            OperationSpec::Resize { quality, .. }
            | OperationSpec::Compress { quality, .. }
            | OperationSpec::Convert { quality, .. }
            | OperationSpec::Crop { quality, .. } => *quality,
            OperationSpec::RemoveBackground { .. } | OperationSpec::EncodeBase64 { .. } => {
                Quality::default()
            }
        }
    }

    /// Whether WebP output should be lossless.
    pub fn lossless(&self) -> bool {
        match self {
            OperationSpec::Compress { lossless, .. } | OperationSpec::Convert { lossless, .. } => *lossless,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationSpec::Resize { .. } => "resize",
            OperationSpec::Compress { .. } => "compress",
            OperationSpec::Convert { .. } => "convert",
            OperationSpec::Crop { .. } => "crop",
            OperationSpec::RemoveBackground { .. } => "remove background",
            OperationSpec::EncodeBase64 { .. } => "base64",
        }
    }
}

/// Why a single job failed. Siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("unreadable image: {0}")]
    UnreadableImage(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "failure", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed(JobFailure),
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "ok"),
            JobStatus::Failed(reason) => write!(f, "failed: {reason}"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One input file and where its result goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: usize,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub operation: OperationSpec,
    pub status: JobStatus,
}

impl BatchJob {
    pub fn new(id: usize, input_path: PathBuf, output_path: PathBuf, operation: OperationSpec) -> Self {
        Self {
            id,
            input_path,
            output_path,
            operation,
            status: JobStatus::Pending,
        }
    }
}

/// Sent once per finished job, in completion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub job_id: usize,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub status: JobStatus,
    pub completed_count: usize,
    pub total_count: usize,
}

/// Outcome of a whole batch, jobs in id order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub jobs: Vec<BatchJob>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn from_jobs(jobs: Vec<BatchJob>) -> Self {
        let count = |pred: fn(&JobStatus) -> bool| jobs.iter().filter(|j| pred(&j.status)).count();
        let succeeded = count(|s| matches!(s, JobStatus::Succeeded));
        let failed = count(|s| matches!(s, JobStatus::Failed(_)));
        let cancelled = count(|s| matches!(s, JobStatus::Cancelled));
        Self {
            jobs,
            succeeded,
            failed,
            cancelled,
        }
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&BatchJob, &JobFailure)> {
        self.jobs.iter().filter_map(|j| match &j.status {
            JobStatus::Failed(reason) => Some((j, reason)),
            _ => None,
        })
    }
}
