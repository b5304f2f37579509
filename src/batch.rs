//! Batch processing.
//!
//! Applies one [`OperationSpec`] to many files. Each job runs the same short
//! pipeline:
//!
//! ```text
//! read → decode → apply operation → encode → atomic write → invalidate cache
//! ```
//!
//! Base64 jobs skip the image steps and wrap the raw file bytes instead.
//!
//! ## Workers
//!
//! A dedicated [rayon](https://docs.rs/rayon) pool with `min(max_parallel, N)`
//! threads pulls job indices from a shared atomic cursor, so no job is ever
//! dispatched twice and concurrency never exceeds `max_parallel`. The
//! [`CancelToken`] is checked before each index is taken: jobs already running
//! finish, everything left over ends [`JobStatus::Cancelled`].
//!
//! ## Progress
//!
//! One [`ProgressEvent`] is sent per finished job. The completed counter is
//! bumped and the event sent while holding the same lock, so receivers see
//! `completed_count` go 1, 2, … N in delivery order. Cancelled jobs send
//! nothing.
//!
//! ## Failures
//!
//! A job that fails records [`JobStatus::Failed`] and the batch moves on.
//! A panic inside a job (a plug-in remover, a codec) is caught at the job
//! boundary and recorded as [`JobFailure::Other`]. Only setup problems (zero
//! parallelism, pool creation) fail the whole `run`.

use crate::cache::ThumbnailCache;
use crate::config::{AppConfig, effective_threads};
use crate::encoding;
use crate::imaging::background::composite;
use crate::imaging::operations::resize;
use crate::imaging::transform::crop;
use crate::imaging::{BackgroundRemover, CornerKeyRemover, ImageBuffer, ReadError, encode_with, read_image};
use crate::naming::{CollisionPolicy, output_file_name, output_format, resolve_collisions};
use crate::persist::{write_atomic, write_new};
use crate::types::{BatchJob, BatchReport, JobFailure, JobStatus, OperationSpec, ProgressEvent};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("max_parallel must be at least 1")]
    InvalidParallelism,
    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

/// Settings for a [`BatchPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_parallel: usize,
    pub collision: CollisionPolicy,
}

impl BatchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_parallel: effective_threads(&config.processing),
            collision: config.output.collision,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build one job per input, writing into `output_dir`.
///
/// Output names follow [`output_file_name`]; collisions are left for
/// [`BatchPipeline::run`] to resolve.
pub fn plan_jobs(inputs: &[PathBuf], output_dir: &Path, operation: &OperationSpec) -> Vec<BatchJob> {
    inputs
        .iter()
        .enumerate()
        .map(|(id, input)| {
            let output = output_dir.join(output_file_name(input, operation));
            BatchJob::new(id, input.clone(), output, operation.clone())
        })
        .collect()
}

struct Progress {
    completed: usize,
    sink: Option<Sender<ProgressEvent>>,
}

pub struct BatchPipeline {
    config: BatchConfig,
    remover: Arc<dyn BackgroundRemover>,
    cache: Option<Arc<ThumbnailCache>>,
}

impl BatchPipeline {
    /// Pipeline using the built-in [`CornerKeyRemover`] for background jobs.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            remover: Arc::new(CornerKeyRemover::default()),
            cache: None,
        }
    }

    pub fn with_remover(mut self, remover: Arc<dyn BackgroundRemover>) -> Self {
        self.remover = remover;
        self
    }

    /// Thumbnails of every written output are dropped from `cache`.
    pub fn with_cache(mut self, cache: Arc<ThumbnailCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run every job to a terminal status.
    ///
    /// Returns the jobs in id order with their final output paths.
    pub fn run(
        &self,
        mut jobs: Vec<BatchJob>,
        cancel: &CancelToken,
        progress: Option<Sender<ProgressEvent>>,
    ) -> Result<BatchReport, BatchError> {
        if self.config.max_parallel == 0 {
            return Err(BatchError::InvalidParallelism);
        }
        resolve_collisions(&mut jobs, self.config.collision);
        jobs.sort_by_key(|j| j.id);

        let total = jobs.len();
        if total == 0 {
            return Ok(BatchReport::from_jobs(jobs));
        }
        let workers = self.config.max_parallel.min(total);
        log::info!("starting batch of {total} jobs on {workers} workers");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("batch-worker-{i}"))
            .build()
            .map_err(|e| BatchError::ThreadPool(e.to_string()))?;

        let cursor = AtomicUsize::new(0);
        let statuses = Mutex::new(vec![JobStatus::Pending; total]);
        let progress = Mutex::new(Progress {
            completed: 0,
            sink: progress,
        });

        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(job) = jobs.get(index) else {
                            break;
                        };
                        set_status(&statuses, index, JobStatus::Running);
                        log::debug!("job {} dispatched: {}", job.id, job.input_path.display());

                        let status = match self.execute_guarded(job) {
                            Ok(()) => JobStatus::Succeeded,
                            Err(failure) => {
                                log::warn!("job {} ({}) failed: {failure}", job.id, job.input_path.display());
                                JobStatus::Failed(failure)
                            }
                        };
                        set_status(&statuses, index, status.clone());
                        report_progress(&progress, job, status, total);
                    }
                });
            }
        });

        let statuses = statuses.into_inner().unwrap_or_else(|p| p.into_inner());
        for (job, status) in jobs.iter_mut().zip(statuses) {
            job.status = match status {
                JobStatus::Pending => JobStatus::Cancelled,
                terminal => terminal,
            };
        }

        let report = BatchReport::from_jobs(jobs);
        log::info!(
            "batch finished: {} succeeded, {} failed, {} cancelled",
            report.succeeded,
            report.failed,
            report.cancelled
        );
        Ok(report)
    }

    /// [`execute`](Self::execute) with panics turned into a job failure.
    ///
    /// Jobs share nothing but the status and progress mutexes, which recover
    /// from poisoning, so continuing after an unwind is sound.
    fn execute_guarded(&self, job: &BatchJob) -> Result<(), JobFailure> {
        catch_unwind(AssertUnwindSafe(|| self.execute(job)))
            .unwrap_or_else(|payload| Err(JobFailure::Other(format!("job panicked: {}", panic_message(&*payload)))))
    }

    fn execute(&self, job: &BatchJob) -> Result<(), JobFailure> {
        let bytes = match &job.operation {
            OperationSpec::EncodeBase64 { wrapper } => {
                let raw = std::fs::read(&job.input_path).map_err(|e| {
                    JobFailure::UnreadableImage(format!("cannot read {}: {e}", job.input_path.display()))
                })?;
                let filename = job
                    .input_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                encoding::wrap(&raw, &filename, *wrapper).into_bytes()
            }
            operation => {
                let image = read_image(&job.input_path).map_err(read_failure)?;
                let processed = self.apply(operation, image)?;
                let format = output_format(&job.input_path, operation);
                encode_with(&processed, format, operation.quality(), operation.lossless())
                    .map_err(|e| JobFailure::Encode(e.to_string()))?
            }
        };

        if let Some(parent) = job.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| JobFailure::Write(format!("cannot create {}: {e}", parent.display())))?;
        }
        let written = match self.config.collision {
            CollisionPolicy::Suffix => write_new(&job.output_path, &bytes),
            CollisionPolicy::Overwrite => write_atomic(&job.output_path, &bytes),
        };
        written.map_err(|e| JobFailure::Write(e.to_string()))?;

        if let Some(cache) = &self.cache {
            cache.invalidate(&job.output_path);
        }
        Ok(())
    }

    fn apply(&self, operation: &OperationSpec, image: ImageBuffer) -> Result<ImageBuffer, JobFailure> {
        match operation {
            OperationSpec::Resize { resize: params, .. } => Ok(resize(&image, params)),
            OperationSpec::Compress { .. } | OperationSpec::Convert { .. } => Ok(image),
            OperationSpec::Crop {
                x, y, width, height, ..
            } => crop(&image, *x as f64, *y as f64, *width as f64, *height as f64)
                .map_err(|e| JobFailure::Other(e.to_string())),
            OperationSpec::RemoveBackground { background, .. } => {
                let mask = self
                    .remover
                    .remove_background(&image)
                    .map_err(|e| JobFailure::Other(e.to_string()))?;
                let backdrop = background
                    .resolve(image.width(), image.height())
                    .map_err(|e| JobFailure::Other(e.to_string()))?;
                composite(&image, &mask, &backdrop).map_err(|e| JobFailure::Other(e.to_string()))
            }
            // Handled before decoding.
            OperationSpec::EncodeBase64 { .. } => Ok(image),
        }
    }
}

fn read_failure(error: ReadError) -> JobFailure {
    match error {
        ReadError::Io { .. } => JobFailure::UnreadableImage(error.to_string()),
        ReadError::Codec { .. } => JobFailure::Decode(error.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn set_status(statuses: &Mutex<Vec<JobStatus>>, index: usize, status: JobStatus) {
    let mut guard = statuses.lock().unwrap_or_else(|p| p.into_inner());
    guard[index] = status;
}

fn report_progress(progress: &Mutex<Progress>, job: &BatchJob, status: JobStatus, total: usize) {
    let mut guard = progress.lock().unwrap_or_else(|p| p.into_inner());
    guard.completed += 1;
    let event = ProgressEvent {
        job_id: job.id,
        input_path: job.input_path.clone(),
        output_path: job.output_path.clone(),
        status,
        completed_count: guard.completed,
        total_count: total,
    };
    // A dropped receiver only means nobody is listening.
    let delivered = match &guard.sink {
        Some(sink) => sink.send(event).is_ok(),
        None => true,
    };
    if !delivered {
        guard.sink = None;
    }
}
