//! Batch pipeline behavior under real worker threads.

use image_master::batch::{BatchConfig, BatchError, BatchPipeline, CancelToken, plan_jobs};
use image_master::imaging::{
    Background, BackgroundError, BackgroundRemover, ColorMode, ImageBuffer, Mask, OutputFormat, Quality,
    ResizeParams, encode, read_image,
};
use image_master::naming::CollisionPolicy;
use image_master::types::{JobFailure, JobStatus, OperationSpec, ProgressEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tempfile::TempDir;

fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
    let img = ImageBuffer::from_fn(w, h, ColorMode::Rgb, |x, y| {
        [(x * 3 % 256) as u8, (y * 5 % 256) as u8, 128, 255]
    })
    .unwrap();
    let path = dir.join(name);
    std::fs::write(&path, encode(&img, OutputFormat::Png, Quality::default()).unwrap()).unwrap();
    path
}

fn pipeline(max_parallel: usize) -> BatchPipeline {
    BatchPipeline::new(BatchConfig {
        max_parallel,
        collision: CollisionPolicy::Suffix,
    })
}

fn remove_bg() -> OperationSpec {
    OperationSpec::RemoveBackground {
        background: Background::Transparent,
        format: None,
    }
}

/// Keeps every pixel and records how many calls overlap.
#[derive(Default)]
struct ConcurrencyTracker {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl BackgroundRemover for ConcurrencyTracker {
    fn remove_background(&self, image: &ImageBuffer) -> Result<Mask, BackgroundError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Mask::opaque(image.width(), image.height()))
    }
}

/// Cancels the batch from inside the first job.
struct CancelOnFirstCall {
    token: CancelToken,
}

impl BackgroundRemover for CancelOnFirstCall {
    fn remove_background(&self, image: &ImageBuffer) -> Result<Mask, BackgroundError> {
        self.token.cancel();
        Ok(Mask::opaque(image.width(), image.height()))
    }
}

/// Panics on images exactly `width` pixels wide.
struct PanicsOnWidth {
    width: u32,
}

impl BackgroundRemover for PanicsOnWidth {
    fn remove_background(&self, image: &ImageBuffer) -> Result<Mask, BackgroundError> {
        if image.width() == self.width {
            panic!("segmentation model crashed on {}px input", self.width);
        }
        Ok(Mask::opaque(image.width(), image.height()))
    }
}

#[test]
fn mixed_batch_reports_every_job_in_order() {
    let tmp = TempDir::new().unwrap();
    let inputs = vec![
        write_png(tmp.path(), "a.png", 40, 20),
        tmp.path().join("missing1.png"),
        write_png(tmp.path(), "b.png", 30, 30),
        tmp.path().join("missing2.jpg"),
        write_png(tmp.path(), "c.png", 20, 40),
    ];
    let op = OperationSpec::Resize {
        resize: ResizeParams {
            width: Some(10),
            height: Some(10),
            ..ResizeParams::default()
        },
        format: Some(OutputFormat::Jpeg),
        quality: Quality::new(80).unwrap(),
    };
    let out_dir = tmp.path().join("out");
    let (tx, rx) = mpsc::channel();
    let report = pipeline(2)
        .run(plan_jobs(&inputs, &out_dir, &op), &CancelToken::new(), Some(tx))
        .unwrap();

    let events: Vec<ProgressEvent> = rx.iter().collect();
    assert_eq!(events.iter().map(|e| e.completed_count).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    let mut ids: Vec<usize> = events.iter().map(|e| e.job_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    assert_eq!((report.succeeded, report.failed, report.cancelled), (3, 2, 0));
    for id in [1, 3] {
        assert!(matches!(
            report.jobs[id].status,
            JobStatus::Failed(JobFailure::UnreadableImage(_))
        ));
    }
    assert_eq!(read_image(&out_dir.join("a_resized.jpg")).unwrap().dimensions(), (10, 5));
    assert_eq!(read_image(&out_dir.join("c_resized.jpg")).unwrap().dimensions(), (5, 10));
}

#[test]
fn panicking_job_fails_alone() {
    let tmp = TempDir::new().unwrap();
    let inputs = vec![
        write_png(tmp.path(), "a.png", 8, 8),
        write_png(tmp.path(), "b.png", 9, 8),
        write_png(tmp.path(), "c.png", 10, 8),
    ];
    let (tx, rx) = mpsc::channel();
    let report = pipeline(1)
        .with_remover(Arc::new(PanicsOnWidth { width: 9 }))
        .run(plan_jobs(&inputs, &tmp.path().join("out"), &remove_bg()), &CancelToken::new(), Some(tx))
        .unwrap();

    assert_eq!((report.succeeded, report.failed, report.cancelled), (2, 1, 0));
    match &report.jobs[1].status {
        JobStatus::Failed(JobFailure::Other(reason)) => {
            assert!(reason.contains("job panicked"), "{reason}");
            assert!(reason.contains("9px"), "{reason}");
        }
        other => panic!("expected a failed job, got {other:?}"),
    }
    assert!(!tmp.path().join("out/b_nobg.png").exists());
    assert!(tmp.path().join("out/c_nobg.png").exists());

    let events: Vec<ProgressEvent> = rx.iter().collect();
    assert_eq!(events.iter().map(|e| e.completed_count).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn concurrency_never_exceeds_max_parallel() {
    let tmp = TempDir::new().unwrap();
    let inputs: Vec<PathBuf> = (0..8)
        .map(|i| write_png(tmp.path(), &format!("img{i}.png"), 8, 8))
        .collect();
    let tracker = Arc::new(ConcurrencyTracker::default());
    let report = pipeline(3)
        .with_remover(tracker.clone())
        .run(plan_jobs(&inputs, &tmp.path().join("out"), &remove_bg()), &CancelToken::new(), None)
        .unwrap();

    assert_eq!(report.succeeded, 8);
    assert_eq!(tracker.calls.load(Ordering::SeqCst), 8);
    let peak = tracker.peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak concurrency {peak}");
}

#[test]
fn cancel_mid_batch_finishes_running_job_only() {
    let tmp = TempDir::new().unwrap();
    let inputs: Vec<PathBuf> = (0..4)
        .map(|i| write_png(tmp.path(), &format!("img{i}.png"), 8, 8))
        .collect();
    let token = CancelToken::new();
    let remover = Arc::new(CancelOnFirstCall { token: token.clone() });
    let (tx, rx) = mpsc::channel();
    let report = pipeline(1)
        .with_remover(remover)
        .run(plan_jobs(&inputs, &tmp.path().join("out"), &remove_bg()), &token, Some(tx))
        .unwrap();

    assert_eq!(report.jobs[0].status, JobStatus::Succeeded);
    assert!(report.jobs[1..].iter().all(|j| j.status == JobStatus::Cancelled));
    let events: Vec<ProgressEvent> = rx.iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].completed_count, 1);
    assert!(!tmp.path().join("out/img1_nobg.png").exists());
}

#[test]
fn cancel_before_start_cancels_everything() {
    let tmp = TempDir::new().unwrap();
    let inputs: Vec<PathBuf> = (0..3)
        .map(|i| write_png(tmp.path(), &format!("img{i}.png"), 8, 8))
        .collect();
    let token = CancelToken::new();
    token.cancel();
    let (tx, rx) = mpsc::channel();
    let report = pipeline(4)
        .run(plan_jobs(&inputs, tmp.path(), &remove_bg()), &token, Some(tx))
        .unwrap();

    assert_eq!(report.cancelled, 3);
    assert_eq!(rx.iter().count(), 0);
}

#[test]
fn zero_parallelism_is_a_setup_error() {
    let tmp = TempDir::new().unwrap();
    let input = write_png(tmp.path(), "a.png", 8, 8);
    let err = pipeline(0)
        .run(plan_jobs(&[input], tmp.path(), &remove_bg()), &CancelToken::new(), None)
        .unwrap_err();
    assert_eq!(err, BatchError::InvalidParallelism);
}

#[test]
fn duplicate_targets_are_suffixed_by_job_id() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir(&src).unwrap();
    let a = write_png(&src, "photo.png", 8, 8);
    let other = tmp.path().join("other");
    std::fs::create_dir(&other).unwrap();
    let b = write_png(&other, "photo.png", 16, 16);

    let op = OperationSpec::Compress {
        quality: Quality::default(),
        format: None,
        lossless: false,
    };
    let out = tmp.path().join("out");
    let report = pipeline(2)
        .run(plan_jobs(&[a, b], &out, &op), &CancelToken::new(), None)
        .unwrap();

    assert_eq!(report.jobs[0].output_path, out.join("photo_compressed.png"));
    assert_eq!(report.jobs[1].output_path, out.join("photo_compressed_1.png"));
    assert_eq!(read_image(&report.jobs[1].output_path).unwrap().dimensions(), (16, 16));
}
