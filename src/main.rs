use clap::{Parser, Subcommand};
use image_master::batch::{BatchConfig, BatchPipeline, CancelToken, plan_jobs};
use image_master::cache::ThumbnailCache;
use image_master::config::{self, AppConfig, ProcessingConfig};
use image_master::edit::{EditStep, run_steps};
use image_master::encoding::{self, Base64Wrapper};
use image_master::imaging::{
    Background, CornerKeyRemover, OutputFormat, Quality, RESIZE_PRESETS, ResizeParams, ResizePreset, encode,
};
use image_master::naming::{CollisionPolicy, unique_path};
use image_master::session::CropSession;
use image_master::types::OperationSpec;
use image_master::{output, persist, scan};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "image-master")]
#[command(about = "Batch and interactive image transformation")]
#[command(long_about = "\
Batch and interactive image transformation

Batch commands apply one operation to every input. Inputs may be files or
directories; directories contain every recognized image (add --recursive to
descend). Outputs are named after their inputs:

  resize     photo.jpg  → photo_resized.jpg
  compress   photo.jpg  → photo_compressed.jpg
  crop       photo.jpg  → photo_cropped.jpg
  remove-bg  photo.jpg  → photo_nobg.png
  convert    photo.png  → photo.webp
  base64-encode logo.png → logo.txt / logo.json / logo.html

Existing files are never replaced unless --overwrite is given; a counter is
added instead (photo_resized_1.jpg).

The edit command runs a scripted cropping session over a single image:

  image-master edit photo.jpg --step aspect=1:1 --step crop --out square.jpg

Run 'image-master gen-config' to generate a documented image-master.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./image-master.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for batch outputs
    #[arg(short = 'o', long, default_value = ".", global = true)]
    output_dir: PathBuf,

    /// Replace existing output files instead of adding a counter
    #[arg(long, global = true)]
    overwrite: bool,

    /// Maximum parallel workers (default: config, then CPU cores)
    #[arg(short = 'j', long, global = true)]
    jobs: Option<usize>,

    /// Write the batch report as JSON to this file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Shared input flags for batch commands.
#[derive(clap::Args, Clone)]
struct InputArgs {
    /// Image files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Descend into subdirectories of input directories
    #[arg(short, long)]
    recursive: bool,
}

/// Shared encoding flags.
#[derive(clap::Args, Clone)]
struct EncodeArgs {
    /// Output format (default: same as the source)
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Lossy quality, 1-100 (default: config)
    #[arg(short, long)]
    quality: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Scale images to fit within a box
    #[command(after_help = preset_help())]
    Resize {
        #[command(flatten)]
        input: InputArgs,
        /// Target width in pixels
        #[arg(long, conflicts_with = "preset")]
        width: Option<u32>,
        /// Target height in pixels
        #[arg(long, conflicts_with = "preset")]
        height: Option<u32>,
        /// Named target box, e.g. full-hd or instagram-post (see below)
        #[arg(long)]
        preset: Option<ResizePreset>,
        /// Use the exact size, ignoring aspect ratio
        #[arg(long)]
        exact: bool,
        /// Allow output larger than the source
        #[arg(long)]
        allow_enlarge: bool,
        #[command(flatten)]
        encode: EncodeArgs,
    },
    /// Re-encode images at a given quality
    Compress {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        encode: EncodeArgs,
        /// Write WebP losslessly
        #[arg(long)]
        lossless: bool,
    },
    /// Change image format
    Convert {
        #[command(flatten)]
        input: InputArgs,
        /// Target format
        #[arg(short, long)]
        format: OutputFormat,
        /// Lossy quality, 1-100 (default: config)
        #[arg(short, long)]
        quality: Option<u32>,
        /// Write WebP losslessly
        #[arg(long)]
        lossless: bool,
    },
    /// Cut a fixed pixel rectangle, clamped to each image
    Crop {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value_t = 0)]
        x: u32,
        #[arg(long, default_value_t = 0)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[command(flatten)]
        encode: EncodeArgs,
    },
    /// Remove image backgrounds
    RemoveBg {
        #[command(flatten)]
        input: InputArgs,
        /// transparent, white, black, #rrggbb or image:<path>
        #[arg(long, default_value = "transparent", value_parser = Background::parse)]
        background: Background,
        /// Output format for opaque backgrounds (transparent always writes PNG)
        #[arg(short, long)]
        format: Option<OutputFormat>,
        /// Color distance keyed out as background (default: config)
        #[arg(long)]
        tolerance: Option<u8>,
    },
    /// Encode files as base64 text
    Base64Encode {
        #[command(flatten)]
        input: InputArgs,
        /// txt, json or html
        #[arg(short, long, default_value = "txt")]
        wrapper: Base64Wrapper,
    },
    /// Decode base64 text (bare, JSON or HTML wrapper) back into files
    Base64Decode {
        /// Text files produced by base64-encode
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Rotate, flip and crop a single image
    Edit {
        /// Image to edit
        input: PathBuf,
        /// Edit step, repeatable: rotate-left, rotate-right, flip-h, flip-v,
        /// aspect=W:H|free, drag=X1,Y1,X2,Y2, nudge=DX,DY, grow=DW,DH, crop, undo, redo
        #[arg(short, long = "step")]
        steps: Vec<EditStep>,
        /// Output file (default: <stem>_edited.<ext> in the output directory)
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        encode: EncodeArgs,
    },
    /// Generate preview thumbnails
    Thumbnail {
        #[command(flatten)]
        input: InputArgs,
        /// Longest side in pixels (default: config)
        #[arg(long)]
        size: Option<u32>,
    },
    /// Print a stock image-master.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut app_config = config::load_config(cli.config.as_deref())?;
    if let Some(jobs) = cli.jobs {
        app_config.processing = ProcessingConfig {
            max_processes: Some(jobs),
        };
    }
    if cli.overwrite {
        app_config.output.collision = CollisionPolicy::Overwrite;
    }
    let default_quality = app_config.output.quality;
    let quality = move |explicit: Option<u32>| Quality::new(explicit.unwrap_or(default_quality));

    let (input, operation) = match cli.command {
        Command::Resize {
            input,
            width,
            height,
            preset,
            exact,
            allow_enlarge,
            encode,
        } => (
            input,
            OperationSpec::Resize {
                resize: ResizeParams {
                    width: preset.map_or(width, |p| Some(p.width)),
                    height: preset.map_or(height, |p| Some(p.height)),
                    keep_aspect: !exact,
                    allow_enlarge,
                },
                format: encode.format,
                quality: quality(encode.quality)?,
            },
        ),
        Command::Compress {
            input,
            encode,
            lossless,
        } => (
            input,
            OperationSpec::Compress {
                quality: quality(encode.quality)?,
                format: encode.format,
                lossless,
            },
        ),
        Command::Convert {
            input,
            format,
            quality: q,
            lossless,
        } => (
            input,
            OperationSpec::Convert {
                format,
                quality: quality(q)?,
                lossless,
            },
        ),
        Command::Crop {
            input,
            x,
            y,
            width,
            height,
            encode,
        } => (
            input,
            OperationSpec::Crop {
                x,
                y,
                width,
                height,
                format: encode.format,
                quality: quality(encode.quality)?,
            },
        ),
        Command::RemoveBg {
            input,
            background,
            format,
            tolerance,
        } => {
            if let Some(tolerance) = tolerance {
                app_config.background.tolerance = tolerance;
            }
            (input, OperationSpec::RemoveBackground { background, format })
        }
        Command::Base64Encode { input, wrapper } => (input, OperationSpec::EncodeBase64 { wrapper }),
        Command::Base64Decode { inputs } => {
            return decode_base64_files(&inputs, &cli.output_dir, app_config.output.collision);
        }
        Command::Edit {
            input,
            steps,
            out,
            encode,
        } => {
            let q = encode.quality.unwrap_or(app_config.output.quality);
            return edit(&app_config, &input, &steps, out, &cli.output_dir, encode.format, q);
        }
        Command::Thumbnail { input, size } => {
            let size = size.unwrap_or(app_config.thumbnails.max_dimension);
            return thumbnails(&app_config, &input, size, &cli.output_dir);
        }
        Command::GenConfig => return Ok(()),
    };

    let inputs = scan::collect_inputs(&input.inputs, input.recursive || app_config.output.recursive)?;
    std::fs::create_dir_all(&cli.output_dir)?;
    let jobs = plan_jobs(&inputs, &cli.output_dir, &operation);

    let remover = CornerKeyRemover {
        tolerance: app_config.background.tolerance,
    };
    let pipeline = BatchPipeline::new(BatchConfig::from_app_config(&app_config)).with_remover(Arc::new(remover));

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_progress_event(&event);
        }
    });
    let report = pipeline.run(jobs, &CancelToken::new(), Some(tx));
    printer.join().map_err(|_| "progress printer panicked")?;
    let report = report?;

    output::print_report(&report);
    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        persist::write_atomic(path, json.as_bytes())?;
    }
    if report.failed > 0 {
        return Err(format!("{} of {} jobs failed", report.failed, report.total()).into());
    }
    Ok(())
}

fn preset_help() -> String {
    let mut help = String::from("Presets:\n");
    for preset in RESIZE_PRESETS {
        help.push_str(&format!("  {:<16} {preset}\n", preset.name));
    }
    help
}

/// Install env_logger. `RUST_LOG` wins; otherwise `--verbose` selects debug.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn edit(
    app_config: &AppConfig,
    input: &Path,
    steps: &[EditStep],
    out: Option<PathBuf>,
    output_dir: &Path,
    format: Option<OutputFormat>,
    quality: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = CropSession::new()
        .with_min_size(app_config.crop.min_size)
        .with_handle_tolerance(app_config.crop.handle_tolerance);
    session.load(input)?;
    let original = session.current_image().map(|img| img.dimensions()).unwrap_or_default();
    run_steps(&mut session, steps)?;

    let format = format
        .or_else(|| out.as_deref().and_then(OutputFormat::from_path))
        .or_else(|| OutputFormat::from_path(input))
        .unwrap_or(OutputFormat::Png);
    let target = match out {
        Some(path) => path,
        None => {
            let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            std::fs::create_dir_all(output_dir)?;
            let wanted = output_dir.join(format!("{stem}_edited.{}", format.extension()));
            match app_config.output.collision {
                CollisionPolicy::Suffix => unique_path(&wanted, |p| p.exists()),
                CollisionPolicy::Overwrite => wanted,
            }
        }
    };

    session.save(&target, format, quality)?;
    for line in output::format_edit_summary(input, original, session.history()) {
        println!("{}", line);
    }
    let saved = session.current_image().map(|img| img.dimensions()).unwrap_or_default();
    println!("{}", output::format_saved(&target, saved));
    Ok(())
}

fn thumbnails(
    app_config: &AppConfig,
    input: &InputArgs,
    size: u32,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let inputs = scan::collect_inputs(&input.inputs, input.recursive || app_config.output.recursive)?;
    std::fs::create_dir_all(output_dir)?;
    let cache = ThumbnailCache::new(app_config.thumbnails.max_entries, app_config.thumbnails.max_bytes);

    let total = inputs.len();
    let mut failed = 0;
    for (i, path) in inputs.iter().enumerate() {
        let thumb = match cache.get_or_create(path, size) {
            Ok(thumb) => thumb,
            Err(e) => {
                log::warn!("{}: {e}", path.display());
                println!("{}", output::format_failed_line(i + 1, total, path, &e.to_string()));
                failed += 1;
                continue;
            }
        };
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let target = output_dir.join(format!("{stem}_thumb.png"));
        let bytes = encode(&thumb, OutputFormat::Png, Quality::default())?;
        persist::write_atomic(&target, &bytes)?;
        println!(
            "{}",
            output::format_thumbnail_line(i + 1, total, path, &target, thumb.dimensions())
        );
    }
    println!("{}", output::format_cache_stats(&cache.stats()));
    if failed > 0 {
        return Err(format!("{failed} of {total} thumbnails failed").into());
    }
    Ok(())
}

fn decode_base64_files(
    inputs: &[PathBuf],
    output_dir: &Path,
    collision: CollisionPolicy,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(output_dir)?;
    let total = inputs.len();
    for (i, path) in inputs.iter().enumerate() {
        let text = std::fs::read_to_string(path)?;
        let bytes = encoding::unwrap(&text).map_err(|e| format!("{}: {e}", path.display()))?;
        let extension = image::guess_format(&bytes)
            .ok()
            .and_then(OutputFormat::from_image_format)
            .map_or("bin", |f| f.extension());
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let wanted = output_dir.join(format!("{stem}.{extension}"));
        let target = match collision {
            CollisionPolicy::Suffix => unique_path(&wanted, |p| p.exists()),
            CollisionPolicy::Overwrite => wanted,
        };
        persist::write_atomic(&target, &bytes)?;
        println!("{}", output::format_decoded_line(i + 1, total, path, &target, bytes.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resize_preset_parses() {
        let cli = Cli::try_parse_from(["image-master", "resize", "a.jpg", "--preset", "full-hd"]).unwrap();
        let Command::Resize { preset, .. } = cli.command else {
            panic!("expected resize");
        };
        let preset = preset.unwrap();
        assert_eq!((preset.width, preset.height), (1920, 1080));
    }

    #[test]
    fn resize_preset_conflicts_with_explicit_width() {
        let result = Cli::try_parse_from(["image-master", "resize", "a.jpg", "--preset", "hd", "--width", "10"]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_resize_preset_is_rejected() {
        assert!(Cli::try_parse_from(["image-master", "resize", "a.jpg", "--preset", "poster"]).is_err());
    }

    #[test]
    fn convert_accepts_lossless() {
        let cli = Cli::try_parse_from(["image-master", "convert", "a.png", "-f", "webp", "--lossless"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Convert {
                format: OutputFormat::WebP,
                lossless: true,
                ..
            }
        ));
    }
}
