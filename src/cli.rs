use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::core::{
    AppConfig, ExtractedFrame, ExtractionSettings, FrameCommand, FrameStore, ImageFormat,
    QualityPreset, SheetOptions,
};
use crate::render::sheet::{self, SheetRequest};
use crate::video::ffmpeg::FfmpegRunner;
use crate::video::probe;
use crate::worker::{BackgroundWorker, WorkerEvent, WorkerJob};

const CLI_AFTER_HELP: &str = "Examples:\n  \
    snapsheet info video.mp4\n  \
    snapsheet extract video.mp4 -i 0.5 -o ./frames -f jpg\n  \
    snapsheet sheet video.mp4 -i 2.0 --columns 4 --preset 1 -o ./out --name scenes\n  \
    snapsheet sheet video.mp4 --select 1,4,7 --captions captions.txt";

#[derive(Debug, Parser)]
#[command(
    name = "snapsheet",
    version,
    about = "Extract video frames, caption them, and compose paginated contact sheets",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print metadata for a video file.
    Info {
        /// Input video path.
        video: PathBuf,
    },

    /// Extract frames at a fixed interval.
    Extract {
        /// Input video path.
        video: PathBuf,

        /// Seconds between sampled frames.
        #[arg(short, long)]
        interval: Option<f64>,

        /// Output directory for the numbered frame files.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame image format (png, jpg, jpeg).
        #[arg(short, long, default_value = "png")]
        format: String,

        /// Image quality 1-100 (JPEG only).
        #[arg(short, long, default_value_t = 95)]
        quality: u8,
    },

    /// Extract frames and assemble them into a captioned contact sheet.
    Sheet {
        /// Input video path.
        video: PathBuf,

        /// Seconds between sampled frames.
        #[arg(short, long)]
        interval: Option<f64>,

        /// Output directory for the assembled document.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Document format (png, jpg, jpeg, pdf).
        #[arg(short, long, default_value = "pdf")]
        format: String,

        /// Base name for the output file(s).
        #[arg(long, default_value = "frames")]
        name: String,

        /// Grid columns per page.
        #[arg(long)]
        columns: Option<u32>,

        /// Quality preset: 0 (best) to 3 (smallest).
        #[arg(long)]
        preset: Option<usize>,

        /// Caption file with `N: text` lines, N being the 1-based frame number.
        #[arg(long)]
        captions: Option<PathBuf>,

        /// Frames to include: "all" or a comma-separated list of 1-based numbers.
        #[arg(long, default_value = "all")]
        select: String,
    },
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Could not load config ({e}); using defaults");
        AppConfig::default()
    });
    let runner = Arc::new(FfmpegRunner::from_config(&config));

    match cli.command {
        Commands::Info { video } => info_command(runner.as_ref(), &video),
        Commands::Extract {
            video,
            interval,
            output,
            format,
            quality,
        } => {
            let settings = ExtractionSettings::new(
                interval.unwrap_or(config.default_interval),
                output.unwrap_or_else(|| config.default_output_directory.clone()),
                format.parse()?,
                quality,
            )?;
            extract_command(runner, &video, settings)
        }
        Commands::Sheet {
            video,
            interval,
            output,
            format,
            name,
            columns,
            preset,
            captions,
            select,
        } => {
            let request = SheetRequest {
                output_directory: output
                    .unwrap_or_else(|| config.default_output_directory.clone()),
                base_name: name,
                format: format.parse()?,
                preset: *QualityPreset::tier(preset.unwrap_or(config.default_preset))?,
                options: SheetOptions::new(
                    columns.unwrap_or(config.default_columns),
                    SheetOptions::default().page_margin,
                    SheetOptions::default().cell_spacing,
                )?,
            };
            sheet_command(
                runner,
                &video,
                interval.unwrap_or(config.default_interval),
                request,
                captions.as_deref(),
                &select,
            )
        }
    }
}

fn info_command(runner: &FfmpegRunner, video: &PathBuf) -> anyhow::Result<()> {
    let info = probe::get_video_info(runner, video)?;

    println!("Video info");
    println!("{}", "=".repeat(50));
    println!("File:         {}", info.path().display());
    println!(
        "Duration:     {:.2}s ({:.1} min)",
        info.duration(),
        info.duration() / 60.0
    );
    println!("Frame rate:   {:.2} fps", info.fps());
    println!("Resolution:   {}x{}", info.width(), info.height());
    println!("Total frames: {}", info.total_frames());
    println!("{}", "=".repeat(50));

    Ok(())
}

fn extract_command(
    runner: Arc<FfmpegRunner>,
    video: &PathBuf,
    settings: ExtractionSettings,
) -> anyhow::Result<()> {
    println!("Video:    {}", video.display());
    println!("Interval: {}s", settings.interval());
    println!("Output:   {}", settings.output_directory().display());
    println!("Format:   {}", settings.format());

    let worker = BackgroundWorker::new(runner);
    worker.submit(WorkerJob::Extract {
        video: video.clone(),
        settings: settings.clone(),
    })?;
    let frames = match drive_job(&worker, "Extracting frames")? {
        JobOutcome::Frames(frames) => frames,
        JobOutcome::Paths(_) => unreachable!("extract jobs finish with frames"),
    };

    println!(
        "Done. Extracted {} frames to {}",
        frames.len(),
        settings.output_directory().display()
    );
    if !frames.is_empty() {
        println!("Sample:");
        for frame in frames.iter().take(5) {
            let file_name = frame
                .image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("  - {:>8.2}s -> {}", frame.timestamp, file_name);
        }
        if frames.len() > 5 {
            println!("  ... and {} more", frames.len() - 5);
        }
    }

    Ok(())
}

fn sheet_command(
    runner: Arc<FfmpegRunner>,
    video: &PathBuf,
    interval: f64,
    request: SheetRequest,
    captions: Option<&std::path::Path>,
    select: &str,
) -> anyhow::Result<()> {
    if !probe::is_valid_video_file(runner.as_ref(), video) {
        anyhow::bail!("not a valid video file: {}", video.display());
    }

    // Frames for the sheet go into the shared scratch directory; clear any
    // leftovers so the reconciliation walk cannot pick up a previous run.
    let frames_dir = sheet::frames_directory();
    if frames_dir.exists() {
        std::fs::remove_dir_all(&frames_dir)?;
    }
    let settings =
        ExtractionSettings::new(interval, frames_dir, request.format, 95)?;

    let worker = BackgroundWorker::new(runner);
    worker.submit(WorkerJob::Extract {
        video: video.clone(),
        settings,
    })?;
    let frames = match drive_job(&worker, "Extracting frames")? {
        JobOutcome::Frames(frames) => frames,
        JobOutcome::Paths(_) => unreachable!("extract jobs finish with frames"),
    };
    println!("Extracted {} frames", frames.len());

    let mut store = FrameStore::new(frames);
    apply_selection(&mut store, select)?;
    if let Some(path) = captions {
        apply_captions(&mut store, path)?;
    }
    let preset = &request.preset;
    println!(
        "Composing {} of {} frames into a {} sheet ({} preset, {}x{} @ {} dpi)",
        store.selected_count(),
        store.len(),
        request.format,
        preset.label,
        preset.page_width,
        preset.page_height,
        preset.dpi
    );

    worker.submit(WorkerJob::ComposeSheet {
        frames: store.frames().to_vec(),
        request,
    })?;
    let outputs = match drive_job(&worker, "Composing sheet")? {
        JobOutcome::Paths(paths) => paths,
        JobOutcome::Frames(_) => unreachable!("sheet jobs finish with paths"),
    };

    println!("Done. Wrote:");
    for path in outputs {
        println!("  {}", path.display());
    }

    Ok(())
}

/// Mark the requested frames selected: "all" or 1-based comma list.
fn apply_selection(store: &mut FrameStore, select: &str) -> anyhow::Result<()> {
    if select.trim().eq_ignore_ascii_case("all") {
        store.apply(FrameCommand::SelectAll)?;
        return Ok(());
    }

    for part in select.split(',') {
        let number: usize = part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid frame number '{}'", part.trim()))?;
        if number == 0 {
            anyhow::bail!("frame numbers are 1-based");
        }
        store.apply(FrameCommand::SetSelection(number - 1, true))?;
    }
    Ok(())
}

/// Apply `N: caption` lines from a file; `#`-prefixed lines are comments.
fn apply_captions(store: &mut FrameStore, path: &std::path::Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("could not read captions file {}: {e}", path.display()))?;

    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (number, text) = line.split_once(':').ok_or_else(|| {
            anyhow::anyhow!(
                "captions line {} is not 'N: text': '{line}'",
                line_number + 1
            )
        })?;
        let number: usize = number.trim().parse().map_err(|_| {
            anyhow::anyhow!("captions line {} has invalid frame number", line_number + 1)
        })?;
        if number == 0 {
            anyhow::bail!("captions line {} uses 0; frames are 1-based", line_number + 1);
        }
        store.apply(FrameCommand::SetCaption(number - 1, text.trim().to_string()))?;
    }
    Ok(())
}

enum JobOutcome {
    Frames(Vec<ExtractedFrame>),
    Paths(Vec<PathBuf>),
}

/// Poll worker events until the job finishes, rendering progress.
fn drive_job(worker: &BackgroundWorker, message: &str) -> anyhow::Result<JobOutcome> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}%")
            .unwrap()
            .progress_chars("##-"),
    );
    bar.set_message(message.to_string());

    loop {
        for event in worker.poll_events() {
            match event {
                WorkerEvent::Progress(percent) => bar.set_position(percent as u64),
                WorkerEvent::ExtractionFinished(frames) => {
                    bar.finish_and_clear();
                    return Ok(JobOutcome::Frames(frames));
                }
                WorkerEvent::SheetFinished(paths) => {
                    bar.finish_and_clear();
                    return Ok(JobOutcome::Paths(paths));
                }
                WorkerEvent::JobFailed(message) => {
                    bar.finish_and_clear();
                    anyhow::bail!("{message}");
                }
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
