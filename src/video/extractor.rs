use std::path::{Path, PathBuf};

use crate::core::{Error, ExtractedFrame, ExtractionSettings, Result};
use crate::video::ffmpeg::{ExtractRequest, VideoToolRunner};
use crate::video::probe;

/// Extract frames at the configured interval.
///
/// ffmpeg is invoked once with an `fps` filter; afterwards the expected
/// timestamps are reconciled against the numbered files actually on disk.
/// The fps filter's frame count can differ from naive duration/interval
/// arithmetic, so disk reality wins over the computed expectation.
pub fn extract_frames(
    runner: &dyn VideoToolRunner,
    video: &Path,
    settings: &ExtractionSettings,
) -> Result<Vec<ExtractedFrame>> {
    if !video.exists() {
        return Err(Error::NotFound(video.to_path_buf()));
    }

    let metadata = probe::get_video_info(runner, video)?;

    let output_dir = settings.output_directory();
    std::fs::create_dir_all(output_dir)?;

    let extension = settings.format().frame_extension();
    let request = ExtractRequest {
        input: video.to_path_buf(),
        output_pattern: output_dir.join(format!("frame_%04d.{extension}")),
        target_fps: 1.0 / settings.interval(),
        format: settings.format(),
        quality: settings.quality(),
    };

    log::debug!(
        "Sampling {} every {:.3}s into {}",
        video.display(),
        settings.interval(),
        output_dir.display()
    );
    runner.sample(&request)?;

    let frames = reconcile_frames(output_dir, extension, settings.interval(), metadata.duration())?;
    log::info!(
        "Extracted {} frames from {} ({:.2}s at {:.3}s interval)",
        frames.len(),
        video.display(),
        metadata.duration(),
        settings.interval()
    );

    Ok(frames)
}

/// Walk `timestamp = 0, interval, 2*interval, ...` while the corresponding
/// numbered file exists, stopping at the first gap or past-duration step.
fn reconcile_frames(
    output_dir: &Path,
    extension: &str,
    interval: f64,
    duration: f64,
) -> Result<Vec<ExtractedFrame>> {
    let mut frames = Vec::new();
    let mut index: u32 = 0;

    loop {
        let timestamp = index as f64 * interval;
        if timestamp > duration {
            break;
        }

        let frame_path = frame_file(output_dir, index, extension);
        if !frame_path.exists() {
            break;
        }

        frames.push(ExtractedFrame::new(timestamp, index, frame_path)?);
        index += 1;
    }

    Ok(frames)
}

fn frame_file(output_dir: &Path, index: u32, extension: &str) -> PathBuf {
    output_dir.join(format!("frame_{index:04}.{extension}"))
}
