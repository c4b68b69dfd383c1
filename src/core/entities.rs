use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, Result};

/// Probed metadata for a video file. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    path: PathBuf,
    duration: f64,
    fps: f64,
    width: u32,
    height: u32,
    total_frames: u64,
}

impl VideoMetadata {
    pub fn new(path: PathBuf, duration: f64, fps: f64, width: u32, height: u32) -> Result<Self> {
        let reject = |reason: &str| Error::InvalidMedia {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if !duration.is_finite() || duration <= 0.0 {
            return Err(reject("duration must be positive"));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(reject("frame rate must be positive"));
        }
        if width == 0 || height == 0 {
            return Err(reject("width and height must be positive"));
        }

        let total_frames = (duration * fps).floor() as u64;
        Ok(VideoMetadata {
            path,
            duration,
            fps,
            width,
            height,
            total_frames,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

/// A single frame sampled from the video.
///
/// `caption` and `selected` are the per-frame state the user edits between
/// extraction and assembly; everything else is fixed at extraction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFrame {
    pub timestamp: f64,
    pub sequence_index: u32,
    pub image_path: PathBuf,
    pub caption: String,
    pub selected: bool,
}

impl ExtractedFrame {
    pub fn new(timestamp: f64, sequence_index: u32, image_path: PathBuf) -> Result<Self> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "frame timestamp must be non-negative, got {timestamp}"
            )));
        }

        Ok(ExtractedFrame {
            timestamp,
            sequence_index,
            image_path,
            caption: String::new(),
            selected: false,
        })
    }

    /// Timestamp rendered as `MM:SS.ss` for the composited header band.
    pub fn timestamp_label(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

pub fn format_timestamp(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor() as u64;
    let rest = seconds - minutes as f64 * 60.0;
    format!("{minutes:02}:{rest:05.2}")
}
