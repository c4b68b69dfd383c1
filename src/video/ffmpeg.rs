use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::{AppConfig, Error, ImageFormat, Result};

/// Well-known install locations checked when the binary is not on PATH.
const HOMEBREW_FFMPEG_PATHS: [&str; 2] = ["/opt/homebrew/bin/ffmpeg", "/usr/local/bin/ffmpeg"];

/// One ffmpeg sampling invocation: input video in, numbered frame files out.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub input: PathBuf,
    pub output_pattern: PathBuf,
    pub target_fps: f64,
    pub format: ImageFormat,
    pub quality: u8,
}

/// Boundary to the external video tool.
///
/// The core only depends on this contract (args in, files/JSON out, exit code
/// as the success signal), so tests substitute a fake without a real ffmpeg.
pub trait VideoToolRunner: Send + Sync {
    /// Probe container/stream metadata; returns the tool's JSON document.
    fn probe(&self, video: &Path) -> Result<String>;

    /// Sample frames at `target_fps` into the request's output pattern.
    fn sample(&self, request: &ExtractRequest) -> Result<()>;
}

/// Runs the system ffmpeg/ffprobe binaries as subprocesses.
pub struct FfmpegRunner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    active_count: AtomicUsize,
}

impl FfmpegRunner {
    const MAX_PROCESSES: usize = 4;

    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_overrides(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
    }

    pub fn with_overrides(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.unwrap_or_else(|| resolve_binary("ffmpeg", "FFMPEG_BINARY"));
        let ffprobe = ffprobe.unwrap_or_else(|| resolve_binary("ffprobe", "FFPROBE_BINARY"));
        log::debug!(
            "Using ffmpeg at {} and ffprobe at {}",
            ffmpeg.display(),
            ffprobe.display()
        );
        Self {
            ffmpeg,
            ffprobe,
            active_count: AtomicUsize::new(0),
        }
    }

    /// Run a prepared command under the concurrent-process cap.
    fn execute(&self, mut command: Command) -> Result<std::process::Output> {
        let current_count = self.active_count.load(Ordering::SeqCst);
        if current_count >= Self::MAX_PROCESSES {
            return Err(Error::Extraction(format!(
                "cannot execute video tool: {} processes already running (max: {})",
                current_count,
                Self::MAX_PROCESSES
            )));
        }

        self.active_count.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Executing video tool process, active count: {}",
            self.active_count.load(Ordering::SeqCst)
        );

        let result = command.output();

        self.active_count.fetch_sub(1, Ordering::SeqCst);
        result.map_err(Error::Io)
    }
}

impl VideoToolRunner for FfmpegRunner {
    fn probe(&self, video: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(video);

        let output = self.execute(cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InvalidMedia {
                path: video.to_path_buf(),
                reason: format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| Error::InvalidMedia {
            path: video.to_path_buf(),
            reason: format!("ffprobe produced non-UTF-8 output: {e}"),
        })
    }

    fn sample(&self, request: &ExtractRequest) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(&request.input)
            .arg("-vf")
            .arg(format!("fps={}", request.target_fps))
            .arg("-f")
            .arg("image2")
            .arg("-start_number")
            .arg("0");

        if matches!(request.format, ImageFormat::Jpg | ImageFormat::Jpeg) {
            // ffmpeg's qscale runs 2 (best) to 31; higher quality maps to
            // a lower qscale.
            let qscale = (100 - request.quality as i32) / 10 + 2;
            cmd.arg("-q:v").arg(qscale.to_string());
        }

        cmd.arg("-y").arg(&request.output_pattern);

        let output = self.execute(cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extraction(format!(
                "ffmpeg exited with {} while sampling {}: {}",
                output.status,
                request.input.display(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Resolution order: environment override, well-known install paths, PATH.
fn resolve_binary(name: &str, env_var: &str) -> PathBuf {
    if let Ok(path) = std::env::var(env_var) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    for candidate in HOMEBREW_FFMPEG_PATHS {
        let candidate = candidate.replace("ffmpeg", name);
        if Path::new(&candidate).exists() {
            return PathBuf::from(candidate);
        }
    }

    PathBuf::from(name)
}
