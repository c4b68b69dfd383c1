use std::path::Path;

use crate::core::{Error, Result, VideoMetadata};
use crate::video::ffmpeg::VideoToolRunner;

/// Probe a video file's metadata. Re-probes on every call; nothing is cached.
pub fn get_video_info(runner: &dyn VideoToolRunner, path: &Path) -> Result<VideoMetadata> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let json_text = runner.probe(path)?;
    parse_probe_output(path, &json_text)
}

/// True iff the file exists and the probe reports at least one video stream.
/// Probe failures are swallowed; this never raises.
pub fn is_valid_video_file(runner: &dyn VideoToolRunner, path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    match runner.probe(path) {
        Ok(json_text) => match serde_json::from_str::<serde_json::Value>(&json_text) {
            Ok(info) => first_video_stream(&info).is_some(),
            Err(e) => {
                log::debug!("Probe output for {} is not JSON: {}", path.display(), e);
                false
            }
        },
        Err(e) => {
            log::debug!("Probe failed for {}: {}", path.display(), e);
            false
        }
    }
}

fn parse_probe_output(path: &Path, json_text: &str) -> Result<VideoMetadata> {
    let invalid = |reason: String| Error::InvalidMedia {
        path: path.to_path_buf(),
        reason,
    };

    let info: serde_json::Value = serde_json::from_str(json_text)
        .map_err(|e| invalid(format!("probe output is not valid JSON: {e}")))?;

    let stream = first_video_stream(&info)
        .ok_or_else(|| invalid("no video stream found".to_string()))?;

    let fps_raw = stream["r_frame_rate"]
        .as_str()
        .ok_or_else(|| invalid("missing r_frame_rate field".to_string()))?;
    let fps = parse_frame_rate(fps_raw)
        .ok_or_else(|| invalid(format!("malformed frame rate '{fps_raw}'")))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| invalid("missing or non-numeric width".to_string()))?;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| invalid("missing or non-numeric height".to_string()))?;

    let duration = info["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| invalid("missing or non-numeric duration".to_string()))?;

    VideoMetadata::new(
        path.to_path_buf(),
        duration,
        fps,
        width as u32,
        height as u32,
    )
}

fn first_video_stream(info: &serde_json::Value) -> Option<&serde_json::Value> {
    info["streams"]
        .as_array()?
        .iter()
        .find(|stream| stream["codec_type"].as_str() == Some("video"))
}

/// Frame rates arrive as a rational "num/den" string.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
