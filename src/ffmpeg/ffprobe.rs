//! FFprobe-based metadata extraction for preview sources (local paths or URLs).

use crate::error::AppError;
use serde::Deserialize;
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::discovery::get_ffprobe_path;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Container duration in seconds; `None` when ffprobe could not determine it.
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Parse ffprobe JSON output into VideoMetadata.
pub fn parse_ffprobe_json(json: &str) -> Result<VideoMetadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::probe(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite());

    let video_stream = output
        .streams
        .as_ref()
        .and_then(|streams| streams.iter().find(|s| s.codec_type.as_deref() == Some("video")));

    Ok(VideoMetadata {
        duration,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
    })
}

/// Run ffprobe on a source and return its metadata.
pub fn probe(source: &str) -> Result<VideoMetadata, AppError> {
    let ffprobe = get_ffprobe_path()?;

    log::debug!(
        target: "video_preview::ffmpeg::ffprobe",
        "probe: source={}",
        source
    );

    let mut cmd = Command::new(&ffprobe);
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        source,
    ]);
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let output = cmd
        .output()
        .map_err(|e| AppError::probe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::error!(
            target: "video_preview::ffmpeg::ffprobe",
            "ffprobe failed for {}: {}",
            source,
            stderr.trim()
        );
        return Err(AppError::probe(format!("ffprobe failed: {}", stderr.trim())));
    }

    let json = String::from_utf8(output.stdout)
        .map_err(|_| AppError::probe("ffprobe output was not valid UTF-8"))?;

    parse_ffprobe_json(&json)
}

/// Total duration of a source in seconds. Missing or non-positive durations are probe errors.
pub fn probe_duration(source: &str) -> Result<f64, AppError> {
    preview_duration(&probe(source)?)
}

/// Audio-only sources are rejected here rather than failing later on `[0:v]`.
fn preview_duration(meta: &VideoMetadata) -> Result<f64, AppError> {
    if !meta.has_video() {
        return Err(AppError::probe("source has no video stream"));
    }
    match meta.duration {
        Some(d) if d > 0.0 => Ok(d),
        Some(d) => Err(AppError::probe(format!("source reports duration {}", d))),
        None => Err(AppError::probe("source has no determinable duration")),
    }
}
