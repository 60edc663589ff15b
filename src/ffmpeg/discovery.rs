//! Locates the `ffmpeg` and `ffprobe` binaries.
//!
//! Order: `FFMPEG_PATH` env override, common install locations, `PATH`, then a copy
//! shipped next to the running executable. The resolved path is cached for the
//! process lifetime; it is the only process-wide state in the crate.

use crate::error::AppError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(target_os = "windows")]
const LOOKUP_COMMAND: &str = "where";
#[cfg(not(target_os = "windows"))]
const LOOKUP_COMMAND: &str = "which";

fn find_in_path() -> Option<PathBuf> {
    let output = Command::new(LOOKUP_COMMAND).arg("ffmpeg").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout);
    let first = path.lines().next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(PathBuf::from(first))
    }
}

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// FFmpeg copied next to the executable (container images that bundle a static build).
fn bundled_path() -> Option<PathBuf> {
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    #[cfg(windows)]
    let path = exe_dir.join("ffmpeg.exe");
    #[cfg(not(windows))]
    let path = exe_dir.join("ffmpeg");
    path.exists().then_some(path)
}

fn resolve_ffmpeg_path() -> Result<PathBuf, AppError> {
    for path in common_paths() {
        if path.exists() {
            log::debug!(
                target: "video_preview::ffmpeg::discovery",
                "FFmpeg found in common path: {}",
                path.display()
            );
            return Ok(path);
        }
    }

    if let Some(p) = find_in_path().filter(|p| p.exists()) {
        log::debug!(
            target: "video_preview::ffmpeg::discovery",
            "FFmpeg found in PATH: {}",
            p.display()
        );
        return Ok(p);
    }

    if let Some(p) = bundled_path() {
        log::debug!(
            target: "video_preview::ffmpeg::discovery",
            "FFmpeg found next to executable: {}",
            p.display()
        );
        return Ok(p);
    }

    log::error!(
        target: "video_preview::ffmpeg::discovery",
        "FFmpeg not found in PATH or common locations"
    );
    Err(AppError::FfmpegNotFound(
        "FFmpeg not properly installed: no ffmpeg binary in PATH or common locations (set FFMPEG_PATH to override)"
            .to_string(),
    ))
}

/// Get FFmpeg path. Cached for process lifetime.
/// Env override: FFMPEG_PATH takes precedence when it points at an existing file.
pub fn get_ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        return Ok(path.as_path());
    }
    let path = match std::env::var_os("FFMPEG_PATH").map(PathBuf::from) {
        Some(p) if p.exists() => {
            log::debug!(
                target: "video_preview::ffmpeg::discovery",
                "FFmpeg path from FFMPEG_PATH env: {}",
                p.display()
            );
            p
        }
        _ => resolve_ffmpeg_path()?,
    };
    // Another thread may have won the race; either value is valid.
    let _ = FFMPEG_PATH_CACHE.set(path);
    FFMPEG_PATH_CACHE
        .get()
        .map(PathBuf::as_path)
        .ok_or_else(|| AppError::FfmpegNotFound("FFmpeg path cache is empty".to_string()))
}

/// Paths to try for ffprobe given an ffmpeg binary path (suffixed first, then plain).
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let Some(parent) = ffmpeg_path.parent() else {
        return vec![];
    };
    let mut candidates = Vec::with_capacity(2);
    let suffix = ffmpeg_path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.strip_prefix("ffmpeg"))
        .filter(|suffix| !suffix.is_empty());
    if let Some(suffix) = suffix {
        #[cfg(target_os = "windows")]
        candidates.push(parent.join(format!("ffprobe{suffix}.exe")));
        #[cfg(not(target_os = "windows"))]
        candidates.push(parent.join(format!("ffprobe{suffix}")));
    }
    #[cfg(target_os = "windows")]
    candidates.push(parent.join("ffprobe.exe"));
    #[cfg(not(target_os = "windows"))]
    candidates.push(parent.join("ffprobe"));
    candidates
}

/// Get ffprobe path. Same directory as ffmpeg (ffmpeg/ffprobe ship together).
pub fn get_ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    let candidates = ffprobe_candidates(ffmpeg);
    if let Some(found) = candidates.iter().find(|c| c.exists()) {
        return Ok(found.clone());
    }
    Err(AppError::FfmpegNotFound(format!(
        "ffprobe not found next to FFmpeg (tried: {})",
        candidates
            .iter()
            .map(|c| c.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// First line of `ffmpeg -version`. Fails when FFmpeg is missing or cannot run.
pub fn ffmpeg_version() -> Result<String, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-version");
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let output = cmd.output().map_err(|e| {
        AppError::FfmpegNotFound(format!("FFmpeg not properly installed: {}", e))
    })?;
    if !output.status.success() {
        return Err(AppError::FfmpegNotFound(format!(
            "FFmpeg not properly installed: `ffmpeg -version` exited with {}",
            output.status
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("").trim().to_string())
}
