pub mod discovery;
mod error;
pub mod ffprobe;
mod pipeline;
mod progress;
mod runner;
mod temp;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use error::{FfmpegErrorPayload, parse_ffmpeg_error};
pub use pipeline::{PreviewPipeline, Stage, format_args_for_display_multiline};
pub use runner::run_ffmpeg_blocking;
pub use temp::{PreviewArtifact, TempFileManager};

use crate::error::AppError;

/// Receives normalized progress in [0,1].
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// One side of a scale box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDim {
    Pixels(u32),
    /// `-1`: derive from the other side, keeping aspect ratio.
    KeepAspect,
    /// `-2`: like `KeepAspect` but rounded to an even number of pixels.
    KeepAspectEven,
}

impl ScaleDim {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "-1" => Some(Self::KeepAspect),
            "-2" => Some(Self::KeepAspectEven),
            other => other
                .parse::<u32>()
                .ok()
                .filter(|&px| px > 0)
                .map(Self::Pixels),
        }
    }

    /// Filter expression that never exceeds the matching input dimension.
    fn decrease_only_expr(&self, input_dim: &str) -> String {
        match self {
            Self::Pixels(px) => format!("'min({},{})'", px, input_dim),
            Self::KeepAspect => "-1".to_string(),
            Self::KeepAspectEven => "-2".to_string(),
        }
    }
}

impl fmt::Display for ScaleDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pixels(px) => write!(f, "{}", px),
            Self::KeepAspect => f.write_str("-1"),
            Self::KeepAspectEven => f.write_str("-2"),
        }
    }
}

/// Target box for the optional rescale, parsed from `"WIDTH:HEIGHT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleSpec {
    pub width: ScaleDim,
    pub height: ScaleDim,
}

impl ScaleSpec {
    /// `scale` filter arguments: fit inside the box, keep aspect ratio, never upscale.
    pub fn filter_args(&self) -> String {
        format!(
            "w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
            self.width.decrease_only_expr("iw"),
            self.height.decrease_only_expr("ih"),
        )
    }
}

impl FromStr for ScaleSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            AppError::input(format!(
                "Invalid scale '{}': expected WIDTH:HEIGHT with positive pixels or -1/-2",
                s
            ))
        };
        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        if h.contains(':') {
            return Err(invalid());
        }
        let width = ScaleDim::parse(w).ok_or_else(invalid)?;
        let height = ScaleDim::parse(h).ok_or_else(invalid)?;
        if !matches!(width, ScaleDim::Pixels(_)) && !matches!(height, ScaleDim::Pixels(_)) {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for ScaleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Output container name handed to FFmpeg's `-f`. Also the file extension and
/// the `video/*` content type of the delivered preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat(String);

impl OutputFormat {
    pub fn new(name: &str) -> Result<Self, AppError> {
        let name = name.trim().to_lowercase();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AppError::input(format!("Invalid output format '{}'", name)));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn extension(&self) -> &str {
        &self.0
    }

    pub fn content_type(&self) -> String {
        format!("video/{}", self.0)
    }

    /// Containers that benefit from moving the moov atom to the front.
    pub fn wants_faststart(&self) -> bool {
        matches!(self.0.as_str(), "mp4" | "mov" | "m4v" | "ipod")
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self("mp4".to_string())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
