//! App error type for preview requests. Implements Display and Serialize for the response envelope.

use crate::ffmpeg::parse_ffmpeg_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Caller-supplied input was invalid or the source could not be reached.
    #[error("{0}")]
    Input(String),

    #[error("Failed to get video info: {0}")]
    Probe(String),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    PipelineFailed { code: i32, stderr: String },

    #[error("Failed to deliver video preview: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn pipeline_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::PipelineFailed {
            code,
            stderr: stderr.into(),
        }
    }

    /// HTTP-style status: 400 for client faults, 500 for everything on our side.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Input(_) => 400,
            _ => 500,
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.status_code() < 500
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AppError::PipelineFailed { code, stderr } => {
                let payload = parse_ffmpeg_error(stderr, Some(*code));
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

/// Bare strings come from process plumbing (spawn, pipes, join) and count as pipeline failures.
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::PipelineFailed {
            code: -1,
            stderr: s,
        }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
