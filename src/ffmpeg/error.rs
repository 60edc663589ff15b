//! Turn FFmpeg exit codes and stderr into short messages for the response envelope.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). -1 is used for spawn and plumbing failures.
//! Stderr is kept as detail for debugging.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Stderr fragments that point at the input rather than the pipeline itself.
const INPUT_HINTS: &[(&str, &str)] = &[
    ("Server returned 403", "Source URL rejected the request (403)."),
    ("Server returned 404", "Source URL was not found (404)."),
    ("No such file or directory", "Source file does not exist."),
    ("Invalid data found when processing input", "Source is not a readable video."),
    ("matches no streams", "Source has no video stream."),
    ("Unknown encoder", "Output format is not supported by this FFmpeg build."),
    ("Requested output format", "Output format is not supported by this FFmpeg build."),
];

pub fn parse_ffmpeg_error(stderr: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = hint_from_stderr(stderr)
        .map(str::to_string)
        .or_else(|| exit_code.and_then(known_exit_code_summary))
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("FFmpeg failed (exit code {}).", code),
            None => first_line_truncated(stderr, 120),
        });
    FfmpegErrorPayload {
        summary,
        detail: stderr.trim().to_string(),
    }
}

fn hint_from_stderr(stderr: &str) -> Option<&'static str> {
    INPUT_HINTS
        .iter()
        .find(|(needle, _)| stderr.contains(needle))
        .map(|(_, hint)| *hint)
}

fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg could not be started.".into()),
        1 => Some("FFmpeg failed.".into()),
        69 => Some("Encoding rate limit exceeded.".into()),
        123 | 255 => Some("Encoding was stopped.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

fn first_line_truncated(stderr: &str, max_len: usize) -> String {
    let first = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first.len() <= max_len {
        return first.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !first.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &first[..cut], ELLIPSIS)
}
