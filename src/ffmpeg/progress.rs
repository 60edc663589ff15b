use regex::Regex;
use std::sync::LazyLock;

static OUT_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^out_time_(ms|us)=(\d+)$").expect("invalid out_time regex")
});

/// Parse one line of `-progress` output against the expected output length.
/// Returns progress in [0,1] for `out_time_*` lines and `1.0` for `progress=end`.
pub fn parse_ffmpeg_progress(line: &str, expected_secs: Option<f64>) -> Option<f64> {
    let line = line.trim();
    if line == "progress=end" {
        return Some(1.0);
    }
    let expected = expected_secs.filter(|&d| d > 0.0)?;
    let caps = OUT_TIME_RE.captures(line)?;
    // FFmpeg reports out_time_ms in microseconds too; both keys carry the same value.
    let micros: u64 = caps[2].parse().ok()?;
    let current = micros as f64 / 1_000_000.0;
    Some((current / expected).min(1.0))
}
