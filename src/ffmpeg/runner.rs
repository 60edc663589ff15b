//! FFmpeg process spawning and progress parsing.
//!
//! Every call spawns its own FFmpeg child and blocks until it exits. Progress is
//! read from stdout (`-progress pipe:1`) on a background thread while another
//! thread keeps a bounded tail of stderr for error reporting.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use parking_lot::Mutex;

use super::ProgressCallback;
use super::discovery::get_ffmpeg_path;
use super::progress::parse_ffmpeg_progress;
use crate::error::AppError;

/// Minimum interval between progress callbacks.
const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(250);
/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

fn collect_stderr<R: Read + Send + 'static>(
    reader: R,
    buffer: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(256);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let mut guard = buffer.lock();
            guard.extend_from_slice(&line_buf);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            drop(guard);
            line_buf.clear();
        }
    })
}

fn follow_progress<R: Read + Send + 'static>(
    reader: R,
    expected_secs: Option<f64>,
    callback: Option<ProgressCallback>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_emit = Instant::now();
        let mut last_progress = 0.0_f64;
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(128);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let line = std::str::from_utf8(&line_buf)
                .unwrap_or("")
                .trim_end_matches(['\n', '\r']);
            if let Some(p) = parse_ffmpeg_progress(line, expected_secs) {
                let now = Instant::now();
                let should_emit = now.duration_since(last_emit) >= PROGRESS_EMIT_INTERVAL
                    || (p - last_progress).abs() >= 0.05
                    || p >= 1.0;
                if should_emit {
                    last_emit = now;
                    last_progress = p;
                    if let Some(ref cb) = callback {
                        cb(p);
                    }
                }
            }
            line_buf.clear();
        }
    })
}

/// Run FFmpeg with `args` and block until it exits.
///
/// - `expected_secs`: nominal output length, used to turn `out_time` into [0,1] progress.
/// - `progress_callback`: receives throttled progress; `None` discards it.
///
/// A non-zero exit is returned as `AppError::PipelineFailed` with the stderr tail.
pub fn run_ffmpeg_blocking(
    args: Vec<String>,
    expected_secs: Option<f64>,
    progress_callback: Option<ProgressCallback>,
) -> Result<(), AppError> {
    let ffmpeg_path = get_ffmpeg_path()?;

    let input_arg = args
        .iter()
        .position(|a| a == "-i")
        .and_then(|i| args.get(i + 1));
    let output_arg = args.last();
    log::debug!(
        target: "video_preview::ffmpeg::runner",
        "Spawning FFmpeg: path={}, input={:?}, output={:?}",
        ffmpeg_path.display(),
        input_arg,
        output_arg
    );

    let mut cmd = Command::new(ffmpeg_path);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let mut child = cmd
        .spawn()
        .map_err(|e| format!("Failed to spawn FFmpeg: {}", e))?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(AppError::from("Failed to capture FFmpeg output"));
    };

    let stderr_buffer = Arc::new(Mutex::new(Vec::new()));
    let expected_secs = expected_secs.filter(|&d| d > 0.0);
    let stdout_handle = follow_progress(stdout, expected_secs, progress_callback);
    let stderr_handle = collect_stderr(stderr, Arc::clone(&stderr_buffer));

    let _ = stdout_handle.join();
    let _ = stderr_handle.join();

    let status = child
        .wait()
        .map_err(|e| format!("Failed to wait for FFmpeg: {}", e))?;

    let stderr_str = String::from_utf8_lossy(&stderr_buffer.lock()).to_string();

    if status.success() {
        log::info!(
            target: "video_preview::ffmpeg::runner",
            "FFmpeg completed successfully"
        );
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        let err_preview = stderr_str
            .lines()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .join("; ");
        log::error!(
            target: "video_preview::ffmpeg::runner",
            "FFmpeg failed (code={}): {}",
            code,
            err_preview
        );
        Err(AppError::pipeline_failed(code, stderr_str))
    }
}
