#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use video_preview_core::PreviewConfig;
use video_preview_core::ffmpeg::ffprobe::{VideoMetadata, probe};

pub struct IntegrationEnv {
    pub ffmpeg: PathBuf,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let ffmpeg = video_preview_core::ffmpeg::discovery::get_ffmpeg_path()
            .expect("FFmpeg not found")
            .to_path_buf();
        let dir = tempfile::tempdir().expect("tempdir");
        Self { ffmpeg, dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Config whose intermediate files land inside this env's temp dir.
    pub fn config(&self) -> PreviewConfig {
        PreviewConfig {
            temp_dir: Some(self.path("work")),
            ..PreviewConfig::default()
        }
    }

    /// 320x240 `testsrc` clip of `duration_secs`.
    pub fn with_test_video(&self, input_name: &str, duration_secs: f32) -> PathBuf {
        let output_path = self.path(input_name);
        let status =
            create_test_video(&self.ffmpeg, &output_path, duration_secs, "320x240")
                .expect("failed to create test video");
        assert!(status.success(), "ffmpeg failed to create test video");
        output_path
    }
}

pub fn create_test_video(
    ffmpeg: &Path,
    output_path: &Path,
    duration_secs: f32,
    size: &str,
) -> std::io::Result<ExitStatus> {
    Command::new(ffmpeg)
        .args([
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={}:size={}:rate=25", duration_secs, size),
            "-pix_fmt",
            "yuv420p",
            output_path.to_string_lossy().as_ref(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}

pub fn metadata(path: &Path) -> VideoMetadata {
    probe(path.to_string_lossy().as_ref()).expect("probe")
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} +/- {}, got {}",
        expected,
        tolerance,
        actual
    );
}
