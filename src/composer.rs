//! Preview composition: trim each sample, concatenate in order, optionally rescale,
//! encode. One FFmpeg invocation per preview; a failed run leaves nothing behind.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::PreviewConfig;
use crate::error::AppError;
use crate::ffmpeg::discovery::ffmpeg_version;
use crate::ffmpeg::ffprobe::probe_duration;
use crate::ffmpeg::{
    OutputFormat, PreviewArtifact, PreviewPipeline, ProgressCallback, ScaleSpec, TempFileManager,
    format_args_for_display_multiline, run_ffmpeg_blocking,
};

/// What to build from a source once its offsets are known.
#[derive(Debug, Clone)]
pub struct ComposeRequest<'a> {
    pub source: &'a str,
    pub offsets: &'a [f64],
    pub sample_duration: f64,
    pub scale: Option<&'a ScaleSpec>,
    pub format: &'a OutputFormat,
}

/// Media toolchain seam used by the request handler.
pub trait MediaEngine: Send + Sync {
    /// Fails with `FfmpegNotFound` when the toolchain is missing or broken.
    fn check_available(&self) -> Result<String, AppError>;

    fn probe_duration(&self, source: &str) -> Result<f64, AppError>;

    fn compose(&self, request: &ComposeRequest<'_>) -> Result<PreviewArtifact, AppError>;
}

/// Runs the real `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    temp: TempFileManager,
    quiet: bool,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self {
            temp: TempFileManager::default(),
            quiet: true,
        }
    }
}

impl FfmpegEngine {
    pub fn new(temp_dir: Option<PathBuf>, quiet: bool) -> Self {
        Self {
            temp: temp_dir.map(TempFileManager::in_dir).unwrap_or_default(),
            quiet,
        }
    }
}

impl MediaEngine for FfmpegEngine {
    fn check_available(&self) -> Result<String, AppError> {
        ffmpeg_version()
    }

    fn probe_duration(&self, source: &str) -> Result<f64, AppError> {
        probe_duration(source)
    }

    fn compose(&self, request: &ComposeRequest<'_>) -> Result<PreviewArtifact, AppError> {
        build_preview(&self.temp, request, self.quiet, None)
    }
}

fn debug_progress_logger() -> ProgressCallback {
    Arc::new(|p: f64| {
        log::debug!(
            target: "video_preview::composer",
            "Encoding progress: {:.0}%",
            p * 100.0
        );
    })
}

/// Builds and runs the preview pipeline into a fresh temp file.
///
/// The returned artifact owns the output file; on any error the partial output
/// is removed before returning.
pub fn build_preview(
    temp: &TempFileManager,
    request: &ComposeRequest<'_>,
    quiet: bool,
    progress: Option<ProgressCallback>,
) -> Result<PreviewArtifact, AppError> {
    let output_path = temp.create(&format!("preview.{}", request.format.extension()))?;
    // Owns the path from here on so every early return cleans up.
    let artifact = PreviewArtifact::new(output_path, request.format.clone());

    let pipeline = PreviewPipeline::new(
        request.source,
        request.offsets,
        request.sample_duration,
        request.scale,
        request.format,
        artifact.path(),
    )?
    .quiet(quiet);

    let args = pipeline.to_args();
    log::debug!(
        target: "video_preview::composer",
        "FFmpeg command:\n{}",
        format_args_for_display_multiline(&args)
    );

    let progress = progress.unwrap_or_else(debug_progress_logger);
    run_ffmpeg_blocking(args, Some(pipeline.nominal_output_seconds()), Some(progress))?;

    if artifact.is_empty().unwrap_or(true) {
        return Err(AppError::pipeline_failed(
            0,
            "FFmpeg exited successfully but produced no output",
        ));
    }

    log::info!(
        target: "video_preview::composer",
        "Preview composed: segments={}, starts={:?}, size={} bytes",
        request.offsets.len(),
        pipeline.segment_starts(),
        artifact.len().unwrap_or(0)
    );
    Ok(artifact)
}

/// Probe, sample and compose `source` with the settings in `config`.
pub fn generate_with(
    engine: &dyn MediaEngine,
    source: &str,
    config: &PreviewConfig,
) -> Result<PreviewArtifact, AppError> {
    let spec = config.sample_spec()?;
    let duration = engine.probe_duration(source)?;
    let offsets = spec.offsets(duration);
    log::info!(
        target: "video_preview::composer",
        "Sampling {} x {}s from {:.3}s source: offsets={:?}",
        spec.count,
        spec.sample_duration,
        duration,
        offsets
    );
    engine.compose(&ComposeRequest {
        source,
        offsets: &offsets,
        sample_duration: spec.sample_duration,
        scale: config.scale.as_ref(),
        format: &config.format,
    })
}

/// [`generate_with`] on the real FFmpeg toolchain.
pub fn generate_preview(source: &str, config: &PreviewConfig) -> Result<PreviewArtifact, AppError> {
    let engine = FfmpegEngine::new(config.temp_dir.clone(), !config.debug);
    generate_with(&engine, source, config)
}
