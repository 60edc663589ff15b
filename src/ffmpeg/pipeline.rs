//! Preview pipeline description: source → trims → concat → optional scale → encode.
//!
//! The pipeline is a plain list of stages so it can be inspected and tested without
//! spawning FFmpeg. `to_args` renders it as one `-filter_complex` invocation.

use std::path::{Path, PathBuf};

use super::{OutputFormat, ScaleSpec, path_to_string};
use crate::error::AppError;

/// Label of the final video stream in the filter graph.
const OUTPUT_LABEL: &str = "out";
const CONCAT_LABEL: &str = "cat";

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// `start`/`duration` in source seconds; output timestamps restart at zero.
    Trim {
        index: usize,
        start: f64,
        duration: f64,
    },
    Concat {
        segments: usize,
    },
    Scale(ScaleSpec),
    Encode {
        format: OutputFormat,
    },
}

#[derive(Debug, Clone)]
pub struct PreviewPipeline {
    input: String,
    output: PathBuf,
    stages: Vec<Stage>,
    quiet: bool,
}

/// Seconds with microsecond precision and no trailing zeros ("0", "1.25", "6").
fn format_seconds(secs: f64) -> String {
    let rounded = (secs * 1_000_000.0).round() / 1_000_000.0;
    format!("{}", rounded)
}

impl PreviewPipeline {
    pub fn new(
        input: &str,
        offsets: &[f64],
        sample_duration: f64,
        scale: Option<&ScaleSpec>,
        format: &OutputFormat,
        output: &Path,
    ) -> Result<Self, AppError> {
        if offsets.is_empty() {
            return Err(AppError::from("No sample offsets to trim"));
        }
        if !sample_duration.is_finite() || sample_duration <= 0.0 {
            return Err(AppError::from(format!(
                "Invalid sample duration: {}",
                sample_duration
            )));
        }
        if let Some(bad) = offsets.iter().find(|o| !o.is_finite() || **o < 0.0) {
            return Err(AppError::from(format!("Invalid sample offset: {}", bad)));
        }

        let mut stages: Vec<Stage> = offsets
            .iter()
            .enumerate()
            .map(|(index, &start)| Stage::Trim {
                index,
                start,
                duration: sample_duration,
            })
            .collect();
        stages.push(Stage::Concat {
            segments: offsets.len(),
        });
        if let Some(scale) = scale {
            stages.push(Stage::Scale(*scale));
        }
        stages.push(Stage::Encode {
            format: format.clone(),
        });

        log::debug!(
            target: "video_preview::ffmpeg::pipeline",
            "Building preview pipeline: input={}, segments={}, sample_duration={}, scale={:?}, format={} -> output={}",
            input,
            offsets.len(),
            sample_duration,
            scale.map(ToString::to_string),
            format,
            output.display()
        );

        Ok(Self {
            input: input.to_string(),
            output: output.to_path_buf(),
            stages,
            quiet: true,
        })
    }

    /// When false, FFmpeg logs at its default level instead of `error`.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Trim starts in playback order.
    pub fn segment_starts(&self) -> Vec<f64> {
        self.stages
            .iter()
            .filter_map(|stage| match stage {
                Stage::Trim { start, .. } => Some(*start),
                _ => None,
            })
            .collect()
    }

    /// Nominal output length. Short sources may produce less when trims run past the end.
    pub fn nominal_output_seconds(&self) -> f64 {
        self.stages
            .iter()
            .map(|stage| match stage {
                Stage::Trim { duration, .. } => *duration,
                _ => 0.0,
            })
            .sum()
    }

    fn format(&self) -> Option<&OutputFormat> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Encode { format } => Some(format),
            _ => None,
        })
    }

    pub fn filter_graph(&self) -> String {
        let mut chains = Vec::with_capacity(self.stages.len());
        let mut trim_labels = Vec::new();
        let mut last_label = String::new();
        for stage in &self.stages {
            match stage {
                Stage::Trim {
                    index,
                    start,
                    duration,
                } => {
                    let label = format!("s{}", index);
                    chains.push(format!(
                        "[0:v]trim=start={}:duration={},setpts=PTS-STARTPTS[{}]",
                        format_seconds(*start),
                        format_seconds(*duration),
                        label
                    ));
                    trim_labels.push(label);
                }
                Stage::Concat { segments } => {
                    let inputs: String = trim_labels.iter().map(|l| format!("[{}]", l)).collect();
                    chains.push(format!(
                        "{}concat=n={}:v=1:a=0[{}]",
                        inputs, segments, CONCAT_LABEL
                    ));
                    last_label = CONCAT_LABEL.to_string();
                }
                Stage::Scale(scale) => {
                    chains.push(format!(
                        "[{}]scale={}[{}]",
                        last_label,
                        scale.filter_args(),
                        OUTPUT_LABEL
                    ));
                    last_label = OUTPUT_LABEL.to_string();
                }
                Stage::Encode { .. } => {}
            }
        }
        if last_label != OUTPUT_LABEL {
            // Rename the concat output so `-map` always targets the same label.
            chains.push(format!("[{}]null[{}]", last_label, OUTPUT_LABEL));
        }
        chains.join(";")
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-nostdin".to_string(),
            "-hide_banner".to_string(),
            "-y".to_string(),
        ];
        if self.quiet {
            args.extend(["-loglevel".to_string(), "error".to_string()]);
        }
        args.extend([
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-nostats".to_string(),
            "-i".to_string(),
            self.input.clone(),
            "-filter_complex".to_string(),
            self.filter_graph(),
            "-map".to_string(),
            format!("[{}]", OUTPUT_LABEL),
        ]);
        if let Some(format) = self.format() {
            args.extend(["-f".to_string(), format.as_str().to_string()]);
            if format.wants_faststart() {
                args.extend(["-movflags".to_string(), "+faststart".to_string()]);
            }
        }
        args.push(path_to_string(&self.output));
        args
    }
}

/// Formats args for readable display: option and value on the same line when the next arg is a value.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    let mut lines = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match iter.peek() {
            Some(value) if arg.starts_with('-') && !value.starts_with('-') => {
                lines.push(format!("  {} {}", arg, value));
                iter.next();
            }
            _ => lines.push(format!("  {}", arg)),
        }
    }
    lines.join("\n")
}
