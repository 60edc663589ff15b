//! Sample offset selection.
//!
//! Picks `count` start times spread over a video so that the preview covers
//! its whole length. Two regimes:
//! - short video (`duration <= count * sample_duration`): offsets spread over the
//!   full duration; samples may overlap or run past the end.
//! - long video: offsets spread over `[0, duration - sample_duration]`, so the first
//!   sample starts at 0 and the last one ends exactly at `duration`.

use crate::error::AppError;

/// Number of samples and the length of each one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSpec {
    pub count: u32,
    pub sample_duration: f64,
}

impl SampleSpec {
    pub fn new(count: u32, sample_duration: f64) -> Result<Self, AppError> {
        if count == 0 {
            return Err(AppError::input("samples must be at least 1"));
        }
        if !sample_duration.is_finite() || sample_duration <= 0.0 {
            return Err(AppError::input(format!(
                "sample_duration must be a positive number of seconds, got {}",
                sample_duration
            )));
        }
        Ok(Self {
            count,
            sample_duration,
        })
    }

    /// Total requested sample time.
    pub fn total_seconds(&self) -> f64 {
        self.count as f64 * self.sample_duration
    }

    pub fn regime(&self, duration: f64) -> Regime {
        if duration <= self.total_seconds() {
            Regime::ShortVideo
        } else {
            Regime::LongVideo
        }
    }

    pub fn offsets(&self, duration: f64) -> Vec<f64> {
        compute_offsets(duration, self.count, self.sample_duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    ShortVideo,
    LongVideo,
}

/// Equality goes to the short-video regime.
pub fn select_regime(duration: f64, count: u32, sample_duration: f64) -> Regime {
    SampleSpec {
        count,
        sample_duration,
    }
    .regime(duration)
}

/// Start offsets (seconds) for each sample, ascending, one per sample.
///
/// Callers must pass `count >= 1` and `sample_duration > 0`. A zero or negative
/// `duration` yields all-zero offsets.
pub fn compute_offsets(duration: f64, count: u32, sample_duration: f64) -> Vec<f64> {
    let interval = match select_regime(duration, count, sample_duration) {
        Regime::ShortVideo => {
            if duration > 0.0 {
                duration / count as f64
            } else {
                0.0
            }
        }
        Regime::LongVideo => {
            if count > 1 {
                (duration - sample_duration) / (count - 1) as f64
            } else {
                0.0
            }
        }
    };
    (0..count).map(|i| i as f64 * interval).collect()
}
