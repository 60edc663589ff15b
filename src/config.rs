//! Preview configuration.
//!
//! Built once by the caller (normally from the process environment) and passed
//! explicitly into every request. Variable names match the function's deployment
//! environment: `samples`, `sample_duration`, `scale`, `format`, `s3_bucket`, ...

use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AppError;
use crate::ffmpeg::{OutputFormat, ScaleSpec};
use crate::sampler::SampleSpec;

pub const DEFAULT_SAMPLES: u32 = 4;
pub const DEFAULT_SAMPLE_DURATION_SECS: f64 = 2.0;
pub const DEFAULT_OUTPUT_PREFIX: &str = "output";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SECRETS_DIR: &str = "/var/openfaas/secrets";

/// Where a finished preview goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Base64 content in the response body.
    #[default]
    Inline,
    /// Uploaded under `s3_output_prefix`; the response carries the object key.
    Upload,
}

impl FromStr for Delivery {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "upload" | "s3" => Ok(Self::Upload),
            other => Err(AppError::Config(format!(
                "delivery must be 'inline' or 'upload', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub samples: u32,
    pub sample_duration: f64,
    pub scale: Option<ScaleSpec>,
    pub format: OutputFormat,
    pub delivery: Delivery,
    pub s3_bucket: Option<String>,
    pub s3_output_prefix: String,
    pub s3_endpoint_url: Option<String>,
    pub s3_region: String,
    pub secrets_dir: PathBuf,
    /// Output directory for intermediate artifacts; system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    pub debug: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            sample_duration: DEFAULT_SAMPLE_DURATION_SECS,
            scale: None,
            format: OutputFormat::default(),
            delivery: Delivery::default(),
            s3_bucket: None,
            s3_output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            s3_endpoint_url: None,
            s3_region: DEFAULT_REGION.to_string(),
            secrets_dir: PathBuf::from(DEFAULT_SECRETS_DIR),
            temp_dir: None,
            debug: false,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", name, value)))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl PreviewConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any `name -> value` source. Unset or blank values keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |name: &str| non_empty(lookup(name));
        let mut config = Self::default();

        if let Some(v) = get("samples") {
            config.samples = parse_var("samples", &v)?;
        }
        if let Some(v) = get("sample_duration") {
            config.sample_duration = parse_var("sample_duration", &v)?;
        }
        if let Some(v) = get("scale") {
            config.scale = Some(
                v.parse::<ScaleSpec>()
                    .map_err(|e| AppError::Config(e.to_string()))?,
            );
        }
        if let Some(v) = get("format") {
            config.format = OutputFormat::new(&v).map_err(|e| AppError::Config(e.to_string()))?;
        }
        if let Some(v) = get("delivery") {
            config.delivery = v.parse()?;
        }
        config.s3_bucket = get("s3_bucket");
        if let Some(v) = get("s3_output_prefix") {
            config.s3_output_prefix = v.trim_matches('/').to_string();
        }
        config.s3_endpoint_url = get("s3_endpoint_url");
        if let Some(v) = get("s3_region") {
            config.s3_region = v;
        }
        if let Some(v) = get("secrets_dir") {
            config.secrets_dir = PathBuf::from(v);
        }
        config.temp_dir = get("temp_dir").map(PathBuf::from);
        config.debug = get("debug").is_some_and(|v| parse_bool(&v));

        config.sample_spec()?;
        Ok(config)
    }

    pub fn sample_spec(&self) -> Result<SampleSpec, AppError> {
        SampleSpec::new(self.samples, self.sample_duration)
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Object key for an uploaded preview named `filename`.
    pub fn output_key(&self, filename: &str) -> String {
        if self.s3_output_prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.s3_output_prefix, filename)
        }
    }
}
