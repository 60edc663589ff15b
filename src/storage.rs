//! Object storage collaborator.
//!
//! `S3Storage` is constructed explicitly by the caller and handed to the handler as
//! `Arc<dyn ObjectStore>`. Credentials come from the function's secret files when
//! present, otherwise from the default AWS provider chain.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::PreviewConfig;
use crate::error::AppError;

pub const ACCESS_KEY_SECRET: &str = "video-preview-s3-key";
pub const SECRET_KEY_SECRET: &str = "video-preview-s3-secret";

pub trait ObjectStore: Send + Sync {
    /// Short-lived GET URL for a private object.
    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, AppError>;

    /// Fails with an input error when the object is missing or not readable.
    fn ensure_exists(&self, key: &str) -> Result<(), AppError>;

    fn upload(&self, key: &str, path: &Path, content_type: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

fn read_secret(path: &Path) -> Result<String, AppError> {
    let value = fs::read_to_string(path).map_err(|e| {
        AppError::Storage(format!("Failed to read secret {}: {}", path.display(), e))
    })?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::Storage(format!(
            "Secret {} is empty",
            path.display()
        )));
    }
    Ok(value)
}

impl S3Credentials {
    /// Reads `video-preview-s3-key` and `video-preview-s3-secret` from `dir`.
    /// Returns `Ok(None)` when neither file exists.
    pub fn from_secrets_dir(dir: &Path) -> Result<Option<Self>, AppError> {
        let key_path: PathBuf = dir.join(ACCESS_KEY_SECRET);
        let secret_path: PathBuf = dir.join(SECRET_KEY_SECRET);
        if !key_path.exists() && !secret_path.exists() {
            return Ok(None);
        }
        Ok(Some(Self {
            access_key_id: read_secret(&key_path)?,
            secret_access_key: read_secret(&secret_path)?,
        }))
    }
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    runtime: tokio::runtime::Runtime,
}

/// HEAD-object failures: 404 and 403 are the caller's key, anything else is ours.
fn head_object_error(key: &str, status: Option<u16>, detail: &str) -> AppError {
    match status {
        Some(code @ (403 | 404)) => AppError::input(format!(
            "Cannot access video URL: object '{}' not found (status code {})",
            key, code
        )),
        _ => AppError::Storage(format!("Failed to look up object {}: {}", key, detail)),
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, AppError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("video-preview-s3")
        .enable_all()
        .build()
        .map_err(|e| AppError::Storage(format!("Failed to initialize async runtime: {}", e)))
}

impl S3Storage {
    /// Builds a client for `config.s3_bucket`. Fails when no bucket is configured.
    pub fn connect(config: &PreviewConfig) -> Result<Self, AppError> {
        let bucket = config
            .s3_bucket
            .clone()
            .ok_or_else(|| AppError::Config("s3_bucket is not set".to_string()))?;
        let credentials = S3Credentials::from_secrets_dir(&config.secrets_dir)?;
        let runtime = build_runtime()?;

        let region = Region::new(config.s3_region.clone());
        let mut builder = match credentials {
            Some(creds) => {
                log::info!(
                    target: "video_preview::storage",
                    "Using S3 credentials from {}",
                    config.secrets_dir.display()
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(Credentials::new(
                        creds.access_key_id,
                        creds.secret_access_key,
                        None,
                        None,
                        "video-preview-secrets",
                    ))
            }
            None => {
                log::info!(
                    target: "video_preview::storage",
                    "No S3 secrets in {}; using default AWS credential chain",
                    config.secrets_dir.display()
                );
                let shared = runtime.block_on(
                    aws_config::defaults(BehaviorVersion::latest())
                        .region(region)
                        .load(),
                );
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };
        if let Some(endpoint) = &config.s3_endpoint_url {
            // Custom endpoints (MinIO and friends) expect path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket,
            runtime,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn block_on<T>(&self, future: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
        self.runtime.block_on(future)
    }
}

impl ObjectStore for S3Storage {
    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        self.block_on(async {
            let presigning = PresigningConfig::expires_in(expires_in)
                .map_err(|e| AppError::Storage(format!("Invalid presign expiry: {}", e)))?;
            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|e| {
                    log::error!(
                        target: "video_preview::storage",
                        "Failed to generate presigned URL for {}: {}",
                        key,
                        e
                    );
                    AppError::Storage(format!("Failed to generate presigned URL: {}", e))
                })?;
            log::info!(
                target: "video_preview::storage",
                "Generated presigned URL for {}",
                key
            );
            Ok(request.uri().to_string())
        })
    }

    fn ensure_exists(&self, key: &str) -> Result<(), AppError> {
        self.block_on(async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    let status = match e.as_service_error() {
                        Some(service) if service.is_not_found() => Some(404),
                        _ => e.raw_response().map(|r| r.status().as_u16()),
                    };
                    log::warn!(
                        target: "video_preview::storage",
                        "HEAD s3://{}/{} failed: {}",
                        self.bucket,
                        key,
                        e
                    );
                    head_object_error(key, status, &e.to_string())
                })?;
            Ok(())
        })
    }

    fn upload(&self, key: &str, path: &Path, content_type: &str) -> Result<(), AppError> {
        let bytes = fs::read(path)
            .map_err(|e| AppError::Delivery(format!("Failed to read {}: {}", path.display(), e)))?;
        let size = bytes.len();
        self.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|e| AppError::Delivery(format!("Failed to upload {}: {}", key, e)))?;
            Ok(())
        })?;
        log::info!(
            target: "video_preview::storage",
            "Uploaded {} bytes to s3://{}/{}",
            size,
            self.bucket,
            key
        );
        Ok(())
    }
}
