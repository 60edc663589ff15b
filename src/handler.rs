//! Request/response function: source → reachability → probe → sample → compose → deliver.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;

use crate::composer::{FfmpegEngine, MediaEngine, generate_with};
use crate::config::{Delivery, PreviewConfig};
use crate::error::AppError;
use crate::ffmpeg::PreviewArtifact;
use crate::source::{
    HttpReachability, PreviewRequest, Reachability, SourceRef, output_stem, resolve_source,
};
use crate::storage::ObjectStore;

pub const SUCCESS_MESSAGE: &str = "Video preview generated successfully";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Success {
        message: String,
        filename: String,
        content_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    Failure {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody,
}

impl PreviewResponse {
    fn from_error(err: &AppError) -> Self {
        let status_code = err.status_code();
        if err.is_client_fault() {
            log::warn!(target: "video_preview::handler", "Rejected request: {}", err);
        } else {
            log::error!(target: "video_preview::handler", "Preview failed: {}", err);
        }
        Self {
            status_code,
            body: ResponseBody::Failure {
                error: error_text(err),
            },
        }
    }
}

/// Pipeline failures are reported by their one-line summary; everything else by Display.
fn error_text(err: &AppError) -> String {
    match err {
        AppError::PipelineFailed { code: -1, stderr } => {
            format!("Failed to generate video preview: {}", stderr)
        }
        AppError::PipelineFailed { code, stderr } => {
            let payload = crate::ffmpeg::parse_ffmpeg_error(stderr, Some(*code));
            format!("Failed to generate video preview: {}", payload.summary)
        }
        other => other.to_string(),
    }
}

/// Holds the collaborators for every request. Cheap to share across worker threads.
pub struct PreviewHandler {
    config: PreviewConfig,
    storage: Option<Arc<dyn ObjectStore>>,
    reachability: Arc<dyn Reachability>,
    engine: Arc<dyn MediaEngine>,
}

impl PreviewHandler {
    pub fn new(
        config: PreviewConfig,
        storage: Option<Arc<dyn ObjectStore>>,
        reachability: Arc<dyn Reachability>,
        engine: Arc<dyn MediaEngine>,
    ) -> Self {
        Self {
            config,
            storage,
            reachability,
            engine,
        }
    }

    /// Handler backed by FFmpeg and a HEAD-request reachability check.
    pub fn with_defaults(
        config: PreviewConfig,
        storage: Option<Arc<dyn ObjectStore>>,
    ) -> Result<Self, AppError> {
        let engine = FfmpegEngine::new(config.temp_dir.clone(), !config.debug);
        Ok(Self::new(
            config,
            storage,
            Arc::new(HttpReachability::new()?),
            Arc::new(engine),
        ))
    }

    /// Raw request text. Unparsable JSON is a 400.
    pub fn handle_str(&self, raw: &str) -> PreviewResponse {
        match serde_json::from_str::<Value>(raw) {
            Ok(body) => self.handle(&body),
            Err(e) => {
                PreviewResponse::from_error(&AppError::input(format!("Invalid JSON body: {}", e)))
            }
        }
    }

    pub fn handle(&self, body: &Value) -> PreviewResponse {
        match self.process(body) {
            Ok(response) => response,
            Err(err) => PreviewResponse::from_error(&err),
        }
    }

    fn process(&self, body: &Value) -> Result<PreviewResponse, AppError> {
        let request: PreviewRequest = serde_json::from_value(body.clone())
            .map_err(|e| AppError::input(format!("Invalid request body: {}", e)))?;
        let source_ref = request.source_ref()?;

        let version = self.engine.check_available()?;
        log::debug!(target: "video_preview::handler", "Using {}", version);

        let source = resolve_source(&source_ref, self.storage.as_deref())?;
        // Presigned GET URLs reject HEAD; keys were checked against the store instead.
        if let SourceRef::Url(_) = source_ref {
            self.reachability.check(&source)?;
        }

        let stem = match &source_ref {
            SourceRef::Url(url) => output_stem(url),
            SourceRef::Key(key) => output_stem(key),
        };
        let filename = format!("{}.{}", stem, self.config.format.extension());
        log::info!(
            target: "video_preview::handler",
            "Generating preview {} from {:?}",
            filename,
            source_ref
        );

        let artifact = generate_with(self.engine.as_ref(), &source, &self.config)?;
        self.deliver(artifact, filename)
    }

    fn deliver(
        &self,
        artifact: PreviewArtifact,
        filename: String,
    ) -> Result<PreviewResponse, AppError> {
        let content_type = artifact.format().content_type();
        let (content, key) = match self.config.delivery {
            Delivery::Inline => {
                let bytes = artifact.read_bytes().map_err(|e| {
                    AppError::Delivery(format!("Failed to read preview output: {}", e))
                })?;
                (Some(STANDARD.encode(&bytes)), None)
            }
            Delivery::Upload => {
                let storage = self.storage.as_ref().ok_or_else(|| {
                    AppError::Config("delivery=upload requires s3_bucket".to_string())
                })?;
                let key = self.config.output_key(&filename);
                storage.upload(&key, artifact.path(), &content_type)?;
                (None, Some(key))
            }
        };
        // Artifact is dropped (and removed) here regardless of delivery mode.
        drop(artifact);

        Ok(PreviewResponse {
            status_code: 200,
            body: ResponseBody::Success {
                message: SUCCESS_MESSAGE.to_string(),
                filename,
                content_type,
                content,
                key,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::ComposeRequest;
    use crate::ffmpeg::OutputFormat;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeEngine {
        available: bool,
        duration: Result<f64, String>,
        dir: PathBuf,
        compose_calls: AtomicUsize,
        composed_sources: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new(dir: &Path) -> Self {
            Self {
                available: true,
                duration: Ok(20.0),
                dir: dir.to_path_buf(),
                compose_calls: AtomicUsize::new(0),
                composed_sources: Mutex::new(Vec::new()),
            }
        }
    }

    impl MediaEngine for FakeEngine {
        fn check_available(&self) -> Result<String, AppError> {
            if self.available {
                Ok("ffmpeg version fake".to_string())
            } else {
                Err(AppError::FfmpegNotFound(
                    "FFmpeg not properly installed".to_string(),
                ))
            }
        }

        fn probe_duration(&self, _source: &str) -> Result<f64, AppError> {
            self.duration.clone().map_err(AppError::probe)
        }

        fn compose(&self, request: &ComposeRequest<'_>) -> Result<PreviewArtifact, AppError> {
            let n = self.compose_calls.fetch_add(1, Ordering::SeqCst);
            self.composed_sources.lock().push(request.source.to_string());
            let path = self.dir.join(format!("out-{}.{}", n, request.format.extension()));
            std::fs::write(&path, b"fake preview bytes")?;
            Ok(PreviewArtifact::new(path, request.format.clone()))
        }
    }

    struct AlwaysReachable;

    impl Reachability for AlwaysReachable {
        fn check(&self, _source: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct NeverReachable;

    impl Reachability for NeverReachable {
        fn check(&self, _source: &str) -> Result<(), AppError> {
            Err(AppError::input(
                "Cannot access video URL: URL returned status code 404",
            ))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
        missing_keys: Vec<String>,
    }

    impl ObjectStore for MemoryStore {
        fn presign_get(&self, key: &str, _expires_in: Duration) -> Result<String, AppError> {
            Ok(format!("https://videos.s3.example/{}?X-Amz-Signature=sig", key))
        }

        fn ensure_exists(&self, key: &str) -> Result<(), AppError> {
            if self.missing_keys.iter().any(|k| k == key) {
                return Err(AppError::input(format!(
                    "Cannot access video URL: object '{}' not found (status code 404)",
                    key
                )));
            }
            Ok(())
        }

        fn upload(&self, key: &str, path: &Path, content_type: &str) -> Result<(), AppError> {
            let bytes = std::fs::read(path)?;
            self.uploads
                .lock()
                .push((key.to_string(), bytes, content_type.to_string()));
            Ok(())
        }
    }

    fn handler_with(
        config: PreviewConfig,
        engine: Arc<FakeEngine>,
        reachability: Arc<dyn Reachability>,
        storage: Option<Arc<dyn ObjectStore>>,
    ) -> PreviewHandler {
        PreviewHandler::new(config, storage, reachability, engine)
    }

    fn error_of(response: &PreviewResponse) -> &str {
        match &response.body {
            ResponseBody::Failure { error } => error,
            other => panic!("expected failure body, got {:?}", other),
        }
    }

    #[test]
    fn missing_url_and_key_is_400() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(FakeEngine::new(dir.path()));
        let handler = handler_with(
            PreviewConfig::default(),
            engine.clone(),
            Arc::new(AlwaysReachable),
            None,
        );
        let response = handler.handle(&json!({}));
        assert_eq!(response.status_code, 400);
        assert_eq!(
            error_of(&response),
            "Request must contain either 'url' or 'key' field"
        );
        assert_eq!(engine.compose_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_json_is_400() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = handler_with(
            PreviewConfig::default(),
            Arc::new(FakeEngine::new(dir.path())),
            Arc::new(AlwaysReachable),
            None,
        );
        let response = handler.handle_str("{not json");
        assert_eq!(response.status_code, 400);
        assert!(error_of(&response).starts_with("Invalid JSON body"));
    }

    #[test]
    fn unreachable_source_is_400() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(FakeEngine::new(dir.path()));
        let handler = handler_with(
            PreviewConfig::default(),
            engine.clone(),
            Arc::new(NeverReachable),
            None,
        );
        let response = handler.handle(&json!({"url": "https://example.com/missing.mp4"}));
        assert_eq!(response.status_code, 400);
        assert_eq!(engine.compose_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn probe_failure_is_500_and_pipeline_never_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = FakeEngine::new(dir.path());
        engine.duration = Err("source has no determinable duration".to_string());
        let engine = Arc::new(engine);
        let handler = handler_with(
            PreviewConfig::default(),
            engine.clone(),
            Arc::new(AlwaysReachable),
            None,
        );
        let response = handler.handle(&json!({"url": "https://example.com/a.mp4"}));
        assert_eq!(response.status_code, 500);
        assert_eq!(
            error_of(&response),
            "Failed to get video info: source has no determinable duration"
        );
        assert_eq!(engine.compose_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_ffmpeg_is_500() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = FakeEngine::new(dir.path());
        engine.available = false;
        let handler = handler_with(
            PreviewConfig::default(),
            Arc::new(engine),
            Arc::new(AlwaysReachable),
            None,
        );
        let response = handler.handle(&json!({"url": "https://example.com/a.mp4"}));
        assert_eq!(response.status_code, 500);
        assert!(error_of(&response).contains("FFmpeg not properly installed"));
    }

    #[test]
    fn inline_delivery_returns_base64_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(FakeEngine::new(dir.path()));
        let handler = handler_with(
            PreviewConfig::default(),
            engine.clone(),
            Arc::new(AlwaysReachable),
            None,
        );
        let response =
            handler.handle_str(r#"{"url": "https://cdn.example.com/media/cat.mov?token=abc"}"#);
        assert_eq!(response.status_code, 200);
        let ResponseBody::Success {
            message,
            filename,
            content_type,
            content,
            key,
        } = &response.body
        else {
            panic!("expected success, got {:?}", response.body);
        };
        assert_eq!(message, SUCCESS_MESSAGE);
        assert_eq!(filename, "cat.mp4");
        assert_eq!(content_type, "video/mp4");
        assert_eq!(key, &None);
        let decoded = STANDARD.decode(content.as_deref().unwrap()).unwrap();
        assert_eq!(decoded, b"fake preview bytes");
        // The temp artifact does not outlive the request.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn key_request_is_presigned_and_skips_head_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(FakeEngine::new(dir.path()));
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::default());
        let handler = handler_with(
            PreviewConfig::default(),
            engine.clone(),
            Arc::new(NeverReachable),
            Some(store),
        );
        let response = handler.handle(&json!({"key": "uploads/dog.mp4"}));
        assert_eq!(response.status_code, 200);
        assert_eq!(
            engine.composed_sources.lock().as_slice(),
            &["https://videos.s3.example/uploads/dog.mp4?X-Amz-Signature=sig".to_string()]
        );
        let ResponseBody::Success { filename, .. } = &response.body else {
            panic!("expected success");
        };
        assert_eq!(filename, "dog.mp4");
    }

    #[test]
    fn missing_key_is_400_and_pipeline_never_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = FakeEngine::new(dir.path());
        engine.duration = Err("Server returned 404 Not Found".to_string());
        let engine = Arc::new(engine);
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore {
            missing_keys: vec!["does/not/exist.mp4".to_string()],
            ..MemoryStore::default()
        });
        let handler = handler_with(
            PreviewConfig::default(),
            engine.clone(),
            Arc::new(AlwaysReachable),
            Some(store),
        );
        let response = handler.handle(&json!({"key": "does/not/exist.mp4"}));
        assert_eq!(response.status_code, 400);
        assert!(
            error_of(&response).starts_with("Cannot access video URL"),
            "{}",
            error_of(&response)
        );
        assert_eq!(engine.compose_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn upload_delivery_stores_under_output_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Arc::new(FakeEngine::new(dir.path()));
        let store = Arc::new(MemoryStore::default());
        let config = PreviewConfig {
            delivery: Delivery::Upload,
            format: OutputFormat::new("webm").unwrap(),
            ..PreviewConfig::default()
        };
        let handler = handler_with(
            config,
            engine,
            Arc::new(AlwaysReachable),
            Some(store.clone() as Arc<dyn ObjectStore>),
        );
        let response = handler.handle(&json!({"url": "https://example.com/v/clip.mp4"}));
        assert_eq!(response.status_code, 200);
        let ResponseBody::Success {
            filename,
            content_type,
            content,
            key,
            ..
        } = &response.body
        else {
            panic!("expected success");
        };
        assert_eq!(filename, "clip.webm");
        assert_eq!(content_type, "video/webm");
        assert_eq!(content, &None);
        assert_eq!(key.as_deref(), Some("output/clip.webm"));
        let uploads = store.uploads.lock();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "output/clip.webm");
        assert_eq!(uploads[0].1, b"fake preview bytes");
        assert_eq!(uploads[0].2, "video/webm");
    }

    #[test]
    fn response_serializes_with_status_code_field() {
        let response = PreviewResponse {
            status_code: 400,
            body: ResponseBody::Failure {
                error: "bad".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 400, "body": {"error": "bad"}})
        );
    }

    #[test]
    fn pipeline_failures_are_reported_by_summary() {
        let err = AppError::pipeline_failed(1, "Error opening input file x.mp4");
        let text = error_text(&err);
        assert!(text.starts_with("Failed to generate video preview: "), "{}", text);
        assert!(!text.contains('\n'));
    }
}
