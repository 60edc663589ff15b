//! Request source resolution: `url` or storage `key` to a fetchable source, plus the
//! reachability check that runs before probing.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::storage::ObjectStore;

/// Lifetime of presigned GET URLs for `key` requests.
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(3600);
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(10);
const FALLBACK_STEM: &str = "preview";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Url(String),
    Key(String),
}

impl PreviewRequest {
    /// `url` wins when both fields are present. Blank values count as absent.
    pub fn source_ref(&self) -> Result<SourceRef, AppError> {
        let pick = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        if let Some(url) = pick(&self.url) {
            return Ok(SourceRef::Url(url));
        }
        if let Some(key) = pick(&self.key) {
            return Ok(SourceRef::Key(key));
        }
        Err(AppError::input("Request must contain either 'url' or 'key' field"))
    }
}

/// Turns a source reference into something FFmpeg can open. Keys must exist in
/// the store before they are presigned.
pub fn resolve_source(
    source: &SourceRef,
    storage: Option<&dyn ObjectStore>,
) -> Result<String, AppError> {
    match source {
        SourceRef::Url(url) => Ok(url.clone()),
        SourceRef::Key(key) => {
            let storage = storage.ok_or_else(|| {
                AppError::Config("Object storage is not configured; cannot resolve 'key'".into())
            })?;
            storage.ensure_exists(key)?;
            storage.presign_get(key, PRESIGNED_URL_TTL)
        }
    }
}

fn is_http(source: &str) -> bool {
    url::Url::parse(source)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Local path for `file://` URLs and bare paths; `None` for remote sources.
fn local_path(source: &str) -> Option<std::path::PathBuf> {
    match url::Url::parse(source) {
        Ok(u) if u.scheme() == "file" => u.to_file_path().ok(),
        // Single-letter schemes are Windows drive letters.
        Ok(u) if u.scheme().len() > 1 => None,
        _ => Some(Path::new(source).to_path_buf()),
    }
}

pub trait Reachability: Send + Sync {
    fn check(&self, source: &str) -> Result<(), AppError>;
}

/// HEAD request for http(s) sources, existence check for local files.
/// Other schemes are left for the probe to judge.
pub struct HttpReachability {
    client: reqwest::blocking::Client,
}

impl HttpReachability {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REACHABILITY_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Reachability for HttpReachability {
    fn check(&self, source: &str) -> Result<(), AppError> {
        if is_http(source) {
            let response = self.client.head(source).send().map_err(|e| {
                AppError::input(format!("Cannot access video URL: Error accessing URL: {}", e))
            })?;
            let status = response.status();
            if status.as_u16() >= 400 {
                return Err(AppError::input(format!(
                    "Cannot access video URL: URL returned status code {}",
                    status.as_u16()
                )));
            }
            return Ok(());
        }
        match local_path(source) {
            Some(path) if !path.is_file() => Err(AppError::input(format!(
                "Cannot access video URL: {} does not exist",
                path.display()
            ))),
            _ => Ok(()),
        }
    }
}

/// File stem of the source's last path segment; query strings and fragments are ignored.
pub fn output_stem(source: &str) -> String {
    let last_segment = match url::Url::parse(source) {
        Ok(u) if u.scheme().len() > 1 => u
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(percent_decode),
        _ => Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().to_string()),
    };
    last_segment
        .as_deref()
        .map(|name| Path::new(name))
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty() && !stem.starts_with('.'))
        .unwrap_or_else(|| FALLBACK_STEM.to_string())
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeStore {
        presigned: Mutex<Vec<(String, Duration)>>,
        missing: bool,
    }

    impl ObjectStore for FakeStore {
        fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
            self.presigned.lock().push((key.to_string(), expires_in));
            Ok(format!("https://bucket.example/{}?X-Amz-Signature=abc", key))
        }

        fn ensure_exists(&self, key: &str) -> Result<(), AppError> {
            if self.missing {
                return Err(AppError::input(format!(
                    "Cannot access video URL: object '{}' not found (status code 404)",
                    key
                )));
            }
            Ok(())
        }

        fn upload(&self, _key: &str, _path: &Path, _content_type: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn request(url: Option<&str>, key: Option<&str>) -> PreviewRequest {
        PreviewRequest {
            url: url.map(str::to_string),
            key: key.map(str::to_string),
        }
    }

    #[test]
    fn url_takes_precedence_over_key() {
        let r = request(Some("https://x/a.mp4"), Some("a.mp4"));
        assert_eq!(r.source_ref().unwrap(), SourceRef::Url("https://x/a.mp4".into()));
    }

    #[test]
    fn key_used_when_url_missing_or_blank() {
        let r = request(Some("  "), Some("videos/a.mp4"));
        assert_eq!(r.source_ref().unwrap(), SourceRef::Key("videos/a.mp4".into()));
    }

    #[test]
    fn neither_field_is_input_error() {
        let err = request(None, None).source_ref().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.to_string(),
            "Request must contain either 'url' or 'key' field"
        );
    }

    #[test]
    fn key_is_presigned_for_an_hour() {
        let store = FakeStore::default();
        let url = resolve_source(&SourceRef::Key("videos/a.mp4".into()), Some(&store)).unwrap();
        assert_eq!(url, "https://bucket.example/videos/a.mp4?X-Amz-Signature=abc");
        assert_eq!(
            store.presigned.lock().as_slice(),
            &[("videos/a.mp4".to_string(), Duration::from_secs(3600))]
        );
    }

    #[test]
    fn missing_key_is_input_error_and_never_presigned() {
        let store = FakeStore {
            missing: true,
            ..FakeStore::default()
        };
        let err = resolve_source(&SourceRef::Key("does/not/exist.mp4".into()), Some(&store))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Cannot access video URL"));
        assert!(store.presigned.lock().is_empty());
    }

    #[test]
    fn key_without_storage_is_server_error() {
        let err = resolve_source(&SourceRef::Key("a.mp4".into()), None).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn output_stem_ignores_query_string() {
        assert_eq!(
            output_stem("https://bucket.example/videos/cat.mp4?X-Amz-Signature=abc&x=y.z"),
            "cat"
        );
        assert_eq!(output_stem("https://example.com/a/b/My%20Clip.final.mov"), "My Clip.final");
        assert_eq!(output_stem("/tmp/input.mp4"), "input");
        assert_eq!(output_stem("file:///tmp/holiday.mkv"), "holiday");
    }

    #[test]
    fn output_stem_falls_back_when_path_has_no_name() {
        assert_eq!(output_stem("https://example.com/"), "preview");
        assert_eq!(output_stem("https://example.com"), "preview");
        assert_eq!(output_stem(""), "preview");
    }

    #[test]
    fn local_sources_must_exist() {
        let reach = HttpReachability::new().unwrap();
        let dir = tempfile::tempdir().expect("tempdir");
        let existing = dir.path().join("in.mp4");
        std::fs::write(&existing, b"x").unwrap();
        assert!(reach.check(existing.to_str().unwrap()).is_ok());

        let missing = dir.path().join("missing.mp4");
        let err = reach.check(missing.to_str().unwrap()).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn unreachable_http_source_is_input_error() {
        let reach = HttpReachability::new().unwrap();
        // Port 9 (discard) on localhost is closed on test hosts; connection is refused fast.
        let err = reach.check("http://127.0.0.1:9/video.mp4").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Cannot access video URL"));
    }
}
