use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::OutputFormat;

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// Stateless factory for per-invocation output paths. Names combine time, pid and a
/// process-wide counter, so concurrent previews never share a location.
#[derive(Debug, Clone, Default)]
pub struct TempFileManager {
    dir: Option<PathBuf>,
}

impl TempFileManager {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Returns a fresh path ending in `suffix`. The file itself is not created.
    pub fn create(&self, suffix: &str) -> io::Result<PathBuf> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let name = format!(
            "video-preview-{}-{}-{}-{}",
            millis,
            std::process::id(),
            NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed),
            suffix
        );
        Ok(dir.join(name))
    }
}

/// Encoded preview on local storage. The file is removed on drop.
#[derive(Debug)]
pub struct PreviewArtifact {
    path: PathBuf,
    format: OutputFormat,
}

impl PreviewArtifact {
    pub fn new(path: PathBuf, format: OutputFormat) -> Self {
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

impl Drop for PreviewArtifact {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
