use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use video_preview_core::error::AppError;
use video_preview_core::handler::{PreviewHandler, PreviewResponse, ResponseBody};
use video_preview_core::storage::{ObjectStore, S3Storage};
use video_preview_core::PreviewConfig;

#[derive(Debug, Deserialize)]
struct Envelope {
    id: u64,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Serialize)]
struct ResponseLine<'a> {
    id: u64,
    #[serde(flatten)]
    response: &'a PreviewResponse,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn respond(writer: &SharedWriter, id: u64, response: &PreviewResponse) {
    let line = ResponseLine { id, response };
    let mut guard = writer.lock();
    if let Err(e) = write_json_line(&mut *guard, &line) {
        log::error!(target: "video_preview::bin", "Failed to write response {}: {}", id, e);
    }
}

fn reject(writer: &SharedWriter, id: u64, message: String) {
    let response = PreviewResponse {
        status_code: 400,
        body: ResponseBody::Failure { error: message },
    };
    respond(writer, id, &response);
}

/// `{"id": n, "body": {...}}`, or a bare request object answered with id 0.
fn split_envelope(line: &str) -> Result<(u64, Value), serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("id").is_some() && value.get("body").is_some() {
        let envelope: Envelope = serde_json::from_value(value)?;
        Ok((envelope.id, envelope.body))
    } else {
        Ok((0, value))
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn connect_storage(config: &PreviewConfig) -> Result<Option<Arc<dyn ObjectStore>>, AppError> {
    if config.s3_bucket.is_none() {
        log::warn!(
            target: "video_preview::bin",
            "s3_bucket is not set; 'key' requests and upload delivery are unavailable"
        );
        return Ok(None);
    }
    let storage = S3Storage::connect(config)?;
    log::info!(target: "video_preview::bin", "Object storage bucket: {}", storage.bucket());
    let storage: Arc<dyn ObjectStore> = Arc::new(storage);
    Ok(Some(storage))
}

fn main() -> io::Result<()> {
    let config = match PreviewConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging(false);
            log::error!(target: "video_preview::bin", "{}", e);
            return Err(io::Error::other(e.to_string()));
        }
    };
    init_logging(config.debug);
    log::info!(
        target: "video_preview::bin",
        "Starting: samples={}, sample_duration={}, scale={}, format={}, delivery={:?}",
        config.samples,
        config.sample_duration,
        config
            .scale
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string()),
        config.format,
        config.delivery
    );

    let storage = connect_storage(&config).map_err(|e| io::Error::other(e.to_string()))?;
    let handler = Arc::new(
        PreviewHandler::with_defaults(config, storage)
            .map_err(|e| io::Error::other(e.to_string()))?,
    );

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let mut workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                reject(&stdout, 0, format!("Invalid input stream: {}", err));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (id, body) = match split_envelope(&line) {
            Ok(parts) => parts,
            Err(err) => {
                reject(&stdout, 0, format!("Invalid JSON body: {}", err));
                continue;
            }
        };

        let writer = Arc::clone(&stdout);
        let handler = Arc::clone(&handler);
        workers.push(thread::spawn(move || {
            let response = handler.handle(&body);
            respond(&writer, id, &response);
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}
