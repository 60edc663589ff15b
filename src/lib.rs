pub mod composer;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod handler;
pub mod sampler;
pub mod source;
pub mod storage;

pub use composer::{FfmpegEngine, MediaEngine, generate_preview};
pub use config::{Delivery, PreviewConfig};
pub use handler::{PreviewHandler, PreviewResponse, ResponseBody};
pub use sampler::{SampleSpec, compute_offsets};
