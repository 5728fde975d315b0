//! Text to narrated short-form video.
//!
//! Speech is synthesized from text, optionally time-stretched, then
//! composited over a still or moving background with burned-in captions.

pub mod audio;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod subtitle;
pub mod tts;
pub mod utils;

pub use config::Config;
pub use error::{ErrorResponse, PipelineError};
pub use pipeline::Orchestrator;
