//! Request and response records at the service boundary.

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::store::download_ref;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Target canvas orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectMode {
    /// 16:9, 1920x1080
    #[default]
    Wide,
    /// 9:16, 1080x1920
    Tall,
}

impl AspectMode {
    pub fn parse(ratio: &str) -> Result<Self> {
        match ratio.trim() {
            "16:9" => Ok(Self::Wide),
            "9:16" => Ok(Self::Tall),
            other => Err(PipelineError::InvalidInput(format!(
                "unsupported aspect ratio: {other} (expected 16:9 or 9:16)"
            ))),
        }
    }

    #[must_use]
    pub fn ratio(&self) -> &'static str {
        match self {
            Self::Wide => "16:9",
            Self::Tall => "9:16",
        }
    }

    /// Canvas (width, height) in pixels.
    #[must_use]
    pub fn canvas(&self) -> (u32, u32) {
        match self {
            Self::Wide => (1920, 1080),
            Self::Tall => (1080, 1920),
        }
    }

    /// Caption (font size, vertical margin) for this canvas.
    #[must_use]
    pub fn caption_metrics(&self) -> (u32, u32) {
        match self {
            Self::Wide => (20, 30),
            Self::Tall => (28, 80),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NarrationRequest {
    pub text: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_voice() -> String {
    "us".to_string()
}

fn default_speed() -> f64 {
    1.0
}

impl NarrationRequest {
    pub fn validate(&self, config: &Config) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("No text provided".to_string()));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(PipelineError::InvalidInput(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if !config.is_known_voice(&self.lang, &self.voice) {
            return Err(PipelineError::InvalidInput(format!(
                "unknown voice '{}' for language '{}'",
                self.voice, self.lang
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CompositionRequest {
    /// Uploaded background, already placed in the artifact store
    pub background: PathBuf,
    /// Name of a narration artifact from an earlier synthesize call
    pub audio_filename: String,
    pub aspect: AspectMode,
    pub text: Option<String>,
}

impl CompositionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.audio_filename.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "No audio reference provided".to_string(),
            ));
        }
        Ok(())
    }

    /// Narration text worth captioning, if any.
    #[must_use]
    pub fn caption_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    pub path: PathBuf,
    /// Filled in once probed
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub aspect: AspectMode,
    pub duration: f64,
    pub captions: Option<CaptionArtifact>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionArtifact {
    pub path: PathBuf,
    pub srt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtsResponse {
    pub audio: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoResponse {
    pub video: String,
    pub aspect: String,
    pub captions: Option<String>,
    pub srt_file: Option<String>,
}

impl From<&AudioArtifact> for TtsResponse {
    fn from(audio: &AudioArtifact) -> Self {
        Self {
            audio: download_ref(&audio.path),
            filename: audio
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }
}

impl From<&VideoArtifact> for VideoResponse {
    fn from(video: &VideoArtifact) -> Self {
        Self {
            video: download_ref(&video.path),
            aspect: video.aspect.ratio().to_string(),
            captions: video.captions.as_ref().map(|c| c.srt.clone()),
            srt_file: video.captions.as_ref().map(|c| download_ref(&c.path)),
        }
    }
}
