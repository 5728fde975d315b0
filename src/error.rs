use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the narration and composition pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Only ever raised by the segmenter; compose downgrades it to "no captions".
    #[error("No captionable content")]
    NoCaptionableContent,

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Audio normalization failed: {0}")]
    AudioNormalizationFailed(String),

    #[error("Could not determine audio duration: {0}")]
    DurationUnknown(String),

    #[error("Video creation failed: {0}")]
    CompositionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Status code the failure maps to at the request boundary.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            _ => 500,
        }
    }

    /// Short, stable headline for the error payload.
    #[must_use]
    pub fn headline(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "Invalid input",
            Self::NoCaptionableContent => "No captionable content",
            Self::SynthesisFailed(_) => "Speech synthesis failed",
            Self::AudioNormalizationFailed(_) => "Audio normalization failed",
            Self::DurationUnknown(_) => "Could not determine audio duration",
            Self::CompositionFailed(_) => "Video creation failed",
            Self::Io(_) => "Artifact store error",
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::InvalidInput(d)
            | Self::SynthesisFailed(d)
            | Self::AudioNormalizationFailed(d)
            | Self::DurationUnknown(d)
            | Self::CompositionFailed(d) => Some(d.clone()),
            Self::Io(e) => Some(e.to_string()),
            Self::NoCaptionableContent => None,
        }
    }
}

/// Wraps a collaborator error with its full cause chain for operators.
pub(crate) fn diagnostic(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

/// Structured error payload returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.headline().to_string(),
            details: err.details(),
        }
    }
}
