//! Interfaces to the external speech and transcoding engines.
//!
//! The orchestrator only talks to these traits, so tests can swap in
//! in-process fakes and the real engines can change without touching it.

use crate::audio::{AudioTarget, TempoChain};
use crate::models::AspectMode;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Extensions treated as still images; anything else is a motion clip.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// Frame rate used when looping a still image.
pub const STILL_FRAME_RATE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundKind {
    Still,
    Motion,
}

impl BackgroundKind {
    #[must_use]
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Still
        } else {
            Self::Motion
        }
    }
}

/// A single composition: background plus narration, optional burned captions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionSpec {
    pub background: PathBuf,
    pub background_kind: BackgroundKind,
    pub audio: PathBuf,
    pub duration: f64,
    pub aspect: AspectMode,
    pub captions: Option<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeSpec {
    /// Apply a chain of tempo stages in one pass
    AdjustTempo {
        input: PathBuf,
        output: PathBuf,
        chain: TempoChain,
    },
    /// Re-encode to a fixed codec, sample rate and channel layout
    NormalizeAudio {
        input: PathBuf,
        output: PathBuf,
        target: AudioTarget,
    },
    Compose(CompositionSpec),
}

impl TranscodeSpec {
    #[must_use]
    pub fn output(&self) -> &Path {
        match self {
            Self::AdjustTempo { output, .. } | Self::NormalizeAudio { output, .. } => output,
            Self::Compose(spec) => &spec.output,
        }
    }
}

/// Text-to-speech engine: text, language and voice in, audio file out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// File extension of the audio this engine writes.
    fn extension(&self) -> &'static str;

    async fn synthesize_speech(
        &self,
        text: &str,
        lang: &str,
        voice: &str,
        out: &Path,
    ) -> Result<()>;
}

/// Media transcoding engine with a duration probe.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run the operation; on success its output file exists.
    async fn transcode(&self, spec: &TranscodeSpec) -> Result<PathBuf>;

    /// Duration in seconds, or `None` if the container reports none.
    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>>;
}
