//! Service configuration, optionally loaded from a TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One selectable voice for a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

impl Voice {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisBackend {
    /// Google Translate's TTS endpoint; voice ids are top-level domains.
    #[default]
    Google,
    /// Local `piper` binary; voice ids map to model files.
    Piper,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub artifact_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub synthesis_backend: SynthesisBackend,
    pub piper_binary: String,
    pub piper_models: BTreeMap<String, PathBuf>,
    pub command_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Language code to the voices offered for it.
    pub voices: BTreeMap<String, Vec<Voice>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("uploads"),
            ffmpeg_path: find_binary("ffmpeg"),
            ffprobe_path: find_binary("ffprobe"),
            synthesis_backend: SynthesisBackend::default(),
            piper_binary: find_binary("piper"),
            piper_models: BTreeMap::new(),
            command_timeout_secs: 300,
            http_timeout_secs: 30,
            voices: default_voices(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn is_known_voice(&self, lang: &str, voice: &str) -> bool {
        self.voices
            .get(lang)
            .is_some_and(|voices| voices.iter().any(|v| v.id == voice))
    }
}

fn find_binary(name: &str) -> String {
    which::which(name).map_or_else(|_| name.to_string(), |p| p.to_string_lossy().to_string())
}

fn default_voices() -> BTreeMap<String, Vec<Voice>> {
    let mut voices = BTreeMap::new();
    voices.insert(
        "en".to_string(),
        vec![
            Voice::new("com.au", "Australian"),
            Voice::new("co.uk", "British"),
            Voice::new("us", "American"),
            Voice::new("ca", "Canadian"),
            Voice::new("ind", "Indian"),
        ],
    );
    voices.insert("es".to_string(), vec![Voice::new("es", "Spanish")]);
    voices
}
