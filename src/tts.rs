//! [`SpeechSynthesizer`] implementations.

use crate::config::{Config, SynthesisBackend};
use crate::ffmpeg::check_status;
use crate::media::SpeechSynthesizer;
use crate::utils::chunk_text;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

/// The translate endpoint rejects longer queries.
const GOOGLE_MAX_CHARS: usize = 100;

/// Build the synthesizer selected in the config.
pub fn from_config(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    let synthesizer: Arc<dyn SpeechSynthesizer> = match config.synthesis_backend {
        SynthesisBackend::Google => Arc::new(GoogleTranslateTts::new(config.http_timeout())?),
        SynthesisBackend::Piper => Arc::new(PiperTts::new(config)),
    };
    Ok(synthesizer)
}

/// Google Translate's public TTS endpoint. Voice ids select the regional
/// domain, which changes the accent.
pub struct GoogleTranslateTts {
    client: reqwest::Client,
}

impl GoogleTranslateTts {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn endpoint(voice: &str) -> String {
        let tld = match voice {
            "ind" => "co.in",
            other => other,
        };
        format!("https://translate.google.{tld}/translate_tts")
    }

    async fn fetch_chunk(
        &self,
        endpoint: &str,
        chunk: &str,
        lang: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>> {
        let idx = idx.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        let bytes = self
            .client
            .get(endpoint)
            .header(USER_AGENT, "Mozilla/5.0 (voxreel)")
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", chunk),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if bytes.is_empty() {
            bail!("empty audio returned for chunk {idx}");
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        lang: &str,
        voice: &str,
        out: &Path,
    ) -> Result<()> {
        let chunks = chunk_text(text, GOOGLE_MAX_CHARS);
        if chunks.is_empty() {
            bail!("nothing to synthesize");
        }
        let endpoint = Self::endpoint(voice);
        info!(
            "Requesting {} TTS chunk(s) from {} ({})",
            chunks.len(),
            endpoint,
            lang
        );

        // MP3 frames concatenate cleanly, so chunks are appended as they arrive.
        let mut audio = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!("TTS chunk {}/{}: {}", i + 1, chunks.len(), chunk);
            let bytes = self
                .fetch_chunk(&endpoint, chunk, lang, i, chunks.len())
                .await
                .with_context(|| format!("TTS request failed for chunk {}", i + 1))?;
            audio.extend_from_slice(&bytes);
        }

        tokio::fs::write(out, &audio)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        Ok(())
    }
}

/// Local Piper engine. Text goes in on stdin, a WAV file comes out.
pub struct PiperTts {
    binary: String,
    models: BTreeMap<String, PathBuf>,
    timeout: Duration,
}

impl PiperTts {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.piper_binary.clone(),
            models: config.piper_models.clone(),
            timeout: config.command_timeout(),
        }
    }

    fn model_for(&self, voice: &str) -> Result<&Path> {
        self.models
            .get(voice)
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow!("no piper model configured for voice '{voice}'"))
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperTts {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        _lang: &str,
        voice: &str,
        out: &Path,
    ) -> Result<()> {
        let model = self.model_for(voice)?;
        info!("Calling Piper TTS for output file {}", out.display());

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(out)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("failed to open piper stdin"))?;
            stdin.write_all(text.as_bytes()).await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("piper timed out after {}s", self.timeout.as_secs()))??;

        check_status("piper", output).inspect_err(|e| {
            error!("Piper TTS command failed for {}: {:#}", out.display(), e);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_endpoint_per_voice() {
        assert_eq!(
            GoogleTranslateTts::endpoint("co.uk"),
            "https://translate.google.co.uk/translate_tts"
        );
        assert_eq!(
            GoogleTranslateTts::endpoint("ind"),
            "https://translate.google.co.in/translate_tts"
        );
    }

    #[test]
    fn test_backend_selection() {
        let config = Config::default();
        assert_eq!(from_config(&config).unwrap().extension(), "mp3");

        let config = Config {
            synthesis_backend: SynthesisBackend::Piper,
            ..Config::default()
        };
        assert_eq!(from_config(&config).unwrap().extension(), "wav");
    }

    #[tokio::test]
    async fn test_piper_requires_model_for_voice() {
        let dir = tempfile::tempdir().unwrap();
        let piper = PiperTts::new(&Config::default());
        let err = piper
            .synthesize_speech("hello", "en", "us", &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no piper model"));
    }

    #[tokio::test]
    async fn test_piper_missing_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut models = BTreeMap::new();
        models.insert("us".to_string(), dir.path().join("model.onnx"));
        let config = Config {
            piper_binary: "/nonexistent/piper".to_string(),
            piper_models: models,
            ..Config::default()
        };
        let piper = PiperTts::new(&config);
        let out = dir.path().join("out.wav");
        assert!(piper.synthesize_speech("hello", "en", "us", &out).await.is_err());
        assert!(!out.exists());
    }
}
