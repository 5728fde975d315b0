//! Narration and composition pipeline.
//!
//! `synthesize` turns text into a narration artifact, optionally re-timed.
//! `compose` normalizes that narration, probes its length, captions it and
//! renders it over a background. Intermediates are removed on every path;
//! nothing is retried.

use crate::audio::{NORMALIZED_AUDIO, TempoChain, needs_tempo_adjustment};
use crate::config::Config;
use crate::error::{PipelineError, Result, diagnostic};
use crate::ffmpeg::FfmpegTranscoder;
use crate::media::{BackgroundKind, CompositionSpec, SpeechSynthesizer, TranscodeSpec, Transcoder};
use crate::models::{
    AudioArtifact, CaptionArtifact, CompositionRequest, NarrationRequest, VideoArtifact,
};
use crate::store::{ArtifactKind, ArtifactStore, is_written};
use crate::subtitle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Orchestrator {
    config: Config,
    store: ArtifactStore,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transcoder: Arc<dyn Transcoder>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: Config,
        store: ArtifactStore,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            config,
            store,
            synthesizer,
            transcoder,
        }
    }

    /// Wire up the real engines described by `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = ArtifactStore::open(&config.artifact_dir)?;
        let synthesizer = crate::tts::from_config(&config)?;
        let transcoder = Arc::new(FfmpegTranscoder::new(&config));
        Ok(Self::new(config, store, synthesizer, transcoder))
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn synthesize(&self, request: &NarrationRequest) -> Result<AudioArtifact> {
        request.validate(&self.config)?;

        let ext = self.synthesizer.extension();
        let key = self.store.new_key(ArtifactKind::Output, ext)?;
        let output = self.store.path_for(ArtifactKind::Output, &key, ext);
        info!(
            "Synthesizing {} chars ({}/{}) at {}x",
            request.text.chars().count(),
            request.lang,
            request.voice,
            request.speed
        );

        // The reserved output belongs to this request until it succeeds.
        if let Err(e) = self.narrate(request, &key, &output).await {
            self.store.remove_quietly(&output);
            return Err(e);
        }
        info!("Narration written to {}", output.display());
        Ok(AudioArtifact {
            path: output,
            duration: None,
        })
    }

    async fn narrate(&self, request: &NarrationRequest, key: &str, output: &Path) -> Result<()> {
        if !needs_tempo_adjustment(request.speed) {
            return self.synthesize_to(request, output).await;
        }

        let temp = self
            .store
            .path_for(ArtifactKind::Temp, key, self.synthesizer.extension());
        self.synthesize_to(request, &temp).await?;

        let chain = TempoChain::decompose(request.speed);
        info!("Adjusting tempo with {}", chain.filter());
        let spec = TranscodeSpec::AdjustTempo {
            input: temp.clone(),
            output: output.to_path_buf(),
            chain,
        };
        let result = self.transcoder.transcode(&spec).await;
        self.store.remove_quietly(&temp);

        result.map(|_| ()).map_err(|e| {
            error!("Tempo adjustment failed: {:#}", e);
            PipelineError::SynthesisFailed(diagnostic(&e))
        })
    }

    async fn synthesize_to(&self, request: &NarrationRequest, out: &Path) -> Result<()> {
        self.synthesizer
            .synthesize_speech(&request.text, &request.lang, &request.voice, out)
            .await
            .map_err(|e| {
                error!("Speech synthesis failed: {:#}", e);
                self.store.remove_quietly(out);
                PipelineError::SynthesisFailed(diagnostic(&e))
            })?;
        if !is_written(out) {
            self.store.remove_quietly(out);
            return Err(PipelineError::SynthesisFailed(format!(
                "no audio written to {}",
                out.display()
            )));
        }
        Ok(())
    }

    /// Render narration over the request's background. The background and the
    /// normalized narration are deleted whatever the outcome.
    pub async fn compose(&self, request: &CompositionRequest) -> Result<VideoArtifact> {
        let result = self.compose_keyed(request).await;

        self.store.remove_quietly(&request.background);
        if let Err(e) = &result {
            error!("Video composition failed: {}", e);
        }
        result
    }

    async fn compose_keyed(&self, request: &CompositionRequest) -> Result<VideoArtifact> {
        let key = self.store.new_key(ArtifactKind::Video, "mp4")?;
        let output = self.store.path_for(ArtifactKind::Video, &key, "mp4");
        let converted = self.store.path_for(ArtifactKind::Converted, &key, "aac");

        let result = self
            .run_composition(request, &key, &converted, &output)
            .await;

        self.store.remove_quietly(&converted);
        if result.is_err() {
            self.store.remove_quietly(&output);
            self.store
                .remove_quietly(&self.store.path_for(ArtifactKind::Captions, &key, "srt"));
        }
        result
    }

    async fn run_composition(
        &self,
        request: &CompositionRequest,
        key: &str,
        converted: &Path,
        output: &Path,
    ) -> Result<VideoArtifact> {
        request.validate()?;
        let narration = self.store.existing(&request.audio_filename)?;
        if !request.background.is_file() {
            return Err(PipelineError::InvalidInput(format!(
                "background not found: {}",
                request.background.display()
            )));
        }

        info!("Normalizing narration {}", narration.display());
        self.transcoder
            .transcode(&TranscodeSpec::NormalizeAudio {
                input: narration,
                output: converted.to_path_buf(),
                target: NORMALIZED_AUDIO,
            })
            .await
            .map_err(|e| PipelineError::AudioNormalizationFailed(diagnostic(&e)))?;

        let duration = self
            .transcoder
            .probe_duration(converted)
            .await
            .map_err(|e| PipelineError::DurationUnknown(diagnostic(&e)))?
            .ok_or_else(|| PipelineError::DurationUnknown("probe reported no duration".into()))?;
        info!("Narration lasts {:.3}s", duration);

        let captions = request
            .caption_text()
            .and_then(|text| self.write_captions(text, duration, key));

        let background_kind = BackgroundKind::detect(&request.background);
        info!(
            "Compositing {:?} background at {} into {}",
            background_kind,
            request.aspect.ratio(),
            output.display()
        );
        let spec = CompositionSpec {
            background: request.background.clone(),
            background_kind,
            audio: converted.to_path_buf(),
            duration,
            aspect: request.aspect,
            captions: captions.as_ref().map(|c| c.path.clone()),
            output: output.to_path_buf(),
        };

        self.transcoder
            .transcode(&TranscodeSpec::Compose(spec))
            .await
            .map_err(|e| PipelineError::CompositionFailed(diagnostic(&e)))?;
        if !is_written(output) {
            return Err(PipelineError::CompositionFailed(
                "Output video not generated".to_string(),
            ));
        }

        info!("Video written to {}", output.display());
        Ok(VideoArtifact {
            path: output.to_path_buf(),
            aspect: request.aspect,
            duration,
            captions,
        })
    }

    /// Captions never block a render: any failure here means "no captions".
    fn write_captions(&self, text: &str, duration: f64, key: &str) -> Option<CaptionArtifact> {
        let track = match subtitle::segment(text, duration) {
            Ok(track) => track,
            Err(e) => {
                warn!("Skipping captions: {}", e);
                return None;
            }
        };
        let path: PathBuf = self.store.path_for(ArtifactKind::Captions, key, "srt");
        if let Err(e) = track.write_srt(&path) {
            warn!("Skipping captions, could not write {}: {}", path.display(), e);
            self.store.remove_quietly(&path);
            return None;
        }
        info!("Wrote {} caption cues to {}", track.len(), path.display());
        Some(CaptionArtifact {
            path,
            srt: track.to_srt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AspectMode;
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailAt {
        Nothing,
        Synthesis,
        Tempo,
        Normalize,
        Probe,
        ProbeEmpty,
        Compose,
        ComposeWithoutOutput,
    }

    struct FakeSynth {
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynth {
        fn extension(&self) -> &'static str {
            "mp3"
        }

        async fn synthesize_speech(
            &self,
            _text: &str,
            _lang: &str,
            _voice: &str,
            out: &Path,
        ) -> anyhow::Result<()> {
            // A half-written file, as a crashed engine would leave behind.
            std::fs::write(out, b"partial")?;
            if self.fail {
                bail!("HTTP 503 from TTS endpoint");
            }
            Ok(())
        }
    }

    /// Takes its time, then writes the request text as the audio.
    struct SlowSynth;

    #[async_trait]
    impl SpeechSynthesizer for SlowSynth {
        fn extension(&self) -> &'static str {
            "mp3"
        }

        async fn synthesize_speech(
            &self,
            text: &str,
            _lang: &str,
            _voice: &str,
            out: &Path,
        ) -> anyhow::Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            tokio::fs::write(out, text).await?;
            Ok(())
        }
    }

    struct FakeTranscoder {
        fail: FailAt,
        duration: f64,
        calls: Mutex<Vec<TranscodeSpec>>,
    }

    impl FakeTranscoder {
        fn new(fail: FailAt) -> Self {
            Self {
                fail,
                duration: 10.0,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<TranscodeSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(&self, spec: &TranscodeSpec) -> anyhow::Result<PathBuf> {
            self.calls.lock().unwrap().push(spec.clone());
            let failing = match spec {
                TranscodeSpec::AdjustTempo { .. } => self.fail == FailAt::Tempo,
                TranscodeSpec::NormalizeAudio { .. } => self.fail == FailAt::Normalize,
                TranscodeSpec::Compose(_) => {
                    if self.fail == FailAt::ComposeWithoutOutput {
                        return Ok(spec.output().to_path_buf());
                    }
                    self.fail == FailAt::Compose
                }
            };
            std::fs::write(spec.output(), b"media")?;
            if failing {
                bail!("ffmpeg exited with exit status: 1: Invalid data found");
            }
            Ok(spec.output().to_path_buf())
        }

        async fn probe_duration(&self, _path: &Path) -> anyhow::Result<Option<f64>> {
            match self.fail {
                FailAt::Probe => Err(anyhow!("ffprobe exited with exit status: 1")),
                FailAt::ProbeEmpty => Ok(None),
                _ => Ok(Some(self.duration)),
            }
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        orchestrator: Orchestrator,
        transcoder: Arc<FakeTranscoder>,
    }

    impl Harness {
        fn new(fail: FailAt) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = ArtifactStore::open(dir.path()).unwrap();
            let transcoder = Arc::new(FakeTranscoder::new(fail));
            let synth = Arc::new(FakeSynth {
                fail: fail == FailAt::Synthesis,
            });
            let orchestrator =
                Orchestrator::new(Config::default(), store, synth, transcoder.clone());
            Self {
                _dir: dir,
                orchestrator,
                transcoder,
            }
        }

        fn files(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.orchestrator.store().root())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        }

        fn add_file(&self, name: &str) -> PathBuf {
            let path = self.orchestrator.store().root().join(name);
            std::fs::write(&path, b"data").unwrap();
            path
        }

        fn composition(
            &self,
            background: &str,
            aspect: AspectMode,
            text: Option<&str>,
        ) -> CompositionRequest {
            self.add_file("output_1.mp3");
            CompositionRequest {
                background: self.add_file(background),
                audio_filename: "output_1.mp3".to_string(),
                aspect,
                text: text.map(ToString::to_string),
            }
        }
    }

    fn narration(text: &str, speed: f64) -> NarrationRequest {
        NarrationRequest {
            text: text.to_string(),
            lang: "en".to_string(),
            voice: "us".to_string(),
            speed,
        }
    }

    #[tokio::test]
    async fn test_synthesize_normal_speed() {
        let h = Harness::new(FailAt::Nothing);
        let audio = h
            .orchestrator
            .synthesize(&narration("Hello there.", 1.0))
            .await
            .unwrap();
        assert!(audio.path.is_file());
        assert!(h.transcoder.calls().is_empty());
        let files = h.files();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("output_") && files[0].ends_with(".mp3"));
    }

    #[tokio::test]
    async fn test_synthesize_with_tempo_chain() {
        let h = Harness::new(FailAt::Nothing);
        let audio = h
            .orchestrator
            .synthesize(&narration("Hello there.", 5.0))
            .await
            .unwrap();
        assert!(audio.path.is_file());

        let calls = h.transcoder.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            TranscodeSpec::AdjustTempo { input, output, chain } => {
                assert_eq!(chain.stages, vec![2.0, 2.0, 1.25]);
                assert_eq!(output, &audio.path);
                assert!(!input.exists());
            }
            other => panic!("unexpected spec {other:?}"),
        }
        let files = h.files();
        assert_eq!(files.len(), 1, "{files:?}");
        assert!(files[0].starts_with("output_"));
    }

    #[tokio::test]
    async fn test_concurrent_synthesis_gets_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Config::default(),
            ArtifactStore::open(dir.path()).unwrap(),
            Arc::new(SlowSynth),
            Arc::new(FakeTranscoder::new(FailAt::Nothing)),
        );
        let first = narration("first request", 1.0);
        let second = narration("second request", 1.0);

        let (a, b) = tokio::join!(
            orchestrator.synthesize(&first),
            orchestrator.synthesize(&second)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path, b.path);
        assert_eq!(std::fs::read_to_string(&a.path).unwrap(), "first request");
        assert_eq!(std::fs::read_to_string(&b.path).unwrap(), "second request");
    }

    #[tokio::test]
    async fn test_synthesize_empty_text_is_invalid() {
        let h = Harness::new(FailAt::Nothing);
        let err = h
            .orchestrator
            .synthesize(&narration("  ", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(err.status_code(), 400);
        assert!(h.files().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_cleans_up() {
        let h = Harness::new(FailAt::Synthesis);
        let err = h
            .orchestrator
            .synthesize(&narration("Hello", 1.5))
            .await
            .unwrap_err();
        match err {
            PipelineError::SynthesisFailed(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(h.files().is_empty());
    }

    #[tokio::test]
    async fn test_tempo_failure_cleans_up() {
        let h = Harness::new(FailAt::Tempo);
        let err = h
            .orchestrator
            .synthesize(&narration("Hello", 0.25))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisFailed(_)));
        assert!(h.files().is_empty(), "{:?}", h.files());
    }

    #[tokio::test]
    async fn test_compose_still_image_tall_with_captions() {
        let h = Harness::new(FailAt::Nothing);
        let request = h.composition(
            "bg_1_beach.png",
            AspectMode::Tall,
            Some("one two three four, five six seven eight nine ten"),
        );
        let video = h.orchestrator.compose(&request).await.unwrap();

        assert!(video.path.is_file());
        assert_eq!(video.aspect, AspectMode::Tall);
        assert_eq!(video.duration, 10.0);
        let captions = video.captions.expect("captions");
        assert!(captions.path.is_file());
        assert_eq!(
            captions.srt,
            "1\n00:00:00,000 --> 00:00:04,000\nONE TWO THREE FOUR,\n\n\
             2\n00:00:04,000 --> 00:00:10,000\nFIVE SIX SEVEN EIGHT NINE TEN\n\n"
        );

        let calls = h.transcoder.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], TranscodeSpec::NormalizeAudio { .. }));
        match &calls[1] {
            TranscodeSpec::Compose(spec) => {
                assert_eq!(spec.background_kind, BackgroundKind::Still);
                assert_eq!(spec.aspect, AspectMode::Tall);
                assert_eq!(spec.duration, 10.0);
                assert_eq!(spec.captions.as_ref(), Some(&captions.path));
            }
            other => panic!("unexpected spec {other:?}"),
        }

        let files = h.files();
        assert!(!files.iter().any(|f| f.starts_with("bg_")), "{files:?}");
        assert!(!files.iter().any(|f| f.starts_with("converted_")), "{files:?}");
        assert!(files.iter().any(|f| f.starts_with("video_")));
        assert!(files.iter().any(|f| f.starts_with("captions_")));
        assert!(files.contains(&"output_1.mp3".to_string()));
    }

    #[tokio::test]
    async fn test_compose_without_text_has_no_captions() {
        let h = Harness::new(FailAt::Nothing);
        let request = h.composition("bg_1_loop.mp4", AspectMode::Wide, Some("   "));
        let video = h.orchestrator.compose(&request).await.unwrap();
        assert!(video.captions.is_none());
        match &h.transcoder.calls()[1] {
            TranscodeSpec::Compose(spec) => {
                assert_eq!(spec.background_kind, BackgroundKind::Motion);
                assert!(spec.captions.is_none());
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert!(!h.files().iter().any(|f| f.starts_with("captions_")));
    }

    #[tokio::test]
    async fn test_compose_missing_audio_reference() {
        let h = Harness::new(FailAt::Nothing);
        let mut request = h.composition("bg_1_beach.png", AspectMode::Wide, None);
        request.audio_filename = "output_missing.mp3".to_string();
        let err = h.orchestrator.compose(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(!request.background.exists());
        assert!(h.transcoder.calls().is_empty());
        assert_eq!(h.files(), vec!["output_1.mp3".to_string()]);
    }

    async fn assert_compose_failure(fail: FailAt, expect: fn(&PipelineError) -> bool) {
        let h = Harness::new(fail);
        let request = h.composition("bg_1_beach.jpg", AspectMode::Tall, Some("Hello world, again"));
        let err = h.orchestrator.compose(&request).await.unwrap_err();
        assert!(expect(&err), "{fail:?}: {err:?}");
        assert_eq!(err.status_code(), 500);
        assert_eq!(h.files(), vec!["output_1.mp3".to_string()], "{fail:?}");
    }

    #[tokio::test]
    async fn test_compose_failures_clean_up() {
        assert_compose_failure(FailAt::Normalize, |e| {
            matches!(e, PipelineError::AudioNormalizationFailed(_))
        })
        .await;
        assert_compose_failure(FailAt::Probe, |e| matches!(e, PipelineError::DurationUnknown(_)))
            .await;
        assert_compose_failure(FailAt::ProbeEmpty, |e| {
            matches!(e, PipelineError::DurationUnknown(_))
        })
        .await;
        assert_compose_failure(FailAt::Compose, |e| {
            matches!(e, PipelineError::CompositionFailed(msg) if msg.contains("Invalid data"))
        })
        .await;
        assert_compose_failure(FailAt::ComposeWithoutOutput, |e| {
            matches!(e, PipelineError::CompositionFailed(msg) if msg.contains("not generated"))
        })
        .await;
    }
}
