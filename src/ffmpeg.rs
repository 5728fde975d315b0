//! ffmpeg/ffprobe-backed [`Transcoder`].

use crate::audio::wav_duration_seconds;
use crate::config::Config;
use crate::media::{BackgroundKind, CompositionSpec, STILL_FRAME_RATE, TranscodeSpec, Transcoder};
use crate::store::is_written;
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Keep this much of stderr in error messages.
const STDERR_TAIL_CHARS: usize = 2000;

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: config.command_timeout(),
        }
    }

    /// Build the ffmpeg argument list for a spec.
    #[must_use]
    pub fn build_args(spec: &TranscodeSpec) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(ToString::to_string)
            .collect();

        match spec {
            TranscodeSpec::AdjustTempo {
                input,
                output,
                chain,
            } => {
                args.push("-i".to_string());
                args.push(path_arg(input));
                args.push("-filter:a".to_string());
                args.push(chain.filter());
                args.push(path_arg(output));
            }
            TranscodeSpec::NormalizeAudio {
                input,
                output,
                target,
            } => {
                args.push("-i".to_string());
                args.push(path_arg(input));
                args.extend([
                    "-ar".to_string(),
                    target.sample_rate.to_string(),
                    "-ac".to_string(),
                    target.channels.to_string(),
                    "-c:a".to_string(),
                    target.codec.to_string(),
                ]);
                args.push(path_arg(output));
            }
            TranscodeSpec::Compose(compose) => push_compose_args(&mut args, compose),
        }
        args
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        run_tool(program, args, self.timeout).await
    }

    async fn ffprobe_duration(&self, path: &Path) -> Result<Option<f64>> {
        let args = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ]
        .iter()
        .map(ToString::to_string)
        .chain(std::iter::once(path_arg(path)))
        .collect::<Vec<_>>();

        let output = self.run(&self.ffprobe_path, &args).await?;
        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, spec: &TranscodeSpec) -> Result<PathBuf> {
        let args = Self::build_args(spec);
        debug!("ffmpeg {}", args.join(" "));
        self.run(&self.ffmpeg_path, &args).await?;

        let output = spec.output();
        if !is_written(output) {
            bail!("ffmpeg reported success but {} was not written", output.display());
        }
        info!("ffmpeg wrote {}", output.display());
        Ok(output.to_path_buf())
    }

    async fn probe_duration(&self, path: &Path) -> Result<Option<f64>> {
        let is_wav = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if is_wav {
            return wav_duration_seconds(path).map(Some);
        }
        self.ffprobe_duration(path).await
    }
}

fn push_compose_args(args: &mut Vec<String>, spec: &CompositionSpec) {
    let duration = spec.duration.to_string();

    match spec.background_kind {
        BackgroundKind::Still => {
            args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-framerate".to_string(),
                STILL_FRAME_RATE.to_string(),
                "-t".to_string(),
                duration.clone(),
                "-i".to_string(),
                path_arg(&spec.background),
                "-i".to_string(),
                path_arg(&spec.audio),
            ]);
        }
        BackgroundKind::Motion => {
            args.extend([
                "-stream_loop".to_string(),
                "-1".to_string(),
                "-i".to_string(),
                path_arg(&spec.background),
                "-i".to_string(),
                path_arg(&spec.audio),
                "-t".to_string(),
                duration.clone(),
            ]);
        }
    }

    args.extend([
        "-filter_complex".to_string(),
        format!("[0:v]{}[v]", video_filter(spec)),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-shortest".to_string(),
        path_arg(&spec.output),
    ]);
}

/// Scale into the canvas keeping the source aspect ratio, pad the rest, then
/// burn captions if there are any.
fn video_filter(spec: &CompositionSpec) -> String {
    let (w, h) = spec.aspect.canvas();
    let mut filters = vec![
        format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
        format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"),
        "setsar=1".to_string(),
    ];

    if let Some(captions) = &spec.captions {
        let (font_size, margin_v) = spec.aspect.caption_metrics();
        let style = [
            "FontName=Arial".to_string(),
            format!("FontSize={font_size}"),
            "PrimaryColour=&H00FFFFFF".to_string(),
            "OutlineColour=&H00000000".to_string(),
            "BackColour=&H80000000".to_string(),
            "Bold=1".to_string(),
            "BorderStyle=4".to_string(),
            "Outline=2".to_string(),
            "Shadow=0".to_string(),
            "Alignment=2".to_string(),
            format!("MarginV={margin_v}"),
        ]
        .join(",");
        filters.push(format!(
            "subtitles='{}':force_style='{style}'",
            escape_filter_path(captions)
        ));
    }

    filters.join(",")
}

/// Escape a path for a single-quoted filter option. The option parser needs
/// `\`, `:` and `'` backslashed; the graph parser reads quoted text verbatim,
/// so each `'` must close the quote, appear escaped, then reopen it.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace('\'', "'\\''")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_output(stdout: &str) -> Result<Option<f64>> {
    let probe: ProbeOutput =
        serde_json::from_str(stdout).context("ffprobe returned invalid JSON")?;
    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    Ok(duration)
}

/// Run an external tool to completion, killing it if it outlives `timeout`.
/// Non-zero exits become errors carrying the tail of stderr.
pub(crate) async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Output> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("{program} timed out after {}s", timeout.as_secs()))?
        .with_context(|| format!("failed to wait for {program}"))?;

    check_status(program, output)
}

pub(crate) fn check_status(program: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail: String = if stderr.chars().count() > STDERR_TAIL_CHARS {
        let skip = stderr.chars().count() - STDERR_TAIL_CHARS;
        stderr.chars().skip(skip).collect()
    } else {
        stderr.to_string()
    };
    Err(anyhow!("{program} exited with {}: {tail}", output.status))
}
