use hound::WavReader;
use std::path::Path;

/// Range a single `atempo` application accepts.
pub const ATEMPO_MIN: f64 = 0.5;
pub const ATEMPO_MAX: f64 = 2.0;

/// Speeds closer to 1.0 than this are left untouched.
pub const SPEED_EPSILON: f64 = 0.01;

/// Fixed target for normalized narration audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTarget {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: &'static str,
}

pub const NORMALIZED_AUDIO: AudioTarget = AudioTarget {
    sample_rate: 44_100,
    channels: 2,
    codec: "aac",
};

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

#[must_use]
pub fn needs_tempo_adjustment(speed: f64) -> bool {
    (speed - 1.0).abs() > SPEED_EPSILON
}

/// A chain of `atempo` stages whose product is the requested speed.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoChain {
    pub stages: Vec<f64>,
}

impl TempoChain {
    /// Peel off maximum stages while above the range, minimum stages while
    /// below it, then finish with the in-range residual.
    #[must_use]
    pub fn decompose(speed: f64) -> Self {
        debug_assert!(speed.is_finite() && speed > 0.0);
        let mut stages = Vec::new();
        let mut s = speed;
        while s > ATEMPO_MAX {
            stages.push(ATEMPO_MAX);
            s /= ATEMPO_MAX;
        }
        while s < ATEMPO_MIN {
            stages.push(ATEMPO_MIN);
            s /= ATEMPO_MIN;
        }
        stages.push(s);
        Self { stages }
    }

    #[must_use]
    pub fn product(&self) -> f64 {
        self.stages.iter().product()
    }

    /// Comma-joined filter graph, e.g. `atempo=2.0,atempo=2.0,atempo=1.25`.
    #[must_use]
    pub fn filter(&self) -> String {
        self.stages
            .iter()
            .map(|s| format!("atempo={}", format_factor(*s)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Four decimals, trailing zeros trimmed but always one digit after the point.
fn format_factor(factor: f64) -> String {
    let fixed = format!("{factor:.4}");
    let trimmed = fixed.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}
