//! Caption segmentation and SRT output.
//!
//! Timing is proportional to word count: every word gets `duration / words`
//! seconds, with no phoneme alignment.

use crate::error::{PipelineError, Result};
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Punctuation that lets a segment close early once it has enough words.
const BREAK_PUNCTUATION: [char; 4] = ['.', '!', '?', ','];
const MIN_WORDS_BEFORE_BREAK: usize = 4;
const MAX_WORDS_PER_CUE: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    /// 1-based position in the track
    pub index: usize,
    pub start: f64,
    pub end: f64,
    /// Upper-cased words joined by single spaces
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionTrack {
    pub cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    #[must_use]
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Serialize as SubRip: index, `start --> end`, text, blank line.
    #[must_use]
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for cue in &self.cues {
            let _ = writeln!(out, "{}", cue.index);
            let _ = writeln!(
                out,
                "{} --> {}",
                format_srt_time(cue.start),
                format_srt_time(cue.end)
            );
            let _ = writeln!(out, "{}", cue.text);
            let _ = writeln!(out);
        }
        out
    }

    pub fn write_srt(&self, path: &Path) -> Result<()> {
        let mut f = File::create(path)?;
        f.write_all(self.to_srt().as_bytes())?;
        Ok(())
    }
}

/// Split `text` into timed caption cues spread across `duration` seconds.
pub fn segment(text: &str, duration: f64) -> Result<CaptionTrack> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Err(PipelineError::NoCaptionableContent);
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PipelineError::NoCaptionableContent);
    }

    let rate = words.len() as f64 / duration;
    let mut cues = Vec::new();
    let mut offset = 0usize;

    for group in group_words(&words) {
        let k = group.len();
        let end = ((offset + k) as f64 / rate).min(duration);
        // Very long text against a tiny duration can push the start past the
        // clamped end; pin it so cues never run backwards.
        let start = (offset as f64 / rate).min(end);
        offset += k;

        let text = group
            .iter()
            .map(|w| w.to_uppercase())
            .collect::<Vec<_>>()
            .join(" ");

        cues.push(CaptionCue {
            index: cues.len() + 1,
            start,
            end,
            text,
        });
    }

    Ok(CaptionTrack { cues })
}

/// Greedy grouping: close after a punctuated word once the group has four
/// words, or unconditionally at six. The tail is flushed as-is.
fn group_words<'a>(words: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut groups = Vec::new();
    let mut current: Vec<&'a str> = Vec::new();

    for &word in words {
        current.push(word);
        let punctuated = word.ends_with(BREAK_PUNCTUATION);
        if (current.len() >= MIN_WORDS_BEFORE_BREAK && punctuated)
            || current.len() >= MAX_WORDS_PER_CUE
        {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// `HH:MM:SS,mmm`, truncating sub-millisecond fractions.
fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).floor() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}
