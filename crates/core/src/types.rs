use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Speaker label used when the transcriber does not attribute a word.
pub const UNKNOWN_SPEAKER: &str = "unknown";

fn unknown_speaker() -> String {
    UNKNOWN_SPEAKER.to_string()
}

/// A single transcribed word with timing and speaker attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    #[serde(default = "unknown_speaker")]
    pub speaker: String,
}

impl Word {
    pub fn new(text: &str, start: f64, end: f64, speaker: &str) -> Self {
        Self {
            text: text.to_string(),
            start,
            end,
            speaker: speaker.to_string(),
        }
    }
}

/// Maximal run of consecutive words attributed to one speaker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub speaker: String,
    pub words: Vec<Word>,
    /// First word start (seconds)
    pub start: f64,
    /// Last word end (seconds)
    pub end: f64,
}

impl Segment {
    /// Start of the slot in whole milliseconds (truncated).
    pub fn start_ms(&self) -> u64 {
        seconds_to_ms(self.start)
    }

    /// End of the slot in whole milliseconds (truncated).
    pub fn end_ms(&self) -> u64 {
        seconds_to_ms(self.end)
    }

    /// Length of the original slot. Never negative.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms().saturating_sub(self.start_ms())
    }

    /// Words joined with single spaces.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0) as u64
    } else {
        0
    }
}

/// Opaque handle accepted by the synthesis provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mono audio samples in [-1, 1] at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn silent(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in milliseconds, rounded to the nearest millisecond.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as f64 * 1000.0 / self.sample_rate as f64).round() as u64
    }

    /// Number of samples covering `ms` milliseconds at this buffer's rate.
    pub fn samples_for_ms(&self, ms: u64) -> usize {
        ms_to_samples(ms, self.sample_rate)
    }
}

/// Convert a millisecond span to a sample count at `sample_rate`.
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    (ms as f64 / 1000.0 * sample_rate as f64).round() as usize
}

/// Reconciled speech for one segment, ready for placement on the timeline.
#[derive(Debug, Clone)]
pub struct SynthesizedSegment {
    pub start_ms: u64,
    pub audio: AudioBuffer,
    pub duration_ms: u64,
}

impl SynthesizedSegment {
    pub fn new(start_ms: u64, audio: AudioBuffer) -> Self {
        let duration_ms = audio.duration_ms();
        Self {
            start_ms,
            audio,
            duration_ms,
        }
    }
}

/// A single dubbing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DubRequest {
    pub source_url: String,
    pub target_lang: String,
    #[serde(default)]
    pub clone_voice: bool,
    #[serde(default)]
    pub keep_background: bool,
}

/// Pipeline stages reported back to the caller, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Stage {
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "transcription")]
    Transcription,
    #[serde(rename = "speaker-audio collection")]
    SpeakerAudioCollection,
    #[serde(rename = "synthesis")]
    Synthesis,
    #[serde(rename = "background extraction")]
    BackgroundExtraction,
    #[serde(rename = "merge")]
    Merge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcription => "transcription",
            Stage::SpeakerAudioCollection => "speaker-audio collection",
            Stage::Synthesis => "synthesis",
            Stage::BackgroundExtraction => "background extraction",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful dubbing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DubOutcome {
    pub session_id: String,
    pub output_path: PathBuf,
    pub stages: Vec<Stage>,
}
