//! Deepgram speech-to-text with word timing and speaker diarization.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use super::http::{build_client, snippet, status_error};
use super::retry::RetryPolicy;
use super::Transcriber;
use crate::types::{Word, UNKNOWN_SPEAKER};

const DEEPGRAM_BASE: &str = "https://api.deepgram.com";

pub struct DeepgramTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl DeepgramTranscriber {
    pub fn new(api_key: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: DEEPGRAM_BASE.to_string(),
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn listen_url(&self) -> String {
        format!(
            "{}/v1/listen?punctuate=true&utterances=false&paragraphs=false&diarize=true",
            self.base_url
        )
    }
}

/// Content type Deepgram expects for an audio file, by extension.
fn audio_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") => "audio/m4a",
        Some("mp4") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &str {
        "deepgram"
    }

    fn transcribe(&self, audio_path: &Path) -> Result<Vec<Word>> {
        let audio = std::fs::read(audio_path)
            .with_context(|| format!("Failed to read audio: {}", audio_path.display()))?;
        let url = self.listen_url();
        let mime = audio_mime(audio_path);

        log::info!(
            "Transcribing {} ({:.1} MB)",
            audio_path.display(),
            audio.len() as f64 / 1_048_576.0
        );

        self.retry.run("Deepgram transcription", || {
            let response = self
                .client
                .post(&url)
                .header(AUTHORIZATION, format!("Token {}", self.api_key))
                .header(CONTENT_TYPE, mime)
                .body(audio.clone())
                .send()
                .context("Deepgram request failed")?;

            let status = response.status();
            let body = response.text().context("Failed to read Deepgram response")?;
            if !status.is_success() {
                return Err(status_error("Deepgram", status, &body));
            }
            parse_deepgram_response(&body)
        })
    }
}

/// Extract words from a Deepgram `/v1/listen` response.
///
/// A response without `results` or without a first alternative on the
/// first channel is an error; an alternative with no `words` yields no
/// words. Words without a speaker get
/// [`UNKNOWN_SPEAKER`]; the punctuated form is preferred when present.
pub fn parse_deepgram_response(body: &str) -> Result<Vec<Word>> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("Failed to parse Deepgram JSON")?;

    if value.get("results").is_none() {
        bail!("Transcription response has no results: {}", snippet(body));
    }

    let alternative = value["results"]["channels"]
        .get(0)
        .and_then(|channel| channel["alternatives"].get(0))
        .with_context(|| format!("Transcription response has no alternatives: {}", snippet(body)))?;

    let words = alternative["words"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut out = Vec::with_capacity(words.len());
    for w in &words {
        let text = w["punctuated_word"]
            .as_str()
            .or_else(|| w["word"].as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }

        let start = w["start"].as_f64().unwrap_or(0.0).max(0.0);
        let end = w["end"].as_f64().unwrap_or(start).max(start);
        let speaker = match &w["speaker"] {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.clone(),
            _ => UNKNOWN_SPEAKER.to_string(),
        };

        out.push(Word {
            text,
            start,
            end,
            speaker,
        });
    }

    Ok(out)
}
