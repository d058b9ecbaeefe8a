//! ElevenLabs text-to-speech and instant voice cloning.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use super::http::{build_client, permanent, snippet, status_error};
use super::retry::RetryPolicy;
use super::{Synthesizer, VoiceCloner};
use crate::audio::io::decode_bytes;
use crate::types::{AudioBuffer, VoiceId};

const ELEVENLABS_BASE: &str = "https://api.elevenlabs.io";
const API_KEY_HEADER: &str = "xi-api-key";

const STABILITY: f64 = 0.5;
const SIMILARITY_BOOST: f64 = 0.75;

#[derive(Clone)]
pub struct ElevenLabs {
    client: Client,
    api_key: String,
    base_url: String,
    model_id: Option<String>,
    sample_rate: u32,
    retry: RetryPolicy,
}

impl ElevenLabs {
    /// `sample_rate` is the rate synthesized audio is delivered at.
    pub fn new(api_key: &str, sample_rate: u32, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: ELEVENLABS_BASE.to_string(),
            model_id: None,
            sample_rate,
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        self.model_id = Some(model_id.to_string());
        self
    }

    fn tts_url(&self, voice: &VoiceId) -> String {
        format!("{}/v1/text-to-speech/{}", self.base_url, voice)
    }

    fn clone_url(&self) -> String {
        format!("{}/v1/voices/add", self.base_url)
    }
}

pub(crate) fn tts_body(text: &str, model_id: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "text": text,
        "voice_settings": {
            "stability": STABILITY,
            "similarity_boost": SIMILARITY_BOOST,
        },
    });
    if let Some(model) = model_id {
        body["model_id"] = serde_json::Value::String(model.to_string());
    }
    body
}

/// True if the Content-Type header (parameters ignored) is `audio/mpeg`.
pub(crate) fn is_mpeg(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().eq_ignore_ascii_case("audio/mpeg"))
        .unwrap_or(false)
}

pub(crate) fn parse_voice_id(body: &str) -> Result<VoiceId> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("Failed to parse voice creation response")?;
    match value["voice_id"].as_str() {
        Some(id) if !id.is_empty() => Ok(VoiceId::new(id)),
        _ => bail!("Voice creation response has no voice_id: {}", snippet(body)),
    }
}

impl Synthesizer for ElevenLabs {
    fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioBuffer> {
        let url = self.tts_url(voice);
        let body = tts_body(text, self.model_id.as_deref());

        let mp3 = self.retry.run("ElevenLabs synthesis", || {
            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&body)
                .send()
                .context("ElevenLabs request failed")?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                return Err(status_error("ElevenLabs", status, &text));
            }
            if !is_mpeg(content_type.as_deref()) {
                let text = response.text().unwrap_or_default();
                bail!(
                    "ElevenLabs returned {} instead of audio/mpeg: {}",
                    content_type.as_deref().unwrap_or("no content type"),
                    snippet(&text)
                );
            }
            Ok(response.bytes().context("Failed to read synthesized audio")?.to_vec())
        })?;

        decode_bytes(mp3, "mp3", self.sample_rate).context("Failed to decode synthesized MP3")
    }
}

impl VoiceCloner for ElevenLabs {
    fn clone_voice(&self, reference_clip: &Path, speaker: &str) -> Result<VoiceId> {
        let data = std::fs::read(reference_clip)
            .with_context(|| format!("Failed to read reference clip: {}", reference_clip.display()))?;
        let file_name = reference_clip
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "reference.wav".to_string());
        let url = self.clone_url();

        log::info!(
            "Cloning voice for speaker {} from {} ({} bytes)",
            speaker,
            reference_clip.display(),
            data.len()
        );

        // The upload may create a voice even when the reply is lost, so only
        // an explicit 429/5xx answer is retried.
        self.retry.run("ElevenLabs voice cloning", || {
            let part = Part::bytes(data.clone())
                .file_name(file_name.clone())
                .mime_str("audio/wav")
                .map_err(|e| permanent(e.into()))?;
            let form = Form::new()
                .text("name", format!("cloned_{}", speaker))
                .text("description", format!("Cloned voice for speaker {}", speaker))
                .part("files", part);

            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .multipart(form)
                .send()
                .context("ElevenLabs request failed")
                .map_err(permanent)?;

            let status = response.status();
            let body = response
                .text()
                .context("Failed to read voice creation response")
                .map_err(permanent)?;
            if !status.is_success() {
                return Err(status_error("ElevenLabs", status, &body));
            }
            parse_voice_id(&body).map_err(permanent)
        })
    }
}
