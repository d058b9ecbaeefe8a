//! Machine translation through a LibreTranslate-compatible endpoint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;

use super::http::{build_client, snippet, status_error};
use super::retry::RetryPolicy;
use super::Translator;

pub struct LibreTranslate {
    client: Client,
    url: String,
    api_key: Option<String>,
    source_lang: String,
    retry: RetryPolicy,
}

impl LibreTranslate {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        source_lang: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{}/translate", base_url.trim_end_matches('/')),
            api_key: api_key.map(str::to_string),
            source_lang: source_lang.to_string(),
            retry,
        })
    }

    fn request_body(&self, text: &str, target_lang: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "q": text,
            "source": self.source_lang,
            "target": target_lang,
            "format": "text",
        });
        if let Some(key) = &self.api_key {
            body["api_key"] = serde_json::Value::String(key.clone());
        }
        body
    }
}

pub(crate) fn parse_translation(body: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("Failed to parse translation JSON")?;
    if let Some(error) = value["error"].as_str() {
        bail!("Translation service error: {}", error);
    }
    value["translatedText"]
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("Translation response has no translatedText: {}", snippet(body)))
}

impl Translator for LibreTranslate {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let body = self.request_body(text, target_lang);

        self.retry.run("Translation", || {
            let response = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .context("Translation request failed")?;

            let status = response.status();
            let text = response.text().context("Failed to read translation response")?;
            if !status.is_success() {
                return Err(status_error("Translation service", status, &text));
            }
            parse_translation(&text)
        })
    }
}
