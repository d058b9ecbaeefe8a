//! Run configuration, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::cache_dir;
use crate::error::{DubError, Result};
use crate::providers::retry::RetryPolicy;
use crate::reconcile::OverflowPolicy;
use crate::types::VoiceId;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_TRANSLATE_URL: &str = "http://localhost:5000";

/// How widely cached reference clips are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// Clips live only as long as the session that made them
    #[default]
    Session,
    /// Clips are keyed by source URL and reused across runs
    Source,
}

impl FromStr for CacheScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "session" => Ok(Self::Session),
            "source" => Ok(Self::Source),
            _ => anyhow::bail!("Unknown cache scope: '{}'. Available: session, source", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DubConfig {
    pub deepgram_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_model_id: Option<String>,
    /// Fallback voices, assigned to speakers round-robin
    pub voice_pool: Vec<VoiceId>,
    pub translate_url: String,
    pub translate_api_key: Option<String>,
    pub source_lang: String,
    pub cache_dir: PathBuf,
    pub work_dir: PathBuf,
    pub sample_rate: u32,
    pub http_timeout: Duration,
    pub process_timeout: Duration,
    pub retry: RetryPolicy,
    pub overflow: OverflowPolicy,
    pub cache_scope: CacheScope,
    pub use_transcript_cache: bool,
}

impl Default for DubConfig {
    fn default() -> Self {
        Self {
            deepgram_api_key: None,
            elevenlabs_api_key: None,
            elevenlabs_model_id: None,
            voice_pool: Vec::new(),
            translate_url: DEFAULT_TRANSLATE_URL.to_string(),
            translate_api_key: None,
            source_lang: "en".to_string(),
            cache_dir: cache_dir(),
            work_dir: PathBuf::from("autodub-output"),
            sample_rate: DEFAULT_SAMPLE_RATE,
            http_timeout: Duration::from_secs(120),
            process_timeout: Duration::from_secs(1800),
            retry: RetryPolicy::default(),
            overflow: OverflowPolicy::default(),
            cache_scope: CacheScope::default(),
            use_transcript_cache: true,
        }
    }
}

impl DubConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.deepgram_api_key = get("DEEPGRAM_API_KEY");
        config.elevenlabs_api_key = get("ELEVENLABS_API_KEY");
        config.elevenlabs_model_id = get("ELEVENLABS_MODEL_ID");
        config.voice_pool = voice_pool(&get);
        config.translate_api_key = get("TRANSLATE_API_KEY");

        if let Some(url) = get("TRANSLATE_URL") {
            config.translate_url = url;
        }
        if let Some(lang) = get("AUTODUB_SOURCE_LANG") {
            config.source_lang = lang;
        }
        if let Some(dir) = get("AUTODUB_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("AUTODUB_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("AUTODUB_SAMPLE_RATE") {
            config.sample_rate = parse_number("AUTODUB_SAMPLE_RATE", &v)?;
            if config.sample_rate == 0 {
                return Err(DubError::Config("AUTODUB_SAMPLE_RATE must be positive".into()));
            }
        }
        if let Some(v) = get("AUTODUB_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_number("AUTODUB_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("AUTODUB_PROCESS_TIMEOUT_SECS") {
            config.process_timeout =
                Duration::from_secs(parse_number("AUTODUB_PROCESS_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("AUTODUB_RETRY_ATTEMPTS") {
            config.retry.max_attempts = parse_number("AUTODUB_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("AUTODUB_OVERFLOW") {
            config.overflow = v.parse().map_err(|e: anyhow::Error| DubError::Config(e.to_string()))?;
        }
        if let Some(v) = get("AUTODUB_CACHE_SCOPE") {
            config.cache_scope = v.parse().map_err(|e: anyhow::Error| DubError::Config(e.to_string()))?;
        }
        if let Some(v) = get("AUTODUB_TRANSCRIPT_CACHE") {
            config.use_transcript_cache = parse_flag("AUTODUB_TRANSCRIPT_CACHE", &v)?;
        }

        Ok(config)
    }
}

/// `ELEVENLABS_VOICES` (comma-separated) wins; otherwise `ELEVENLABS_VOICE_1`,
/// `_2`, ... until the first gap.
fn voice_pool(get: &dyn Fn(&str) -> Option<String>) -> Vec<VoiceId> {
    if let Some(list) = get("ELEVENLABS_VOICES") {
        return list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(VoiceId::new)
            .collect();
    }

    (1..)
        .map(|i| get(&format!("ELEVENLABS_VOICE_{}", i)))
        .take_while(Option::is_some)
        .flatten()
        .map(VoiceId::new)
        .collect()
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DubError::Config(format!("{} must be a number, got '{}'", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DubError::Config(format!("{} must be true or false, got '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<DubConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DubConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.overflow, OverflowPolicy::Stretch);
        assert_eq!(config.cache_scope, CacheScope::Session);
        assert!(config.use_transcript_cache);
        assert!(config.voice_pool.is_empty());
        assert!(config.deepgram_api_key.is_none());
    }

    #[test]
    fn test_numbered_voice_pool_stops_at_gap() {
        let config = config_from(&[
            ("ELEVENLABS_VOICE_1", "v1"),
            ("ELEVENLABS_VOICE_2", "v2"),
            ("ELEVENLABS_VOICE_4", "v4"),
        ])
        .unwrap();
        assert_eq!(config.voice_pool, vec![VoiceId::new("v1"), VoiceId::new("v2")]);
    }

    #[test]
    fn test_voice_list_wins_over_numbered() {
        let config = config_from(&[
            ("ELEVENLABS_VOICES", " a, b ,,c "),
            ("ELEVENLABS_VOICE_1", "ignored"),
        ])
        .unwrap();
        let ids: Vec<&str> = config.voice_pool.iter().map(|v| v.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config_from(&[("DEEPGRAM_API_KEY", "  ")]).unwrap();
        assert!(config.deepgram_api_key.is_none());
    }

    #[test]
    fn test_tunables() {
        let config = config_from(&[
            ("AUTODUB_SAMPLE_RATE", "22050"),
            ("AUTODUB_HTTP_TIMEOUT_SECS", "10"),
            ("AUTODUB_RETRY_ATTEMPTS", "5"),
            ("AUTODUB_OVERFLOW", "truncate"),
            ("AUTODUB_CACHE_SCOPE", "source"),
            ("AUTODUB_TRANSCRIPT_CACHE", "off"),
            ("AUTODUB_WORK_DIR", "/tmp/dubs"),
        ])
        .unwrap();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.overflow, OverflowPolicy::Truncate);
        assert_eq!(config.cache_scope, CacheScope::Source);
        assert!(!config.use_transcript_cache);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/dubs"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            config_from(&[("AUTODUB_SAMPLE_RATE", "fast")]),
            Err(DubError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("AUTODUB_SAMPLE_RATE", "0")]),
            Err(DubError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("AUTODUB_OVERFLOW", "squash")]),
            Err(DubError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("AUTODUB_TRANSCRIPT_CACHE", "maybe")]),
            Err(DubError::Config(_))
        ));
    }
}
