//! External collaborators of the dubbing pipeline.
//!
//! Each trait is a narrow seam around one outside service or tool:
//! - Downloader: yt-dlp
//! - Transcriber: Deepgram (word timing + diarization)
//! - Translator: LibreTranslate-compatible HTTP endpoint
//! - Synthesizer / VoiceCloner: ElevenLabs
//! - SourceSeparator: demucs
//! - Muxer: ffmpeg

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::types::{AudioBuffer, VoiceId, Word};

pub mod process;
pub mod retry;

#[cfg(feature = "http-providers")]
pub mod deepgram;
#[cfg(feature = "http-providers")]
pub mod elevenlabs;
#[cfg(feature = "http-providers")]
mod http;
#[cfg(feature = "http-providers")]
pub mod translate;

/// Local copies of a remote video's streams.
#[derive(Debug, Clone)]
pub struct MediaFiles {
    pub audio: PathBuf,
    pub video: PathBuf,
}

pub trait Downloader: Send + Sync {
    /// Fetch the audio and video streams of `url` into `dest_dir`.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<MediaFiles>;
}

pub trait Transcriber: Send + Sync {
    /// Backend name for caching/display.
    fn name(&self) -> &str;

    /// Word-level transcript with speaker labels.
    fn transcribe(&self, audio_path: &Path) -> Result<Vec<Word>>;
}

pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioBuffer>;
}

pub trait VoiceCloner: Send + Sync {
    /// Create a voice from a reference clip. Callers treat failure as non-fatal.
    fn clone_voice(&self, reference_clip: &Path, speaker: &str) -> Result<VoiceId>;
}

pub trait SourceSeparator: Send + Sync {
    /// Return the path of the non-vocal (background) stem.
    fn separate(&self, audio_path: &Path, dest_dir: &Path) -> Result<PathBuf>;
}

pub trait Muxer: Send + Sync {
    /// Mix speech over background into `output`.
    fn mix(&self, speech: &Path, background: &Path, output: &Path) -> Result<()>;

    /// Replace the audio of `video` with `audio`, writing `output`.
    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// The full set of collaborators a run needs.
pub struct Providers {
    pub downloader: Box<dyn Downloader>,
    pub transcriber: Box<dyn Transcriber>,
    pub translator: Box<dyn Translator>,
    pub synthesizer: Box<dyn Synthesizer>,
    pub cloner: Box<dyn VoiceCloner>,
    pub separator: Box<dyn SourceSeparator>,
    pub muxer: Box<dyn Muxer>,
}

#[cfg(feature = "http-providers")]
impl Providers {
    /// Default adapters: yt-dlp, Deepgram, LibreTranslate, ElevenLabs, demucs, ffmpeg.
    pub fn from_config(config: &crate::config::DubConfig) -> crate::error::Result<Self> {
        use crate::error::DubError;

        let deepgram_key = config
            .deepgram_api_key
            .clone()
            .ok_or_else(|| DubError::Config("DEEPGRAM_API_KEY is not set".into()))?;
        let elevenlabs_key = config
            .elevenlabs_api_key
            .clone()
            .ok_or_else(|| DubError::Config("ELEVENLABS_API_KEY is not set".into()))?;

        let build = |e: anyhow::Error| DubError::Config(DubError::detail(&e));

        let transcriber = deepgram::DeepgramTranscriber::new(&deepgram_key, config.http_timeout, config.retry)
            .map_err(build)?;
        let translator = translate::LibreTranslate::new(
            &config.translate_url,
            config.translate_api_key.as_deref(),
            &config.source_lang,
            config.http_timeout,
            config.retry,
        )
        .map_err(build)?;
        let mut elevenlabs = elevenlabs::ElevenLabs::new(
            &elevenlabs_key,
            config.sample_rate,
            config.http_timeout,
            config.retry,
        )
        .map_err(build)?;
        if let Some(model) = &config.elevenlabs_model_id {
            elevenlabs = elevenlabs.with_model(model);
        }

        Ok(Self {
            downloader: Box::new(process::YtDlp::new(config.process_timeout)),
            transcriber: Box::new(transcriber),
            translator: Box::new(translator),
            synthesizer: Box::new(elevenlabs.clone()),
            cloner: Box::new(elevenlabs),
            separator: Box::new(process::Demucs::new(config.process_timeout)),
            muxer: Box::new(process::Ffmpeg::new(config.process_timeout)),
        })
    }
}
