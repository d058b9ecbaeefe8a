//! The dubbing pipeline: download, transcribe, group, voice, synthesize,
//! fit, assemble, optionally keep the background, and mux.
//!
//! A request runs sequentially on the calling thread. Every failure except
//! voice cloning aborts the request with the [`DubError`] variant for the
//! stage it happened in.

use std::collections::BTreeMap;

use crate::audio::io::{conform, decode_file, write_wav};
use crate::cache::{file_hash, get_cached_transcript, short, store_transcript_cache, text_hash, VoiceCache};
use crate::config::{CacheScope, DubConfig};
use crate::error::{DubError, Result};
use crate::manifest::{Manifest, SegmentRecord};
use crate::providers::{MediaFiles, Providers};
use crate::reconcile::reconcile;
use crate::reference::collect_reference_clips;
use crate::segment::group_segments;
use crate::session::create_session_dir;
use crate::timeline::assemble;
use crate::types::{DubOutcome, DubRequest, Segment, Stage, SynthesizedSegment, Word};
use crate::voice::VoiceBinder;

pub const SPEECH_TRACK: &str = "tts.wav";
pub const MIXED_TRACK: &str = "mixed.wav";
pub const OUTPUT_FILE: &str = "dubbed.mp4";

fn wrap(variant: fn(String) -> DubError) -> impl Fn(anyhow::Error) -> DubError {
    move |e| variant(DubError::detail(&e))
}

pub struct Dubber {
    config: DubConfig,
    providers: Providers,
}

impl Dubber {
    pub fn new(config: DubConfig, providers: Providers) -> Self {
        Self { config, providers }
    }

    /// Dubber wired to the default HTTP and subprocess adapters.
    #[cfg(feature = "http-providers")]
    pub fn from_config(config: DubConfig) -> Result<Self> {
        let providers = Providers::from_config(&config)?;
        Ok(Self::new(config, providers))
    }

    pub fn config(&self) -> &DubConfig {
        &self.config
    }

    /// Produce a dubbed copy of `request.source_url` in `request.target_lang`.
    pub fn dub(&self, request: &DubRequest) -> Result<DubOutcome> {
        if request.source_url.trim().is_empty() {
            return Err(DubError::Config("source URL is empty".into()));
        }
        if request.target_lang.trim().is_empty() {
            return Err(DubError::Config("target language is empty".into()));
        }
        if self.config.voice_pool.is_empty() {
            return Err(DubError::Config(
                "no fallback voices configured (set ELEVENLABS_VOICES or ELEVENLABS_VOICE_1..N)".into(),
            ));
        }

        let (session_id, session_dir) =
            create_session_dir(&self.config.work_dir).map_err(wrap(DubError::Config))?;
        log::info!(
            "Session {}: dubbing {} into '{}' (clone_voice={}, keep_background={})",
            session_id,
            request.source_url,
            request.target_lang,
            request.clone_voice,
            request.keep_background
        );
        let mut stages = Vec::new();

        // Download
        log::info!("Downloading {}", request.source_url);
        let media = self
            .providers
            .downloader
            .fetch(&request.source_url, &session_dir.join("media"))
            .map_err(wrap(DubError::Download))?;
        stages.push(Stage::Download);

        // Transcription
        let words = self.transcribe(&media)?;
        stages.push(Stage::Transcription);

        let segments = group_segments(&words);
        log::info!("{} words grouped into {} segments", words.len(), segments.len());
        if segments.is_empty() {
            log::warn!("No speech found; the dubbed track will be silent");
        }

        // Speaker reference clips
        let voice_cache = self.voice_cache(&session_id, &request.source_url);
        if request.clone_voice {
            let original = decode_file(&media.audio, self.config.sample_rate)
                .map_err(wrap(DubError::Audio))?;
            let clips = collect_reference_clips(&segments, &original, &voice_cache)
                .map_err(wrap(DubError::Audio))?;
            log::info!("Collected reference clips for {} speaker(s)", clips.len());
            stages.push(Stage::SpeakerAudioCollection);
        }

        // Synthesis
        let mut binder = if request.clone_voice {
            VoiceBinder::with_cloning(
                self.config.voice_pool.clone(),
                &voice_cache,
                self.providers.cloner.as_ref(),
            )?
        } else {
            VoiceBinder::with_pool(self.config.voice_pool.clone())?
        };
        let (entries, records) = self.synthesize_segments(&segments, &request.target_lang, &mut binder)?;
        let speech = assemble(entries, self.config.sample_rate).map_err(wrap(DubError::Audio))?;
        let speech_path = session_dir.join(SPEECH_TRACK);
        write_wav(&speech_path, &speech).map_err(wrap(DubError::Audio))?;
        log::info!(
            "Wrote {:.1}s speech track to {}",
            speech.duration_ms() as f64 / 1000.0,
            speech_path.display()
        );
        stages.push(Stage::Synthesis);

        // Background
        let final_audio = if request.keep_background {
            let background = self
                .providers
                .separator
                .separate(&media.audio, &session_dir.join("separated"))
                .map_err(wrap(DubError::Separation))?;
            stages.push(Stage::BackgroundExtraction);

            let mixed = session_dir.join(MIXED_TRACK);
            self.providers
                .muxer
                .mix(&speech_path, &background, &mixed)
                .map_err(wrap(DubError::Mux))?;
            mixed
        } else {
            speech_path
        };

        // Merge
        let output_path = session_dir.join(OUTPUT_FILE);
        self.providers
            .muxer
            .mux(&media.video, &final_audio, &output_path)
            .map_err(wrap(DubError::Mux))?;
        stages.push(Stage::Merge);

        let manifest = Manifest {
            session_id: session_id.clone(),
            request: request.clone(),
            segments: records,
            voices: binder.into_bindings().into_iter().collect::<BTreeMap<_, _>>(),
            stages: stages.clone(),
            output_path: output_path.clone(),
        };
        manifest.write(&session_dir)?;

        log::info!("Session {} done: {}", session_id, output_path.display());
        Ok(DubOutcome {
            session_id,
            output_path,
            stages,
        })
    }

    fn transcribe(&self, media: &MediaFiles) -> Result<Vec<Word>> {
        let transcriber = self.providers.transcriber.as_ref();
        if !self.config.use_transcript_cache {
            log::info!("Transcribing with {}", transcriber.name());
            return transcriber
                .transcribe(&media.audio)
                .map_err(wrap(DubError::Transcription));
        }

        let hash = file_hash(&media.audio).map_err(wrap(DubError::Transcription))?;
        if let Some(words) = get_cached_transcript(&self.config.cache_dir, &hash) {
            return Ok(words);
        }

        log::info!("Transcribing with {}", transcriber.name());
        let words = transcriber
            .transcribe(&media.audio)
            .map_err(wrap(DubError::Transcription))?;
        if let Err(e) = store_transcript_cache(&self.config.cache_dir, &hash, &words) {
            log::warn!("Failed to cache transcription: {:#}", e);
        }
        Ok(words)
    }

    /// Reference clips for this request. Per-session unless reuse by source is configured.
    fn voice_cache(&self, session_id: &str, source_url: &str) -> VoiceCache {
        let scope = match self.config.cache_scope {
            CacheScope::Session => session_id.to_string(),
            CacheScope::Source => format!("src-{}", short(&text_hash(source_url))),
        };
        VoiceCache::scoped(&self.config.cache_dir, &scope)
    }

    fn synthesize_segments(
        &self,
        segments: &[Segment],
        target_lang: &str,
        binder: &mut VoiceBinder<'_>,
    ) -> Result<(Vec<SynthesizedSegment>, Vec<SegmentRecord>)> {
        let sample_rate = self.config.sample_rate;
        let mut entries = Vec::with_capacity(segments.len());
        let mut records = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            let mut record = SegmentRecord::new(index, segment);

            record.translation = self
                .providers
                .translator
                .translate(&record.text, target_lang)
                .map_err(|e| DubError::Translation {
                    segment: index,
                    message: DubError::detail(&e),
                })?;
            if record.translation.trim().is_empty() {
                log::warn!("Segment {} translated to nothing, leaving it silent", index);
                records.push(record);
                continue;
            }

            let voice = binder.resolve(&segment.speaker);
            let synthesis_error = |e: anyhow::Error| DubError::Synthesis {
                segment: index,
                message: DubError::detail(&e),
            };
            let audio = self
                .providers
                .synthesizer
                .synthesize(&record.translation, &voice)
                .and_then(|audio| conform(audio, sample_rate))
                .map_err(synthesis_error)?;

            let target_ms = segment.duration_ms();
            log::debug!(
                "Segment {} [{}..{} ms] speaker {}: {} ms of speech for a {} ms slot",
                index,
                record.start_ms,
                record.end_ms,
                segment.speaker,
                audio.duration_ms(),
                target_ms
            );
            let fitted = reconcile(audio, target_ms, self.config.overflow).map_err(wrap(DubError::Audio))?;

            entries.push(SynthesizedSegment::new(segment.start_ms(), fitted));
            record.voice = Some(voice);
            records.push(record);
        }

        Ok((entries, records))
    }
}
