//! Collect each speaker's original audio into a single cloning reference clip.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::audio::effects::concatenate;
use crate::audio::io::extract_range_ms;
use crate::cache::VoiceCache;
use crate::types::{AudioBuffer, Segment};

/// Shortest aggregate that is still a usable cloning sample.
pub const MIN_REFERENCE_MS: u64 = 1500;

/// Concatenate every segment's original span per speaker, in segment order.
///
/// Returns speakers in order of first appearance.
pub fn gather_speaker_audio(segments: &[Segment], original: &AudioBuffer) -> Vec<(String, AudioBuffer)> {
    let mut order: Vec<(String, Vec<Vec<f64>>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for segment in segments {
        let span = extract_range_ms(original, segment.start_ms(), segment.end_ms());
        let slot = *index.entry(segment.speaker.as_str()).or_insert_with(|| {
            order.push((segment.speaker.clone(), Vec::new()));
            order.len() - 1
        });
        order[slot].1.push(span);
    }

    order
        .into_iter()
        .map(|(speaker, spans)| (speaker, AudioBuffer::new(concatenate(&spans), original.sample_rate)))
        .collect()
}

/// Write one reference clip per speaker whose total audio reaches [`MIN_REFERENCE_MS`].
///
/// Returns the cached clip path for each kept speaker. Shorter speakers are
/// logged and skipped.
pub fn collect_reference_clips(
    segments: &[Segment],
    original: &AudioBuffer,
    cache: &VoiceCache,
) -> Result<HashMap<String, PathBuf>> {
    let mut stored = HashMap::new();

    for (speaker, audio) in gather_speaker_audio(segments, original) {
        let duration_ms = audio.duration_ms();
        if duration_ms < MIN_REFERENCE_MS {
            log::warn!(
                "Skipping speaker {}: audio too short ({} ms) for cloning",
                speaker,
                duration_ms
            );
            continue;
        }

        let path = cache.store(&speaker, &audio)?;
        log::info!(
            "Saved {:.2}s of reference audio for speaker {} to {}",
            duration_ms as f64 / 1000.0,
            speaker,
            path.display()
        );
        stored.insert(speaker, path);
    }

    Ok(stored)
}
