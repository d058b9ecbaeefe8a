//! Lay reconciled segments onto one continuous track at their original offsets.

use anyhow::Result;

use crate::audio::io::conform;
use crate::types::{ms_to_samples, AudioBuffer, SynthesizedSegment};

/// Append-only track with a cursor at its current end.
#[derive(Debug)]
pub struct Timeline {
    samples: Vec<f64>,
    sample_rate: u32,
}

impl Timeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// End of everything placed so far.
    pub fn current_position_ms(&self) -> u64 {
        (self.samples.len() as f64 * 1000.0 / self.sample_rate as f64).round() as u64
    }

    /// Append silence up to `start_ms` (if the cursor is behind it), then `audio`.
    ///
    /// A segment that starts before the cursor goes right after the previous
    /// one; nothing already placed is overwritten.
    pub fn place(&mut self, start_ms: u64, audio: AudioBuffer) -> Result<()> {
        let audio = conform(audio, self.sample_rate)?;
        let start = ms_to_samples(start_ms, self.sample_rate);
        let gap = start.saturating_sub(self.samples.len());

        if gap == 0 && start < self.samples.len() {
            log::debug!(
                "Segment at {} ms starts before cursor ({} ms), placing back-to-back",
                start_ms,
                self.current_position_ms()
            );
        }

        self.samples.resize(self.samples.len() + gap, 0.0);
        self.samples.extend_from_slice(&audio.samples);
        Ok(())
    }

    pub fn finish(self) -> AudioBuffer {
        AudioBuffer::new(self.samples, self.sample_rate)
    }
}

/// Assemble segments into a single track, ordered by start time.
///
/// Input order does not matter; ties keep their relative order.
pub fn assemble(mut segments: Vec<SynthesizedSegment>, sample_rate: u32) -> Result<AudioBuffer> {
    segments.sort_by_key(|s| s.start_ms);

    let mut timeline = Timeline::new(sample_rate);
    for segment in segments {
        timeline.place(segment.start_ms, segment.audio)?;
    }
    Ok(timeline.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16000;

    fn clip(ms: u64, value: f64) -> AudioBuffer {
        AudioBuffer::new(vec![value; ms_to_samples(ms, SR)], SR)
    }

    fn seg(start_ms: u64, ms: u64, value: f64) -> SynthesizedSegment {
        SynthesizedSegment::new(start_ms, clip(ms, value))
    }

    #[test]
    fn test_gap_filled_with_silence() {
        let track = assemble(vec![seg(0, 500, 0.5), seg(2000, 300, 0.25)], SR).unwrap();
        assert_eq!(track.duration_ms(), 2300);

        let first_end = ms_to_samples(500, SR);
        let second_start = ms_to_samples(2000, SR);
        assert!(track.samples[..first_end].iter().all(|&s| s == 0.5));
        assert!(track.samples[first_end..second_start].iter().all(|&s| s == 0.0));
        assert!(track.samples[second_start..].iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_leading_silence() {
        let track = assemble(vec![seg(1000, 250, 1.0)], SR).unwrap();
        assert_eq!(track.duration_ms(), 1250);
        assert_eq!(track.samples[0], 0.0);
    }

    #[test]
    fn test_overlap_placed_back_to_back() {
        // First segment runs to 1500 ms, second nominally starts at 1000 ms.
        let track = assemble(vec![seg(0, 1500, 0.5), seg(1000, 500, 0.25)], SR).unwrap();
        assert_eq!(track.duration_ms(), 2000);
        let boundary = ms_to_samples(1500, SR);
        assert!(track.samples[..boundary].iter().all(|&s| s == 0.5));
        assert!(track.samples[boundary..].iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_reorders_by_start() {
        let track = assemble(vec![seg(2000, 300, 0.25), seg(0, 500, 0.5)], SR).unwrap();
        assert_eq!(track.duration_ms(), 2300);
        assert_eq!(track.samples[0], 0.5);
    }

    #[test]
    fn test_empty_input() {
        let track = assemble(vec![], SR).unwrap();
        assert!(track.is_empty());
    }

    #[test]
    fn test_duration_is_max_end_for_sorted_input() {
        let segments = vec![seg(0, 120, 0.1), seg(130, 40, 0.2), seg(900, 333, 0.3), seg(1500, 10, 0.4)];
        let expected = segments.iter().map(|s| s.start_ms + s.duration_ms).max().unwrap();
        let track = assemble(segments, SR).unwrap();
        assert_eq!(track.duration_ms(), expected);
    }

    #[test]
    fn test_place_resamples_foreign_rate() {
        let mut timeline = Timeline::new(SR);
        let foreign = AudioBuffer::new(vec![0.0; 8000], 8000);
        timeline.place(0, foreign).unwrap();
        let track = timeline.finish();
        assert_eq!(track.sample_rate, SR);
        assert!(track.len() > 14000 && track.len() < 17000);
    }

    #[test]
    fn test_cursor_advances() {
        let mut timeline = Timeline::new(SR);
        assert_eq!(timeline.current_position_ms(), 0);
        timeline.place(100, clip(400, 0.3)).unwrap();
        assert_eq!(timeline.current_position_ms(), 500);
    }
}
