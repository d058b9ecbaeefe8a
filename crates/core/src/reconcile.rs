//! Fit synthesized speech to the duration of the original segment.

use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::effects::{fit_to_length, time_stretch};
use crate::types::AudioBuffer;

/// What to do with speech that runs longer than its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Pitch-preserving time compression down to the slot length.
    #[default]
    Stretch,
    /// Cut the speech at the end of the slot.
    Truncate,
}

impl FromStr for OverflowPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stretch" => Ok(Self::Stretch),
            "truncate" => Ok(Self::Truncate),
            _ => anyhow::bail!("Unknown overflow policy: '{}'. Available: stretch, truncate", s),
        }
    }
}

/// Bring `audio` to `target_ms`.
///
/// Longer audio is compressed (or cut, under [`OverflowPolicy::Truncate`]),
/// shorter audio gets trailing silence, equal-length audio passes through.
/// Empty audio or a zero-length slot is returned unchanged.
pub fn reconcile(audio: AudioBuffer, target_ms: u64, policy: OverflowPolicy) -> Result<AudioBuffer> {
    let target_len = audio.samples_for_ms(target_ms);
    let current_len = audio.len();

    if current_len == 0 || target_len == 0 {
        log::debug!(
            "Skipping reconciliation: {} samples against a {} ms slot",
            current_len,
            target_ms
        );
        return Ok(audio);
    }

    if current_len == target_len {
        return Ok(audio);
    }

    let sr = audio.sample_rate;

    if current_len < target_len {
        log::debug!(
            "Padding {} ms of speech to {} ms",
            audio.duration_ms(),
            target_ms
        );
        return Ok(AudioBuffer::new(fit_to_length(audio.samples, target_len), sr));
    }

    let samples = match policy {
        OverflowPolicy::Stretch => {
            let ratio = current_len as f64 / target_len as f64;
            log::debug!(
                "Stretching {} ms of speech into {} ms (ratio {:.2})",
                audio.duration_ms(),
                target_ms,
                ratio
            );
            fit_to_length(time_stretch(&audio.samples, sr, 1.0 / ratio)?, target_len)
        }
        OverflowPolicy::Truncate => fit_to_length(audio.samples, target_len),
    };

    Ok(AudioBuffer::new(samples, sr))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16000;

    fn tone(ms: u64) -> AudioBuffer {
        let len = (ms as usize) * SR as usize / 1000;
        let samples = (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * 220.0 * i as f64 / SR as f64).sin() * 0.5)
            .collect();
        AudioBuffer::new(samples, SR)
    }

    #[test]
    fn test_overflow_is_stretched_to_target() {
        let out = reconcile(tone(3000), 1000, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out.duration_ms(), 1000);
        assert_eq!(out.sample_rate, SR);
        let rms: f64 = (out.samples.iter().map(|s| s * s).sum::<f64>() / out.len() as f64).sqrt();
        assert!(rms > 0.1, "stretched speech should not be silent, RMS={}", rms);
    }

    #[test]
    fn test_underflow_is_padded_with_silence() {
        let input = tone(400);
        let out = reconcile(input.clone(), 1000, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out.duration_ms(), 1000);
        let split = input.len();
        assert_eq!(&out.samples[..split], &input.samples[..]);
        assert!(out.samples[split..].iter().all(|&s| s == 0.0));
        assert_eq!(out.samples.len() - split, 600 * SR as usize / 1000);
    }

    #[test]
    fn test_equal_duration_passes_through() {
        let input = tone(750);
        let out = reconcile(input.clone(), 750, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_empty_audio_unchanged() {
        let input = AudioBuffer::silent(SR);
        let out = reconcile(input.clone(), 1000, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_zero_slot_unchanged() {
        let input = tone(200);
        let out = reconcile(input.clone(), 0, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_truncate_policy_cuts_at_target() {
        let input = tone(1500);
        let out = reconcile(input.clone(), 1000, OverflowPolicy::Truncate).unwrap();
        assert_eq!(out.duration_ms(), 1000);
        assert_eq!(&out.samples[..], &input.samples[..out.len()]);
    }

    #[test]
    fn test_slight_overflow_stays_within_tolerance() {
        let out = reconcile(tone(1005), 1000, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out.duration_ms(), 1000);
    }

    fn energy(samples: &[f64]) -> f64 {
        samples.iter().map(|s| s * s).sum()
    }

    /// 3000 ms of silence with the tone laid over `[start_ms, start_ms + 300)`.
    fn padded_tone(start_ms: u64) -> AudioBuffer {
        let mut samples = vec![0.0; 3000 * SR as usize / 1000];
        let burst = tone(300);
        let at = start_ms as usize * SR as usize / 1000;
        samples[at..at + burst.len()].copy_from_slice(&burst.samples);
        AudioBuffer::new(samples, SR)
    }

    #[test]
    fn test_stretch_keeps_trailing_speech() {
        let input = padded_tone(2700);
        let expected_energy = energy(&input.samples) / 3.0;

        let out = reconcile(input, 1000, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out.len(), 16000);

        let onset = out.samples.iter().position(|s| s.abs() > 0.1).expect("tail tone was lost");
        assert!(
            (13400..=14900).contains(&onset),
            "tail tone should start near sample 14400, started at {}",
            onset
        );
        let kept = energy(&out.samples);
        assert!(
            kept > expected_energy * 0.6,
            "tail energy {:.1} should be close to {:.1}",
            kept,
            expected_energy
        );
    }

    #[test]
    fn test_stretch_keeps_leading_speech_at_start() {
        let out = reconcile(padded_tone(0), 1000, OverflowPolicy::Stretch).unwrap();
        assert_eq!(out.len(), 16000);

        let onset = out.samples.iter().position(|s| s.abs() > 0.1).expect("head tone was lost");
        assert!(onset < 600, "head tone should start at the slot start, started at {}", onset);
        let head = energy(&out.samples[..2400]);
        let total = energy(&out.samples);
        assert!(head > total * 0.8, "speech leaked past its position: {:.1} of {:.1}", head, total);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("stretch".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Stretch);
        assert_eq!("truncate".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Truncate);
        assert!("squash".parse::<OverflowPolicy>().is_err());
    }
}
