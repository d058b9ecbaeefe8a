//! Audio I/O: WAV read/write, compressed-format decoding, resampling.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use crate::types::{ms_to_samples, AudioBuffer};

/// Read a WAV file into a mono buffer.
///
/// - Normalizes int16/int32 to f64 in [-1, 1]
/// - Passes through float WAVs as f64
/// - Takes the first channel if stereo/multi-channel
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f64> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .enumerate()
                .filter(|(i, _)| i % channels == 0)
                .map(|(_, s)| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read WAV samples")?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .enumerate()
            .filter(|(i, _)| i % channels == 0)
            .map(|(_, s)| s.map(|v| v as f64))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read WAV samples")?,
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Write a buffer to a 16-bit PCM mono WAV file.
///
/// Clips values to [-1, 1] before conversion.
/// Creates parent directories if needed.
pub fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in &audio.samples {
        let clipped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clipped * 32767.0) as i16)?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Copy the samples between two millisecond offsets.
///
/// Clamps to valid bounds; an inverted range yields an empty Vec.
pub fn extract_range_ms(audio: &AudioBuffer, start_ms: u64, end_ms: u64) -> Vec<f64> {
    let start_idx = ms_to_samples(start_ms, audio.sample_rate).min(audio.len());
    let end_idx = ms_to_samples(end_ms, audio.sample_rate).min(audio.len());
    if start_idx >= end_idx {
        return vec![];
    }
    audio.samples[start_idx..end_idx].to_vec()
}

/// Resample audio from source sample rate to target sample rate.
///
/// Uses rubato for high-quality resampling.
pub fn resample(samples: &[f64], from_sr: u32, to_sr: u32) -> Result<Vec<f64>> {
    if from_sr == to_sr {
        return Ok(samples.to_vec());
    }

    if samples.is_empty() {
        return Ok(vec![]);
    }

    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_sr as f64 / from_sr as f64;
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, samples.len(), 1)?;

    let input = vec![samples.to_vec()];
    let output = resampler.process(&input, None)?;

    Ok(output.into_iter().next().unwrap_or_default())
}

/// Bring a buffer to `target_sr`, leaving it untouched if it already matches.
pub fn conform(audio: AudioBuffer, target_sr: u32) -> Result<AudioBuffer> {
    if audio.sample_rate == target_sr {
        return Ok(audio);
    }
    let samples = resample(&audio.samples, audio.sample_rate, target_sr)?;
    Ok(AudioBuffer::new(samples, target_sr))
}

/// Decode any supported file (WAV, MP3, M4A/AAC) into a mono buffer at `target_sr`.
pub fn decode_file(path: &Path, target_sr: u32) -> Result<AudioBuffer> {
    use symphonia::core::io::MediaSourceStream;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let ext = path.extension().and_then(|e| e.to_str());

    let decoded = decode_stream(mss, ext)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    conform(decoded, target_sr)
}

/// Decode an in-memory encoded payload (e.g. an MP3 HTTP body).
///
/// `extension` is a format hint such as "mp3".
pub fn decode_bytes(bytes: Vec<u8>, extension: &str, target_sr: u32) -> Result<AudioBuffer> {
    use symphonia::core::io::MediaSourceStream;

    let mss = MediaSourceStream::new(Box::new(std::io::Cursor::new(bytes)), Default::default());
    let decoded = decode_stream(mss, Some(extension))?;
    conform(decoded, target_sr)
}

/// Decode the first audio track of a media stream, downmixing to mono.
fn decode_stream(
    mss: symphonia::core::io::MediaSourceStream,
    extension: Option<&str>,
) -> Result<AudioBuffer> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Unsupported audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let track_id = track.id;
    let mut source_sr = track.codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut all_samples: Vec<f64> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                source_sr = spec.rate;
                let channels = spec.channels.count().max(1);
                let num_frames = decoded.frames();
                let mut sample_buf = SampleBuffer::<f64>::new(num_frames as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                let interleaved = sample_buf.samples();

                if channels > 1 {
                    for frame in interleaved.chunks_exact(channels) {
                        all_samples.push(frame.iter().sum::<f64>() / channels as f64);
                    }
                } else {
                    all_samples.extend_from_slice(interleaved);
                }
            }
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if all_samples.is_empty() {
        anyhow::bail!("No audio decoded");
    }

    Ok(AudioBuffer::new(all_samples, source_sr))
}
