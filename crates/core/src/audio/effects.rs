//! Audio effects: concatenation, length fitting, time stretch.

use anyhow::Result;

/// Concatenate audio segments back to back.
pub fn concatenate(clips: &[Vec<f64>]) -> Vec<f64> {
    let total: usize = clips.iter().map(|c| c.len()).sum();
    let mut result = Vec::with_capacity(total);
    for clip in clips {
        result.extend_from_slice(clip);
    }
    result
}

/// Pad with trailing silence or cut so the result has exactly `len` samples.
pub fn fit_to_length(mut samples: Vec<f64>, len: usize) -> Vec<f64> {
    samples.resize(len, 0.0);
    samples
}

/// Time-stretch by factor using Signalsmith Stretch (phase vocoder).
///
/// `factor` > 1.0 = slower (longer), < 1.0 = faster (shorter).
/// Preserves pitch while changing duration. The stretcher is primed with
/// its input latency and flushed afterwards, so content keeps its position
/// and the tail is not lost. Returns exactly `round(len * factor)` samples.
pub fn time_stretch(samples: &[f64], sr: u32, factor: f64) -> Result<Vec<f64>> {
    if samples.is_empty() {
        return Ok(vec![]);
    }

    if !factor.is_finite() || factor <= 0.0 {
        anyhow::bail!("Invalid stretch factor: {}", factor);
    }

    let in_len = samples.len();
    let out_len = (in_len as f64 * factor).round() as usize;
    if out_len == 0 {
        return Ok(vec![]);
    }
    if out_len == in_len {
        return Ok(samples.to_vec());
    }

    let mut stretch = ssstretch::Stretch::new();
    stretch.preset_default(1, sr as f32);
    let in_latency = stretch.input_latency().max(0) as usize;
    let out_latency = stretch.output_latency().max(0) as usize;

    // Trailing zeros let the last real samples reach the output
    let mut input: Vec<f32> = samples.iter().map(|&s| s as f32).collect();
    input.resize(in_len + in_latency, 0.0);

    if in_latency > 0 {
        let playback_rate = in_len as f64 / out_len as f64;
        stretch.seek_vec(&[input[..in_latency].to_vec()], in_latency as i32, playback_rate);
    }

    let mut body = vec![vec![0.0f32; out_len]; 1];
    stretch.process_vec(&[input[in_latency..].to_vec()], in_len as i32, &mut body, out_len as i32);

    let mut tail = vec![vec![0.0f32; out_latency]; 1];
    if out_latency > 0 {
        stretch.flush_vec(&mut tail, out_latency as i32);
    }

    // Output lags by `out_latency`; drop the lead-in and keep the flushed tail
    let output: Vec<f64> = body[0]
        .iter()
        .chain(tail[0].iter())
        .skip(out_latency)
        .map(|&s| s as f64)
        .collect();
    Ok(fit_to_length(output, out_len))
}
