//! Model-free voiceprints.
//!
//! A voiceprint is the mean log-magnitude spectrum of a recording over the
//! telephone band (300–3400 Hz), grouped into [`VOICEPRINT_DIMS`] bands,
//! mean-centred and L2-normalised.  Two voiceprints compare by dot product.
//!
//! This is a best-effort speaker match, not a security boundary: it keeps the
//! assistant from acting on other voices in the room, and noisy rooms will
//! produce both false accepts and false rejects.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

use super::VerifyError;
use crate::audio::{AudioBuffer, StreamConverter, TARGET_RATE};

/// Length of every voiceprint.
pub const VOICEPRINT_DIMS: usize = 64;

/// 25 ms analysis window at 16 kHz.
const FRAME_LEN: usize = 400;
/// 10 ms hop.
const HOP: usize = 160;
const FFT_LEN: usize = 512;

const MIN_HZ: f32 = 300.0;
const MAX_HZ: f32 = 3400.0;

/// Frames quieter than this (mean absolute amplitude) are skipped.
const SILENCE_FLOOR: f32 = 0.005;

/// Compute the voiceprint of `audio`.
///
/// Fails when the recording has no voiced frame to analyse.
pub fn compute_voiceprint(audio: &AudioBuffer) -> Result<Vec<f32>, VerifyError> {
    if audio.is_empty() || audio.sample_rate == 0 {
        return Err(VerifyError::Engine("no audio to fingerprint".into()));
    }
    let samples = if audio.sample_rate == TARGET_RATE {
        audio.samples.clone()
    } else {
        StreamConverter::new(audio.sample_rate, 1).process(&audio.samples)
    };

    let hz_per_bin = TARGET_RATE as f32 / FFT_LEN as f32;
    let min_bin = (MIN_HZ / hz_per_bin).floor() as usize;
    let max_bin = ((MAX_HZ / hz_per_bin).ceil() as usize).min(FFT_LEN / 2);
    let band_bins = max_bin - min_bin;

    let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_LEN);
    let window = hamming(FRAME_LEN);
    let mut buf = vec![Complex32::new(0.0, 0.0); FFT_LEN];
    let mut acc = vec![0.0f32; VOICEPRINT_DIMS];
    let mut frames = 0usize;

    for frame in samples.windows(FRAME_LEN).step_by(HOP) {
        let level = frame.iter().map(|s| s.abs()).sum::<f32>() / FRAME_LEN as f32;
        if level < SILENCE_FLOOR {
            continue;
        }

        for (slot, (s, w)) in buf.iter_mut().zip(frame.iter().zip(&window)) {
            *slot = Complex32::new(s * w, 0.0);
        }
        buf[FRAME_LEN..].fill(Complex32::new(0.0, 0.0));
        fft.process(&mut buf);

        for (band, value) in acc.iter_mut().enumerate() {
            let start = min_bin + band * band_bins / VOICEPRINT_DIMS;
            let end = (min_bin + (band + 1) * band_bins / VOICEPRINT_DIMS).max(start + 1);
            let bins = &buf[start..end];
            let sum: f32 = bins.iter().map(|c| (1.0 + c.norm()).ln()).sum();
            *value += sum / bins.len() as f32;
        }
        frames += 1;
    }

    if frames == 0 {
        return Err(VerifyError::Engine("no voiced audio to fingerprint".into()));
    }

    for value in &mut acc {
        *value /= frames as f32;
    }
    centre_and_normalise(&mut acc);
    Ok(acc)
}

/// Cosine similarity of two voiceprints, in `[-1, 1]`.
///
/// `None` when the lengths differ.
pub fn similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Mean of several voiceprints, renormalised.
pub fn average(prints: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = prints.first()?;
    if prints.iter().any(|p| p.len() != first.len()) {
        return None;
    }
    let mut mean = vec![0.0f32; first.len()];
    for print in prints {
        for (m, v) in mean.iter_mut().zip(print) {
            *m += v;
        }
    }
    centre_and_normalise(&mut mean);
    Some(mean)
}

fn hamming(n: usize) -> Vec<f32> {
    let denom = n.saturating_sub(1).max(1) as f32;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

/// Spectral shape only: loudness and channel gain drop out with the mean.
fn centre_and_normalise(v: &mut [f32]) {
    if v.is_empty() {
        return;
    }
    let mean = v.iter().sum::<f32>() / v.len() as f32;
    for x in v.iter_mut() {
        *x -= mean;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A harmonic "voice" with the given fundamental.
    fn voice(f0: f32, seconds: f32) -> AudioBuffer {
        let n = (seconds * TARGET_RATE as f32) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / TARGET_RATE as f32;
                (1..=8)
                    .map(|h| {
                        let phase = 2.0 * std::f32::consts::PI * f0 * h as f32 * t;
                        phase.sin() * 0.3 / h as f32
                    })
                    .sum::<f32>()
            })
            .collect();
        AudioBuffer::new(samples, TARGET_RATE)
    }

    #[test]
    fn voiceprint_is_unit_length() {
        let print = compute_voiceprint(&voice(140.0, 1.0)).unwrap();
        assert_eq!(print.len(), VOICEPRINT_DIMS);
        let norm: f32 = print.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn same_voice_scores_higher_than_different_voice() {
        let enrolled = compute_voiceprint(&voice(140.0, 1.0)).unwrap();
        let same = compute_voiceprint(&voice(140.0, 0.8)).unwrap();
        let other = compute_voiceprint(&voice(310.0, 1.0)).unwrap();

        let same_score = similarity(&enrolled, &same).unwrap();
        let other_score = similarity(&enrolled, &other).unwrap();
        assert!(same_score > 0.95, "same voice scored {same_score}");
        assert!(other_score < same_score);
    }

    #[test]
    fn silence_has_no_voiceprint() {
        let silence = AudioBuffer::new(vec![0.0; 16_000], TARGET_RATE);
        assert!(compute_voiceprint(&silence).is_err());
        assert!(compute_voiceprint(&AudioBuffer::new(Vec::new(), TARGET_RATE)).is_err());
    }

    #[test]
    fn mismatched_lengths_do_not_compare() {
        assert_eq!(similarity(&[1.0, 0.0], &[1.0]), None);
        assert_eq!(similarity(&[], &[]), None);
        assert!(average(&[vec![1.0, 0.0], vec![1.0]]).is_none());
        assert!(average(&[]).is_none());
    }
}
