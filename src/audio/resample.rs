//! Conversion of device audio to the 16 kHz mono stream Whisper expects.
//!
//! Microphones deliver interleaved audio at their native rate in callback-sized
//! chunks.  [`StreamConverter`] downmixes each chunk and resamples it with
//! linear interpolation, carrying the read position and the last input sample
//! across chunk boundaries so the output has no seams.

/// Whisper's input rate.
pub const TARGET_RATE: u32 = 16_000;

/// Average interleaved channels into mono.  A trailing partial frame is
/// discarded.
///
/// ```rust
/// use jarvis_voice::audio::downmix;
///
/// let mono = downmix(&[0.5, -0.5, 0.2, 0.4], 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => samples
            .chunks_exact(n as usize)
            .map(|frame| frame.iter().sum::<f32>() / f32::from(n))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// StreamConverter
// ---------------------------------------------------------------------------

/// Stateful downmix + resample from a device format to 16 kHz mono.
#[derive(Debug, Clone)]
pub struct StreamConverter {
    channels: u16,
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to the start of the next chunk.  May be
    /// negative by less than one sample, meaning "between `last` and the
    /// chunk's first sample".
    position: f64,
    last: Option<f32>,
}

impl StreamConverter {
    pub fn new(source_rate: u32, channels: u16) -> Self {
        Self {
            channels,
            step: source_rate.max(1) as f64 / TARGET_RATE as f64,
            position: 0.0,
            last: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Convert one interleaved chunk.
    pub fn process(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let mono = downmix(interleaved, self.channels);
        if mono.is_empty() {
            return Vec::new();
        }
        if self.is_passthrough() {
            return mono;
        }

        let mut out = Vec::with_capacity((mono.len() as f64 / self.step) as usize + 1);
        let len = mono.len() as f64;

        while self.position < len - 1.0 || (self.position < 0.0 && self.last.is_some()) {
            let sample = if self.position < 0.0 {
                // Interpolate across the boundary with the previous chunk.
                let prev = self.last.unwrap_or(mono[0]);
                let frac = (self.position + 1.0) as f32;
                prev * (1.0 - frac) + mono[0] * frac
            } else {
                let idx = self.position as usize;
                let frac = (self.position - idx as f64) as f32;
                mono[idx] * (1.0 - frac) + mono[idx + 1] * frac
            };
            out.push(sample);
            self.position += self.step;
        }

        self.position -= len;
        self.last = mono.last().copied();
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_handles_channel_counts() {
        assert!(downmix(&[1.0, 2.0], 0).is_empty());
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);

        let quad = downmix(&[0.4; 8], 4);
        assert_eq!(quad.len(), 2);
        assert!((quad[0] - 0.4).abs() < 1e-6);

        // Trailing partial frame dropped.
        assert_eq!(downmix(&[0.1, 0.1, 0.1], 2).len(), 1);
    }

    #[test]
    fn sixteen_k_mono_is_passthrough() {
        let mut conv = StreamConverter::new(16_000, 1);
        assert!(conv.is_passthrough());
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(conv.process(&input), input);
    }

    #[test]
    fn one_second_at_48k_becomes_one_second_at_16k() {
        let mut conv = StreamConverter::new(48_000, 1);
        let total: usize = (0..100).map(|_| conv.process(&[0.5; 480]).len()).sum();
        assert!(total.abs_diff(16_000) <= 1, "got {total}");
    }

    #[test]
    fn odd_chunk_sizes_at_44k1_keep_rate() {
        let mut conv = StreamConverter::new(44_100, 2);
        let mut total = 0;
        for _ in 0..100 {
            // 441 stereo frames = 10 ms
            total += conv.process(&[0.0; 882]).len();
        }
        assert!(total.abs_diff(16_000) <= 1, "got {total}");
    }

    #[test]
    fn constant_signal_keeps_amplitude_across_chunks() {
        let mut conv = StreamConverter::new(48_000, 2);
        for _ in 0..10 {
            for s in conv.process(&[0.25; 300]) {
                assert!((s - 0.25).abs() < 1e-5, "amplitude drift: {s}");
            }
        }
    }

    #[test]
    fn ramp_is_continuous_over_chunk_boundary() {
        // 8 kHz ramp, upsampled: consecutive outputs differ by half a step.
        let mut conv = StreamConverter::new(8_000, 1);
        let mut out = conv.process(&[0.0, 1.0, 2.0, 3.0]);
        out.extend(conv.process(&[4.0, 5.0, 6.0, 7.0]));
        for pair in out.windows(2) {
            assert!((pair[1] - pair[0] - 0.5).abs() < 1e-5, "{pair:?}");
        }
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mut conv = StreamConverter::new(48_000, 1);
        assert!(conv.process(&[]).is_empty());
    }
}
