//! When to stop recording a spoken command.
//!
//! [`CaptureSession`] consumes 16 kHz mono samples in arbitrary chunk sizes,
//! slices them into fixed frames and tracks the trailing run of silent frames.
//! Recording ends at the first of:
//!
//! * the frame budget for `max_duration` is used up, or
//! * the silent run covers `silence_duration` and more than `min_frames`
//!   frames have been captured.
//!
//! The session is pure, so the stop rule is tested without a microphone.

use std::time::Duration;

use super::resample::TARGET_RATE;
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// A finished mono recording.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CapturePolicy
// ---------------------------------------------------------------------------

/// Frame size, silence rule and length limits for one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePolicy {
    /// Rate of the samples fed to the session.  Capture always converts to
    /// [`TARGET_RATE`].
    pub sample_rate: u32,
    pub frame_size: usize,
    pub max_duration: Duration,
    /// Mean absolute amplitude below which a frame is silent.
    pub silence_threshold: f32,
    pub silence_duration: Duration,
    /// Frames that must precede a silence stop.
    pub min_frames: usize,
}

impl CapturePolicy {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            sample_rate: TARGET_RATE,
            frame_size: config.frame_size.max(1),
            max_duration: Duration::from_secs_f32(config.max_record_secs.max(0.0)),
            silence_threshold: config.silence_threshold,
            silence_duration: Duration::from_secs_f32(config.silence_secs.max(0.0)),
            min_frames: config.min_frames,
        }
    }

    /// Total frames allowed by `max_duration`.
    pub fn max_frames(&self) -> usize {
        (self.max_duration.as_secs_f64() * self.sample_rate as f64 / self.frame_size as f64)
            as usize
    }

    /// Consecutive silent frames that end the recording.
    pub fn silent_frames_needed(&self) -> usize {
        let frames = self.silence_duration.as_secs_f64() * self.sample_rate as f64
            / self.frame_size as f64;
        (frames as usize).max(1)
    }

    pub fn is_silent(&self, frame: &[f32]) -> bool {
        if frame.is_empty() {
            return true;
        }
        let mean = frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len() as f32;
        mean < self.silence_threshold
    }

    pub fn session(&self) -> CaptureSession {
        CaptureSession::new(self.clone())
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Incremental stop-rule evaluation for one recording.
#[derive(Debug)]
pub struct CaptureSession {
    policy: CapturePolicy,
    samples: Vec<f32>,
    /// Samples already grouped into frames.
    framed: usize,
    frames: usize,
    silent_run: usize,
    done: bool,
}

impl CaptureSession {
    pub fn new(policy: CapturePolicy) -> Self {
        let capacity = policy.max_frames() * policy.frame_size;
        Self {
            policy,
            samples: Vec::with_capacity(capacity),
            framed: 0,
            frames: 0,
            silent_run: 0,
            done: false,
        }
    }

    /// Append samples.  Returns `true` once recording should stop; samples
    /// pushed after that are ignored.
    pub fn push(&mut self, chunk: &[f32]) -> bool {
        if self.done {
            return true;
        }
        self.samples.extend_from_slice(chunk);

        let frame_size = self.policy.frame_size;
        let max_frames = self.policy.max_frames();
        let needed = self.policy.silent_frames_needed();

        while self.samples.len() - self.framed >= frame_size {
            let frame = &self.samples[self.framed..self.framed + frame_size];
            if self.policy.is_silent(frame) {
                self.silent_run += 1;
            } else {
                self.silent_run = 0;
            }
            self.framed += frame_size;
            self.frames += 1;

            let silence_stop = self.silent_run >= needed && self.frames > self.policy.min_frames;
            if silence_stop || self.frames >= max_frames {
                // Drop samples past the deciding frame.
                self.samples.truncate(self.framed);
                self.done = true;
                break;
            }
        }
        self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Close the session.  `None` when nothing was recorded.
    pub fn finish(self) -> Option<AudioBuffer> {
        if self.samples.is_empty() {
            return None;
        }
        Some(AudioBuffer::new(self.samples, self.policy.sample_rate))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
