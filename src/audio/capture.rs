//! Microphone capture via `cpal`.
//!
//! [`MicrophoneCapture`] opens the input device for the duration of one
//! command.  The cpal callback forwards [`AudioChunk`]s over a std channel;
//! the recording thread converts them to 16 kHz mono and feeds a
//! [`CaptureSession`](super::CaptureSession) until it reports done, the
//! deadline passes or the run is cancelled.  Dropping the stream stops the
//! hardware.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{AudioBuffer, CaptureEngine, CaptureError, CapturePolicy, StreamConverter};
use crate::pipeline::CancellationToken;

/// How often the recording loop wakes to check the token and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Extra time allowed past `max_duration` for device start-up latency.
const DEADLINE_SLACK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        CaptureError::Device(e.to_string())
    }
}

impl From<cpal::DevicesError> for CaptureError {
    fn from(e: cpal::DevicesError) -> Self {
        CaptureError::Device(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(e: cpal::BuildStreamError) -> Self {
        CaptureError::Stream(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(e: cpal::PlayStreamError) -> Self {
        CaptureError::Stream(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// MicrophoneCapture
// ---------------------------------------------------------------------------

/// [`CaptureEngine`] backed by the system microphone.
pub struct MicrophoneCapture {
    /// Device name; `None` uses the host default.
    device_name: Option<String>,
}

impl MicrophoneCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn open_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.clone())),
        }
    }
}

impl CaptureEngine for MicrophoneCapture {
    fn capture(
        &self,
        policy: &CapturePolicy,
        cancel: &CancellationToken,
    ) -> Result<Option<AudioBuffer>, CaptureError> {
        let device = self.open_device()?;
        let supported = device.default_input_config()?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: cpal::StreamConfig = supported.into();

        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Receiver gone means recording finished; nothing to do.
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        log::debug!(
            "capture: recording at {sample_rate} Hz x{channels} (max {:?})",
            policy.max_duration
        );

        let mut converter = StreamConverter::new(sample_rate, channels);
        let mut session = policy.session();
        let deadline = Instant::now() + policy.max_duration + DEADLINE_SLACK;

        loop {
            if cancel.is_cancelled() {
                log::debug!("capture: cancelled");
                return Ok(None);
            }
            if Instant::now() >= deadline {
                log::debug!("capture: deadline reached");
                break;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    if session.push(&converter.process(&chunk.samples)) {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::Stream("input stream closed".into()));
                }
            }
        }

        drop(stream);
        log::debug!("capture: {} frames recorded", session.frames());
        Ok(session.finish())
    }
}
