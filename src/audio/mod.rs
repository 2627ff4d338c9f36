//! Audio capture — microphone → 16 kHz mono → silence-bounded command recording.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → StreamConverter
//!           → CaptureSession (frames + silence rule) → AudioBuffer
//! ```
//!
//! [`CaptureEngine`] is the seam the orchestrator records through; the
//! `desktop` feature provides [`MicrophoneCapture`].

pub mod policy;
pub mod resample;

#[cfg(feature = "desktop")]
pub mod capture;

use thiserror::Error;

use crate::pipeline::CancellationToken;

pub use policy::{AudioBuffer, CapturePolicy, CaptureSession};
pub use resample::{downmix, StreamConverter, TARGET_RATE};

#[cfg(feature = "desktop")]
pub use capture::{AudioChunk, MicrophoneCapture};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or reading the input device.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("input device error: {0}")]
    Device(String),

    #[error("audio stream error: {0}")]
    Stream(String),
}

// ---------------------------------------------------------------------------
// CaptureEngine trait
// ---------------------------------------------------------------------------

/// Records one spoken command.
///
/// Runs on the blocking thread pool.  Implementations poll `cancel` while
/// recording and return early once it is raised.  `Ok(None)` means nothing
/// was captured.
pub trait CaptureEngine: Send + Sync {
    fn capture(
        &self,
        policy: &CapturePolicy,
        cancel: &CancellationToken,
    ) -> Result<Option<AudioBuffer>, CaptureError>;
}

// Compile-time check: CaptureEngine must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn CaptureEngine) {}
};
