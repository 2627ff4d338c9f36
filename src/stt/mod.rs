//! STT (Speech-to-Text) module.
//!
//! [`Transcriber`] is the interface used by the pipeline.  It is object-safe
//! and `Send + Sync` so it can be held behind an `Arc<dyn Transcriber>` and
//! called from the blocking thread pool.
//!
//! With the `desktop` feature, [`WhisperEngine`] wraps a
//! `whisper_rs::WhisperContext` and reports the mean token probability as the
//! transcript confidence.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use jarvis_voice::audio::AudioBuffer;
//! use jarvis_voice::stt::{Transcriber, TranscribeParams, WhisperEngine};
//!
//! let engine = WhisperEngine::load("models/ggml-base.bin", TranscribeParams::default())
//!     .expect("model not found");
//! let audio = AudioBuffer::new(vec![0.0; 16_000], 16_000);
//! let transcript = engine.transcribe(&audio).unwrap();
//! println!("{} ({:.2})", transcript.text, transcript.confidence);
//! ```

#[cfg(feature = "desktop")]
pub mod whisper;

use thiserror::Error;

use crate::audio::AudioBuffer;

#[cfg(feature = "desktop")]
pub use whisper::{optimal_threads, TranscribeParams, WhisperEngine};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the STT subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The engine could not be initialised.
    #[error("Whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// An error occurred during the inference pass.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Audio is not 16 kHz mono.
    #[error("unsupported sample rate {0} Hz (expected 16 000)")]
    SampleRate(u32),
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Text recognised in one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// 0–1; how sure the engine is about `text`.
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// `true` when the text is blank or the confidence is under `min`.
    pub fn is_unusable(&self, min_confidence: f32) -> bool {
        self.text.trim().is_empty() || self.confidence < min_confidence
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe speech-to-text interface.
///
/// `audio` is 16 kHz mono.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<Transcript, SttError>;
}

// Compile-time assertion: Box<dyn Transcriber> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};
