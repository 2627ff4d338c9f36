//! Spoken output.
//!
//! [`SpeechOutput::speak`] blocks until the utterance ends or is stopped; the
//! orchestrator always calls it from a detached blocking task.  `stop()` may be
//! called from any thread and ends the current utterance immediately.
//!
//! A detached utterance can start after the `stop()` meant to silence it.
//! Callers that queue speech read [`SpeechOutput::stop_count`] when they
//! decide to speak and hand it to [`SpeechOutput::speak_unless_stopped`],
//! which stays silent once a later `stop()` has happened.

pub mod process;

use thiserror::Error;

pub use process::{CommandSpeech, SpeechCommand};

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("could not start synthesiser {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesiser I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("synthesiser exited with status {0:?}")]
    Exit(Option<i32>),
}

/// Object-safe text-to-speech interface.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), TtsError> {
        self.speak_unless_stopped(text, self.stop_count())
    }

    /// Speak `text` unless `stop()` has been called since
    /// [`stop_count`](Self::stop_count) returned `since`.
    fn speak_unless_stopped(&self, text: &str, since: u64) -> Result<(), TtsError>;

    fn stop(&self);

    /// Number of `stop()` calls so far.
    fn stop_count(&self) -> u64;
}

// Compile-time check: SpeechOutput must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn SpeechOutput) {}
};
