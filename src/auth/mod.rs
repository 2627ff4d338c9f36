//! Speaker verification.
//!
//! The orchestrator only verifies when verification is enabled *and* the
//! verifier reports an enrolled profile.  [`ProfileVerifier`] compares a
//! recording's [`voiceprint`] with the one stored at enrolment.

pub mod profile;
pub mod voiceprint;

use thiserror::Error;

use crate::audio::AudioBuffer;

pub use profile::{ProfileVerifier, VoiceProfile};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("voice profile unreadable: {0}")]
    Profile(String),

    #[error("verification failed: {0}")]
    Engine(String),
}

/// Result of comparing a recording with the enrolled voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub accepted: bool,
    /// Cosine similarity, at most 1.
    pub score: f32,
}

impl Verification {
    /// Accept when `score` reaches `threshold`.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        Self {
            accepted: score >= threshold,
            score,
        }
    }
}

/// Object-safe speaker verification interface.  Called on the blocking pool.
pub trait SpeakerVerifier: Send + Sync {
    fn has_profile(&self) -> bool;
    fn verify(&self, audio: &AudioBuffer) -> Result<Verification, VerifyError>;
}
