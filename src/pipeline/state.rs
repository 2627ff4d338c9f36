//! Pipeline state machine values and the events published on every change.
//!
//! [`PipelineState`] is the single value the orchestrator moves through.
//! Every transition is wrapped in a [`StateEvent`] and handed to the
//! broadcaster, which is what the desktop interface and the WebSocket feed
//! observe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// States of the command pipeline.
///
/// ```text
/// Idle ──trigger──▶ Listening
///                     ──capture short/empty──▶ Idle
///                     ──capture ok──▶ Processing
///                                       ──rejected / not understood / LLM failure──▶ Error ──▶ Idle
///                                       ──reply with action──▶ Executing ──▶ Idle
///                                       ──reply without action──▶ Idle
/// any state ──new trigger──▶ (preempt) Listening
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Waiting for a trigger.
    #[default]
    Idle,

    /// Microphone is open; the command is being recorded.
    Listening,

    /// Verifying, transcribing and asking the model.
    Processing,

    /// Running the requested desktop action.
    Executing,

    /// Transient: the apology is being spoken before returning to `Idle`.
    Error,
}

impl PipelineState {
    /// Returns `true` while a run owns the pipeline.
    ///
    /// ```
    /// use jarvis_voice::pipeline::PipelineState;
    ///
    /// assert!(!PipelineState::Idle.is_busy());
    /// assert!(PipelineState::Listening.is_busy());
    /// assert!(PipelineState::Error.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, PipelineState::Idle)
    }

    /// Lowercase wire name, identical to the serde representation.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Listening => "listening",
            PipelineState::Processing => "processing",
            PipelineState::Executing => "executing",
            PipelineState::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// StateEvent
// ---------------------------------------------------------------------------

/// One published state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub state: PipelineState,
    /// Accompanying text: the reply on the final `Idle`, the apology on
    /// `Error`, empty otherwise.
    pub text: String,
    /// Run generation that produced the event.  0 is the boot-time `Idle`.
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
}

impl StateEvent {
    pub fn new(state: PipelineState, text: impl Into<String>, generation: u64) -> Self {
        Self {
            state,
            text: text.into(),
            generation,
            timestamp: Utc::now(),
        }
    }

    /// The event every broadcaster starts with.
    pub fn initial() -> Self {
        Self::new(PipelineState::Idle, "", 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
