//! Errors a pipeline run can end with.

use thiserror::Error;

/// Why a run stopped before reaching its normal end.
///
/// Every variant except [`PipelineError::Schedule`] is recovered inside the
/// run itself; callers of `trigger()` and `run()` only ever see `Schedule`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("capture too short or empty")]
    CaptureTooShort,

    #[error("speaker not recognised")]
    VerificationRejected,

    #[error("transcription confidence too low")]
    TranscriptionLowConfidence,

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("inference timed out")]
    InferenceTimeout,

    #[error("inference failed: {0}")]
    InferenceFailure(String),

    #[error("action failed: {0}")]
    ActionExecutionFailure(String),

    #[error("unknown action kind: {0}")]
    UnknownActionKind(String),

    /// The run was preempted.  Never reported.
    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    /// The run task could not be spawned.
    #[error("could not schedule pipeline run: {0}")]
    Schedule(String),
}

impl PipelineError {
    /// Phrase spoken to the user when the run ends in `Error`.
    pub fn apology(&self) -> &'static str {
        match self {
            PipelineError::VerificationRejected => "Desculpe, não reconheço sua voz.",
            PipelineError::TranscriptionLowConfidence | PipelineError::TranscriptionFailed(_) => {
                "Desculpe senhor, não consegui entender."
            }
            _ => "Desculpe senhor, ocorreu um erro no processamento.",
        }
    }
}
