//! Voice command pipeline: capture → verify → transcribe → infer → act → speak.
//!
//! # Architecture
//!
//! ```text
//! TriggerSource (mpsc)  ◀── hotkey listener / WebSocket "trigger"
//!        │
//!        ▼
//! PipelineOrchestrator::run()
//!        │
//!        └─ trigger()
//!              ├─ raise previous CancellationToken, stop speech
//!              ├─ wait (bounded) for the previous run task
//!              └─ spawn run for generation N+1
//!
//! StateBroadcaster ──StateEvent──▶ observers (WebSocket feed, logs)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use jarvis_voice::config::AppConfig;
//! use jarvis_voice::pipeline::{Engines, PipelineOrchestrator, PipelineSettings, TriggerSource};
//!
//! let config = AppConfig::load()?;
//! let orchestrator = PipelineOrchestrator::new(engines, PipelineSettings::from_config(&config));
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(16);
//! tokio::spawn(orchestrator.clone().run(rx));
//! tx.send(TriggerSource::Hotkey).await?;
//! ```

pub mod broadcast;
pub mod cancel;
pub mod error;
pub mod runner;
pub mod state;

pub use broadcast::StateBroadcaster;
pub use cancel::{CancellationToken, TokenSource};
pub use error::PipelineError;
pub use runner::{
    Engines, PipelineOrchestrator, PipelineSettings, Run, RunOutcome, Stage, TriggerSource,
};
pub use state::{PipelineState, StateEvent};
