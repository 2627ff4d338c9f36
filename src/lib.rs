//! JARVIS voice assistant: trigger → capture → verify → transcribe → infer →
//! act → speak, with one preemptible run at a time.
//!
//! The heart of the crate is [`pipeline::PipelineOrchestrator`]; every other
//! module is either a leaf it depends on (history, parser, dispatch table,
//! broadcaster) or an adapter for an external engine.

pub mod actions;
pub mod audio;
pub mod auth;
pub mod config;
#[cfg(feature = "desktop")]
pub mod hotkey;
pub mod llm;
pub mod pipeline;
pub mod server;
pub mod stt;
pub mod tts;
