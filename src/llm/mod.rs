//! Dialogue module for the JARVIS assistant.
//!
//! This module provides:
//! * [`InferenceEngine`] — async trait implemented by all dialogue backends.
//! * [`ApiInference`] — OpenAI-compatible REST backend (Ollama by default).
//! * [`ConversationHistory`] / [`ChatMessage`] — bounded rolling dialogue.
//! * [`SystemPrompt`] — persona + action catalogue + current date.
//! * [`parse_response`] — extracts `[AÇÃO: …]` / `[PARAM: …]` from a reply.
//! * [`LlmError`] — error variants for inference.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use jarvis_voice::config::AppConfig;
//! use jarvis_voice::llm::{
//!     parse_response, ApiInference, ChatMessage, ConversationHistory, InferenceEngine,
//!     SystemPrompt,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let engine = ApiInference::from_config(&config.llm);
//!     let prompt = SystemPrompt::new(&config.llm.system_prompt, &config.assistant.user_name);
//!     let mut history = ConversationHistory::new(config.pipeline.history_exchanges);
//!
//!     let user = "abre o chrome";
//!     let reply = engine
//!         .infer(&prompt.render(), &history.snapshot(), user, Duration::from_secs(10))
//!         .await
//!         .unwrap();
//!
//!     history.push(ChatMessage::user(user));
//!     history.push(ChatMessage::assistant(reply.clone()));
//!     println!("{:?}", parse_response(&reply));
//! }
//! ```

pub mod history;
pub mod inference;
pub mod parser;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use history::{ChatMessage, ConversationHistory, Role};
pub use inference::{ApiInference, InferenceEngine, LlmError};
pub use parser::parse_response;
pub use prompt::{SystemPrompt, DEFAULT_SYSTEM_PROMPT};
