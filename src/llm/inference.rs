//! Core `InferenceEngine` trait and the `ApiInference` HTTP backend.
//!
//! `ApiInference` calls any OpenAI-compatible `/v1/chat/completions` endpoint
//! — Ollama, OpenAI, Groq, LM Studio, vLLM, etc.  All connection details come
//! from [`LlmConfig`]; nothing is hardcoded.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::history::ChatMessage;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while asking the model for a reply.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the allowed time.
    #[error("LLM request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The model answered with no usable text.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// InferenceEngine trait
// ---------------------------------------------------------------------------

/// Async dialogue backend.
///
/// # Arguments
/// * `system_prompt` – Fully rendered system message.
/// * `history`       – Previous exchanges, oldest first.
/// * `user_text`     – The transcribed command.
/// * `timeout`       – Upper bound the backend should honour itself.  The
///                     orchestrator enforces the same bound from outside.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn infer(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// ApiInference
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ApiInference {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ApiInference {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: config.clone(),
        }
    }

    /// Message list in chat-completions order: system, history, user.
    fn build_messages(
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({ "role": "system", "content": system_prompt }));
        messages.extend(
            history
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );
        messages.push(json!({ "role": "user", "content": user_text }));
        messages
    }

    fn extract_reply(json: &serde_json::Value) -> Result<String, LlmError> {
        let reply = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::EmptyResponse)?
            .trim()
            .to_string();

        if reply.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(reply)
    }
}

#[async_trait]
impl InferenceEngine for ApiInference {
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is a non-empty string.
    async fn infer(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_text: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = json!({
            "model":       self.config.model,
            "messages":    Self::build_messages(system_prompt, history, user_text),
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens,
        });

        let mut req = self.client.post(&url).timeout(timeout).json(&body);

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?.error_for_status()?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Self::extract_reply(&json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_system_history_user() {
        let history = vec![
            ChatMessage::user("abre o chrome"),
            ChatMessage::assistant("[AÇÃO: ABRIR_PROGRAMA][PARAM: chrome] Abrindo."),
        ];
        let messages = ApiInference::build_messages("sys", &history, "fecha o chrome");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "fecha o chrome");
    }

    #[test]
    fn extract_reply_reads_first_choice() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Olá, senhor. " } }]
        });
        assert_eq!(ApiInference::extract_reply(&json).unwrap(), "Olá, senhor.");
    }

    #[test]
    fn extract_reply_rejects_missing_or_blank_content() {
        assert!(matches!(
            ApiInference::extract_reply(&json!({ "choices": [] })),
            Err(LlmError::EmptyResponse)
        ));
        let blank = json!({ "choices": [{ "message": { "content": "   " } }] });
        assert!(matches!(
            ApiInference::extract_reply(&blank),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn from_config_accepts_optional_key() {
        let mut config = LlmConfig::default();
        let _ = ApiInference::from_config(&config);
        config.api_key = Some("sk-test-1234".into());
        let _ = ApiInference::from_config(&config);
    }

    /// Verify that `ApiInference` is object-safe (usable as `dyn InferenceEngine`).
    #[test]
    fn inference_is_object_safe() {
        let engine: Box<dyn InferenceEngine> =
            Box::new(ApiInference::from_config(&LlmConfig::default()));
        drop(engine);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_request_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..LlmConfig::default()
        };
        let engine = ApiInference::from_config(&config);
        let result = engine
            .infer("sys", &[], "oi", Duration::from_secs(2))
            .await;
        assert!(matches!(
            result,
            Err(LlmError::Request(_)) | Err(LlmError::Timeout)
        ));
    }
}
