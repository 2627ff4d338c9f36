//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]` so a partial `settings.toml` only
//! needs to list the values the user actually changed.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::llm::prompt::DEFAULT_SYSTEM_PROMPT;

// ---------------------------------------------------------------------------
// AssistantConfig
// ---------------------------------------------------------------------------

/// Who the assistant serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Name used when the assistant addresses the user.
    pub user_name: String,
    /// BCP-47 tag of the conversation language.
    pub language: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            user_name: "Lucas".into(),
            language: "pt-BR".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Command capture settings: frame size, silence early-stop and length limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// Hard ceiling on a single command recording, in seconds.
    pub max_record_secs: f32,
    /// Mean absolute amplitude under which a frame counts as silent.
    pub silence_threshold: f32,
    /// Trailing silence, in seconds, that ends a recording early.
    pub silence_secs: f32,
    /// Frames that must be captured before silence may end the recording.
    pub min_frames: usize,
    /// Recordings shorter than this are discarded without transcription.
    pub min_capture_secs: f32,
    /// Input device name; `None` selects the system default.
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            max_record_secs: 5.0,
            silence_threshold: 0.03,
            silence_secs: 1.5,
            min_frames: 10,
            min_capture_secs: 0.5,
            input_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model file stem inside the models directory (e.g. `"base"`).
    pub model: String,
    /// ISO-639-1 code passed to Whisper, or `"auto"`.
    pub language: String,
    /// Transcripts below this confidence are rejected as "not understood".
    pub min_confidence: f32,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base".into(),
            language: "pt".into(),
            min_confidence: 0.3,
            use_gpu: false,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Dialogue backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (Ollama serves one at `/v1`).
    pub base_url: String,
    /// API key — `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on reply length; short replies keep latency low.
    pub max_tokens: u32,
    /// Seconds before an inference request is abandoned.
    pub timeout_secs: u64,
    /// Persona and reply-format instructions.  The action catalogue and the
    /// current date are appended at request time.
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "llama3.1:8b".into(),
            temperature: 0.7,
            max_tokens: 128,
            timeout_secs: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceAuthConfig
// ---------------------------------------------------------------------------

/// Speaker verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceAuthConfig {
    /// Verify the speaker before acting, when a profile is enrolled.
    pub enabled: bool,
    /// Minimum similarity (0–1) accepted as the enrolled speaker.
    pub threshold: f32,
    /// Profile file, relative to the config directory.
    pub profile_file: String,
}

impl Default for VoiceAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.80,
            profile_file: "voice_profiles/default.json".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Spoken output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Override the synthesiser program; `None` picks the platform voice.
    pub command: Option<String>,
    /// Voice name understood by the synthesiser.
    pub voice: String,
    /// Speaking rate in words per minute.
    pub rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            command: None,
            voice: "pt-br".into(),
            rate: 175,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Orchestrator timing and memory limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// User/assistant exchanges kept in the conversation history.
    pub history_exchanges: usize,
    /// How long a new trigger waits for the preempted run to wind down.
    pub preempt_wait_ms: u64,
    /// Time spent in the `Error` state before returning to `Idle`.
    pub error_dwell_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_exchanges: 10,
            preempt_wait_ms: 1_000,
            error_dwell_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey binding that starts a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Trigger key name (e.g. `"F9"`).
    pub trigger_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            trigger_key: "F9".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// WebSocket state feed consumed by the desktop interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// ActionsConfig
// ---------------------------------------------------------------------------

/// Lookup tables used by the desktop action executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Spoken program name → executable or command.
    pub programs: BTreeMap<String, String>,
    /// Contact name → Discord user id.
    pub discord_contacts: BTreeMap<String, String>,
    /// Channel name → `"server_id/channel_id"`.
    pub discord_channels: BTreeMap<String, String>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        let programs = [
            ("chrome", "chrome"),
            ("brave", "brave"),
            ("firefox", "firefox"),
            ("discord", "discord"),
            ("spotify", "spotify"),
            ("vscode", "code"),
            ("steam", "steam"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            programs,
            discord_contacts: BTreeMap::new(),
            discord_channels: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use jarvis_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub assistant: AssistantConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub voice_auth: VoiceAuthConfig,
    pub tts: TtsConfig,
    pub pipeline: PipelineConfig,
    pub hotkey: HotkeyConfig,
    pub server: ServerConfig,
    pub actions: ActionsConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
