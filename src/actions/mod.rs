//! Desktop actions the assistant can perform.
//!
//! This module provides:
//! * [`ActionKind`] — the closed set of actions the model may request.
//! * [`ActionRequest`] / [`ActionResult`] — parsed request and normalised outcome.
//! * [`ActionExecutor`] — trait implemented by the OS-level backend.
//! * [`ActionTable`] — validates a request and delegates to the executor.
//! * [`commands`] — parsing of loose Portuguese action parameters.
//! * `DesktopController` (feature `desktop`) — the real executor.

pub mod commands;
pub mod dispatch;

#[cfg(feature = "desktop")]
pub mod desktop;
#[cfg(feature = "desktop")]
pub mod keyboard;

use std::fmt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use dispatch::ActionTable;

#[cfg(feature = "desktop")]
pub use desktop::DesktopController;

/// Identifier of the "just talk" sentinel.
pub const NO_ACTION: &str = "NENHUMA";

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Every action the model is allowed to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    OpenProgram,
    CloseProgram,
    CloseAll,
    Volume,
    Brightness,
    Media,
    System,
    Search,
    OpenSite,
    OpenFolder,
    Type,
    DiscordDm,
    DiscordChannel,
    TimeInfo,
    SystemInfo,
    NoAction,
}

impl ActionKind {
    pub const ALL: [ActionKind; 16] = [
        ActionKind::OpenProgram,
        ActionKind::CloseProgram,
        ActionKind::CloseAll,
        ActionKind::Volume,
        ActionKind::Brightness,
        ActionKind::Media,
        ActionKind::System,
        ActionKind::Search,
        ActionKind::OpenSite,
        ActionKind::OpenFolder,
        ActionKind::Type,
        ActionKind::DiscordDm,
        ActionKind::DiscordChannel,
        ActionKind::TimeInfo,
        ActionKind::SystemInfo,
        ActionKind::NoAction,
    ];

    /// Identifier as written by the model inside `[AÇÃO: …]`.
    pub fn identifier(self) -> &'static str {
        match self {
            ActionKind::OpenProgram => "ABRIR_PROGRAMA",
            ActionKind::CloseProgram => "FECHAR_PROGRAMA",
            ActionKind::CloseAll => "ENCERRAR_TUDO",
            ActionKind::Volume => "VOLUME",
            ActionKind::Brightness => "BRILHO",
            ActionKind::Media => "MIDIA",
            ActionKind::System => "SISTEMA",
            ActionKind::Search => "PESQUISAR",
            ActionKind::OpenSite => "ABRIR_SITE",
            ActionKind::OpenFolder => "ABRIR_PASTA",
            ActionKind::Type => "DIGITAR",
            ActionKind::DiscordDm => "DISCORD_DM",
            ActionKind::DiscordChannel => "DISCORD_CANAL",
            ActionKind::TimeInfo => "INFO_HORA",
            ActionKind::SystemInfo => "INFO_SISTEMA",
            ActionKind::NoAction => NO_ACTION,
        }
    }

    /// Exact-identifier lookup.
    pub fn from_identifier(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.identifier() == id)
    }

    /// One-line description used in the prompt's action catalogue.
    pub fn description(self) -> &'static str {
        match self {
            ActionKind::OpenProgram => "Abre um programa",
            ActionKind::CloseProgram => "Fecha um programa",
            ActionKind::CloseAll => "Fecha todos os programas",
            ActionKind::Volume => "Controla volume (aumentar X, diminuir X, mudo, X%)",
            ActionKind::Brightness => "Controla brilho (aumentar, diminuir, X%)",
            ActionKind::Media => "Controla mídia (play, pause, proximo, anterior)",
            ActionKind::System => "Comandos do sistema (desligar, reiniciar, suspender, bloquear)",
            ActionKind::Search => "Pesquisa na internet",
            ActionKind::OpenSite => "Abre um site específico",
            ActionKind::OpenFolder => "Abre uma pasta",
            ActionKind::Type => "Digita texto",
            ActionKind::DiscordDm => "Abre DM no Discord",
            ActionKind::DiscordChannel => "Abre canal no Discord",
            ActionKind::TimeInfo => "Informa a hora",
            ActionKind::SystemInfo => "Informa status do PC",
            ActionKind::NoAction => "Apenas conversa, sem ação",
        }
    }

    /// Whether `[PARAM: …]` must accompany this kind.
    pub fn requires_parameter(self) -> bool {
        matches!(
            self,
            ActionKind::OpenProgram
                | ActionKind::CloseProgram
                | ActionKind::Volume
                | ActionKind::Brightness
                | ActionKind::Media
                | ActionKind::System
                | ActionKind::Search
                | ActionKind::OpenSite
                | ActionKind::OpenFolder
                | ActionKind::Type
                | ActionKind::DiscordDm
                | ActionKind::DiscordChannel
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

// ---------------------------------------------------------------------------
// ActionRequest / ActionResult
// ---------------------------------------------------------------------------

/// What the model asked for.  `kind` is kept as the raw identifier so unknown
/// kinds survive parsing and are rejected at dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: String,
    pub parameter: Option<String>,
    pub speech: String,
}

impl ActionRequest {
    pub fn is_no_action(&self) -> bool {
        self.kind == NO_ACTION
    }
}

/// Outcome of an action.  Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionExecutor trait
// ---------------------------------------------------------------------------

/// OS-level backend for the action set.
///
/// Called on the blocking thread pool; implementations may block.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, kind: ActionKind, parameter: Option<&str>) -> ActionResult;
}

// Compile-time check: ActionExecutor must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ActionExecutor) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
