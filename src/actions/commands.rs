//! Parameter parsing for desktop actions.
//!
//! The model writes parameters in loose Portuguese ("aumentar 20",
//! "mudo", "próxima", "área de trabalho").  Everything here is pure so the
//! interpretation can be tested without touching the desktop.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Default volume/brightness step in percent.
pub const DEFAULT_STEP: u8 = 10;

/// Brightness floor used for "mínimo", so the screen never goes fully dark.
pub const MIN_BRIGHTNESS: u8 = 10;

// ---------------------------------------------------------------------------
// Levels (volume, brightness)
// ---------------------------------------------------------------------------

/// A volume or brightness adjustment, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Mute,
    Unmute,
    Raise(u8),
    Lower(u8),
    Set(u8),
}

fn first_number(text: &str) -> Option<u8> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|n| n.min(100) as u8)
}

fn is_number(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// `"mudo"`, `"desmudo"`, `"aumentar 20"`, `"-5"`, `"40%"`, `"40"`.
pub fn parse_volume(param: &str) -> Option<Level> {
    let p = param.trim().to_lowercase();
    let step = || first_number(&p).unwrap_or(DEFAULT_STEP);

    if p.contains("desmudo") || p.contains("unmute") {
        Some(Level::Unmute)
    } else if p.contains("mudo") || p.contains("mute") {
        Some(Level::Mute)
    } else if p.contains("aumentar") || p.contains('+') {
        Some(Level::Raise(step()))
    } else if p.contains("diminuir") || p.contains('-') {
        Some(Level::Lower(step()))
    } else if p.contains('%') || is_number(&p) {
        first_number(&p).map(Level::Set)
    } else {
        None
    }
}

/// Like [`parse_volume`] without mute, plus `"máximo"` and `"mínimo"`.
pub fn parse_brightness(param: &str) -> Option<Level> {
    let p = param.trim().to_lowercase();
    let step = || first_number(&p).unwrap_or(DEFAULT_STEP);

    if p.contains("aumentar") || p.contains('+') {
        Some(Level::Raise(step()))
    } else if p.contains("diminuir") || p.contains('-') {
        Some(Level::Lower(step()))
    } else if p.contains('%') || is_number(&p) {
        first_number(&p).map(Level::Set)
    } else if p.contains("máximo") || p.contains("max") {
        Some(Level::Set(100))
    } else if p.contains("mínimo") || p.contains("min") {
        Some(Level::Set(MIN_BRIGHTNESS))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Media / system
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    PlayPause,
    Next,
    Previous,
    Stop,
}

impl MediaCommand {
    pub fn parse(param: &str) -> Option<Self> {
        let p = param.trim().to_lowercase();
        if ["play", "pause", "pausa", "tocar"].iter().any(|w| p.contains(w)) {
            Some(Self::PlayPause)
        } else if ["próxim", "proxim", "next", "pular"].iter().any(|w| p.contains(w)) {
            Some(Self::Next)
        } else if ["anterior", "previous", "volta"].iter().any(|w| p.contains(w)) {
            Some(Self::Previous)
        } else if ["para", "stop"].iter().any(|w| p.contains(w)) {
            Some(Self::Stop)
        } else {
            None
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::PlayPause => "Play/Pause",
            Self::Next => "Próxima faixa",
            Self::Previous => "Faixa anterior",
            Self::Stop => "Mídia parada",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCommand {
    Shutdown,
    Restart,
    Suspend,
    Lock,
    CancelShutdown,
}

impl SystemCommand {
    pub fn parse(param: &str) -> Option<Self> {
        let p = param.trim().to_lowercase();
        if p.contains("cancelar") {
            Some(Self::CancelShutdown)
        } else if p.contains("desligar") || p.contains("shutdown") {
            Some(Self::Shutdown)
        } else if p.contains("reiniciar") || p.contains("restart") {
            Some(Self::Restart)
        } else if p.contains("suspender") || p.contains("sleep") {
            Some(Self::Suspend)
        } else if p.contains("bloquear") || p.contains("lock") {
            Some(Self::Lock)
        } else {
            None
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Shutdown => "Desligando o sistema",
            Self::Restart => "Reiniciando o sistema",
            Self::Suspend => "Suspendendo sistema",
            Self::Lock => "Tela bloqueada",
            Self::CancelShutdown => "Desligamento cancelado",
        }
    }
}

// ---------------------------------------------------------------------------
// Web / folders / Discord
// ---------------------------------------------------------------------------

pub fn search_url(query: &str) -> String {
    match reqwest::Url::parse_with_params("https://www.google.com/search", &[("q", query.trim())]) {
        Ok(url) => url.into(),
        Err(_) => format!("https://www.google.com/search?q={}", query.trim().replace(' ', "+")),
    }
}

/// Prefix `https://` unless a scheme is present.
pub fn site_url(site: &str) -> String {
    let site = site.trim();
    if site.starts_with("http://") || site.starts_with("https://") {
        site.to_string()
    } else {
        format!("https://{site}")
    }
}

/// Resolve a spoken folder name to a path.
///
/// Well-known names map to the user's directories; `~/…` is expanded;
/// anything else is taken as a literal path.
pub fn resolve_folder(name: &str) -> Option<PathBuf> {
    let name = name.trim();
    let special = match name.to_lowercase().as_str() {
        "downloads" => dirs::download_dir(),
        "documentos" | "documents" => dirs::document_dir(),
        "desktop" | "área de trabalho" | "area de trabalho" => dirs::desktop_dir(),
        "imagens" | "fotos" | "pictures" => dirs::picture_dir(),
        "músicas" | "música" | "musicas" | "musica" | "music" => dirs::audio_dir(),
        "videos" | "vídeos" => dirs::video_dir(),
        "home" | "pessoal" | "usuário" => dirs::home_dir(),
        _ => None,
    };
    if special.is_some() {
        return special;
    }
    match name.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(name)),
    }
}

pub fn discord_dm_url(user_id: &str) -> String {
    format!("discord://discord.com/users/{user_id}")
}

/// `channel` is `"<server_id>/<channel_id>"`.
pub fn discord_channel_url(channel: &str) -> String {
    format!("discord://discord.com/channels/{channel}")
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

/// Process name a launch command produces: `"code --new-window"` → `"code"`.
pub fn process_name(command: &str) -> String {
    let program = command.split_whitespace().next().unwrap_or(command);
    let file = std::path::Path::new(program)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(program);
    strip_exe(file).to_lowercase()
}

/// Case-insensitive match ignoring a trailing `.exe`.
pub fn process_matches(running: &str, wanted: &str) -> bool {
    strip_exe(running).eq_ignore_ascii_case(strip_exe(wanted))
}

fn strip_exe(name: &str) -> &str {
    match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".exe") => {
            &name[..cut]
        }
        _ => name,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
