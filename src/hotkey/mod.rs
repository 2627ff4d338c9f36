//! Global trigger key, backed by `rdev`.
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use jarvis_voice::hotkey::{parse_key, HotkeyListener};
//!
//! let (tx, rx) = mpsc::channel(16);
//! let key = parse_key("F9").unwrap_or(rdev::Key::F9);
//! let _listener = HotkeyListener::start(key, tx);
//! // hand `rx` to PipelineOrchestrator::run
//! # drop(rx);
//! ```

pub mod listener;

pub use listener::HotkeyListener;

use rdev::Key;

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1,
    Key::F2,
    Key::F3,
    Key::F4,
    Key::F5,
    Key::F6,
    Key::F7,
    Key::F8,
    Key::F9,
    Key::F10,
    Key::F11,
    Key::F12,
];

const LETTER_KEYS: [Key; 26] = [
    Key::KeyA,
    Key::KeyB,
    Key::KeyC,
    Key::KeyD,
    Key::KeyE,
    Key::KeyF,
    Key::KeyG,
    Key::KeyH,
    Key::KeyI,
    Key::KeyJ,
    Key::KeyK,
    Key::KeyL,
    Key::KeyM,
    Key::KeyN,
    Key::KeyO,
    Key::KeyP,
    Key::KeyQ,
    Key::KeyR,
    Key::KeyS,
    Key::KeyT,
    Key::KeyU,
    Key::KeyV,
    Key::KeyW,
    Key::KeyX,
    Key::KeyY,
    Key::KeyZ,
];

/// Key name from `hotkey.trigger_key`, case-insensitive.
///
/// Accepts `F1`–`F12`, single letters and a few named keys.
///
/// ```
/// use jarvis_voice::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key("pause"), Some(rdev::Key::Pause));
/// assert_eq!(parse_key("Ctrl+J"), None);
/// ```
pub fn parse_key(name: &str) -> Option<Key> {
    let name = name.trim().to_ascii_uppercase();

    if let Some(n) = name.strip_prefix('F').and_then(|n| n.parse::<usize>().ok()) {
        return FUNCTION_KEYS.get(n.checked_sub(1)?).copied();
    }

    let mut chars = name.chars();
    if let (Some(c @ 'A'..='Z'), None) = (chars.next(), chars.next()) {
        return LETTER_KEYS.get(usize::from(c as u8 - b'A')).copied();
    }

    match name.as_str() {
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "SPACE" => Some(Key::Space),
        "INSERT" | "INS" => Some(Key::Insert),
        "HOME" => Some(Key::Home),
        "END" => Some(Key::End),
        "PAGEUP" => Some(Key::PageUp),
        "PAGEDOWN" => Some(Key::PageDown),
        "PAUSE" => Some(Key::Pause),
        "SCROLLLOCK" => Some(Key::ScrollLock),
        "PRINTSCREEN" => Some(Key::PrintScreen),
        "CAPSLOCK" => Some(Key::CapsLock),
        "ALTGR" => Some(Key::AltGr),
        _ => None,
    }
}
