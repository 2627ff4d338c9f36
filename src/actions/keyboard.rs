//! Keyboard simulation backed by `enigo`, with an `arboard` paste path for
//! long text.
//!
//! A new [`Enigo`] is created per call because it is not `Send`.

use std::thread;
use std::time::Duration;

use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use thiserror::Error;

use super::commands::{Level, MediaCommand};

/// Text longer than this is pasted instead of typed.
pub const PASTE_THRESHOLD: usize = 200;

/// Percent of volume one media-key press moves on most systems.
const VOLUME_KEY_STEP: u8 = 2;

/// Let the focused window read the clipboard before it is restored.
const PASTE_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum KeyboardError {
    #[error("key simulation failed: {0}")]
    Simulation(String),

    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

fn enigo() -> Result<Enigo, KeyboardError> {
    Enigo::new(&Settings::default()).map_err(|e| KeyboardError::Simulation(e.to_string()))
}

fn tap(enigo: &mut Enigo, key: Key, times: usize) -> Result<(), KeyboardError> {
    for _ in 0..times {
        enigo
            .key(key, Direction::Click)
            .map_err(|e| KeyboardError::Simulation(e.to_string()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Volume / media
// ---------------------------------------------------------------------------

/// Apply a volume change with the media keys.
///
/// Absolute levels first drive the volume to zero, then step up.
pub fn adjust_volume(level: Level) -> Result<(), KeyboardError> {
    let mut enigo = enigo()?;
    let presses = |pct: u8| usize::from(pct.div_ceil(VOLUME_KEY_STEP));

    match level {
        Level::Mute | Level::Unmute => tap(&mut enigo, Key::VolumeMute, 1),
        Level::Raise(pct) => tap(&mut enigo, Key::VolumeUp, presses(pct)),
        Level::Lower(pct) => tap(&mut enigo, Key::VolumeDown, presses(pct)),
        Level::Set(pct) => {
            tap(&mut enigo, Key::VolumeDown, presses(100))?;
            tap(&mut enigo, Key::VolumeUp, presses(pct))
        }
    }
}

pub fn media(command: MediaCommand) -> Result<(), KeyboardError> {
    let key = match command {
        MediaCommand::PlayPause => Key::MediaPlayPause,
        MediaCommand::Next => Key::MediaNextTrack,
        MediaCommand::Previous => Key::MediaPrevTrack,
        MediaCommand::Stop => Key::MediaStop,
    };
    tap(&mut enigo()?, key, 1)
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Type `text` into the focused window, pasting when it is long.
pub fn type_text(text: &str) -> Result<(), KeyboardError> {
    if text.chars().count() > PASTE_THRESHOLD {
        return paste_text(text);
    }
    enigo()?
        .text(text)
        .map_err(|e| KeyboardError::Simulation(e.to_string()))
}

/// Put `text` on the clipboard, send the paste shortcut, then restore the
/// previous clipboard text.
pub fn paste_text(text: &str) -> Result<(), KeyboardError> {
    let mut clipboard = Clipboard::new().map_err(|e| KeyboardError::Clipboard(e.to_string()))?;
    let saved = clipboard.get_text().ok();
    clipboard
        .set_text(text)
        .map_err(|e| KeyboardError::Clipboard(e.to_string()))?;

    let modifier = if cfg!(target_os = "macos") {
        Key::Meta
    } else {
        Key::Control
    };
    let mut enigo = enigo()?;
    let sim = |e: enigo::InputError| KeyboardError::Simulation(e.to_string());
    enigo.key(modifier, Direction::Press).map_err(sim)?;
    let pasted = enigo.key(Key::Unicode('v'), Direction::Click).map_err(sim);
    enigo.key(modifier, Direction::Release).map_err(sim)?;
    pasted?;

    thread::sleep(PASTE_SETTLE);
    if let Some(previous) = saved {
        if let Err(e) = clipboard.set_text(previous) {
            log::warn!("actions: could not restore clipboard: {e}");
        }
    }
    Ok(())
}
