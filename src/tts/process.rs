//! [`SpeechOutput`] backed by the platform's command-line synthesiser.
//!
//! * Linux:   `espeak-ng -v <voice> -s <rate> <text>`
//! * macOS:   `say -r <rate> <text>`
//! * Windows: PowerShell `System.Speech` reading the text from the environment
//!
//! `tts.command` overrides the program; it then receives the text as its only
//! argument.

use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{SpeechOutput, TtsError};
use crate::config::TtsConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(30);

#[cfg(windows)]
const TEXT_ENV: &str = "JARVIS_TTS_TEXT";

// ---------------------------------------------------------------------------
// SpeechCommand
// ---------------------------------------------------------------------------

/// Program, arguments and environment for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl SpeechCommand {
    pub fn for_text(config: &TtsConfig, text: &str) -> Self {
        match &config.command {
            Some(program) => Self {
                program: program.clone(),
                args: vec![text.to_string()],
                env: Vec::new(),
            },
            None => Self::platform_default(config, text),
        }
    }

    #[cfg(target_os = "macos")]
    fn platform_default(config: &TtsConfig, text: &str) -> Self {
        Self {
            program: "say".into(),
            args: vec!["-r".into(), config.rate.to_string(), text.to_string()],
            env: Vec::new(),
        }
    }

    #[cfg(windows)]
    fn platform_default(config: &TtsConfig, text: &str) -> Self {
        // SAPI rate is -10..10 with 0 ≈ 180 wpm.
        let rate = ((config.rate as i32 - 180) / 20).clamp(-10, 10);
        let script = format!(
            "Add-Type -AssemblyName System.Speech; \
             $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
             $s.Rate = {rate}; $s.Speak($env:{TEXT_ENV})"
        );
        Self {
            program: "powershell".into(),
            args: vec!["-NoProfile".into(), "-Command".into(), script],
            env: vec![(TEXT_ENV.into(), text.to_string())],
        }
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    fn platform_default(config: &TtsConfig, text: &str) -> Self {
        Self {
            program: "espeak-ng".into(),
            args: vec![
                "-v".into(),
                config.voice.clone(),
                "-s".into(),
                config.rate.to_string(),
                "--".into(),
                text.to_string(),
            ],
            env: Vec::new(),
        }
    }

    fn spawn(&self) -> Result<Child, TtsError> {
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| TtsError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// CommandSpeech
// ---------------------------------------------------------------------------

/// The running child and the number of `stop()` calls so far.  Kept under
/// one lock so a child spawned after a stop is never registered.
#[derive(Default)]
struct Slot {
    child: Option<Child>,
    stops: u64,
}

/// One synthesiser child at a time; a new utterance replaces the old one.
pub struct CommandSpeech {
    config: TtsConfig,
    slot: Mutex<Slot>,
}

impl CommandSpeech {
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.lock().child.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl SpeechOutput for CommandSpeech {
    fn speak_unless_stopped(&self, text: &str, since: u64) -> Result<(), TtsError> {
        let text = text.trim();
        if text.is_empty() || self.lock().stops != since {
            return Ok(());
        }

        let mut child = SpeechCommand::for_text(&self.config, text).spawn()?;
        let id = child.id();

        {
            let mut slot = self.lock();
            if slot.stops != since {
                drop(slot);
                log::debug!("tts: stopped while starting, dropping {text:?}");
                kill(&mut child);
                return Ok(());
            }
            log::debug!("tts: speaking {text:?} (pid {id})");
            if let Some(mut old) = slot.child.replace(child) {
                kill(&mut old);
            }
        }

        loop {
            {
                let mut slot = self.lock();
                let Some(child) = slot.child.as_mut().filter(|c| c.id() == id) else {
                    // Stopped or replaced by a newer utterance.
                    return Ok(());
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        slot.child.take();
                        return if status.success() {
                            Ok(())
                        } else {
                            Err(TtsError::Exit(status.code()))
                        };
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some(mut c) = slot.child.take() {
                            kill(&mut c);
                        }
                        return Err(e.into());
                    }
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn stop(&self) {
        let child = {
            let mut slot = self.lock();
            slot.stops += 1;
            slot.child.take()
        };
        if let Some(mut child) = child {
            log::debug!("tts: stopping pid {}", child.id());
            kill(&mut child);
        }
    }

    fn stop_count(&self) -> u64 {
        self.lock().stops
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
