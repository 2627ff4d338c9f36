//! Application entry point — JARVIS voice assistant.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (defaults on first run).
//! 3. Build the engines: microphone, Whisper, LLM client, speech, desktop
//!    actions.  A missing Whisper model degrades to a transcriber that always
//!    fails, so the assistant still starts and apologises.
//! 4. Create the orchestrator and the trigger channel.
//! 5. Start the hotkey listener and, when enabled, the WebSocket server.
//! 6. Greet, then run until the trigger channel closes or Ctrl-C.
//!
//! `jarvis enroll` records the user's voice for speaker verification and
//! `jarvis forget-voice` deletes it.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use jarvis_voice::{
    actions::{ActionTable, DesktopController},
    audio::{AudioBuffer, CaptureEngine, CapturePolicy, MicrophoneCapture},
    auth::{ProfileVerifier, SpeakerVerifier},
    config::{AppConfig, AppPaths},
    hotkey::{parse_key, HotkeyListener},
    llm::ApiInference,
    pipeline::{Engines, PipelineOrchestrator, PipelineSettings, TokenSource, TriggerSource},
    server::{self, ServerState},
    stt::{SttError, TranscribeParams, Transcriber, Transcript, WhisperEngine},
    tts::{CommandSpeech, SpeechOutput},
};

const GREETING: &str = "Bom dia, senhor. Todos os sistemas operacionais e prontos.";
const FAREWELL: &str = "Até logo, senhor.";
const FAREWELL_LIMIT: Duration = Duration::from_secs(5);

const ENROLL_PHRASES: [&str; 5] = [
    "Jarvis, ativar sistema de segurança",
    "Esta é a minha voz",
    "Abrir configurações do computador",
    "Reproduzir minha playlist favorita",
    "Qual a previsão do tempo para amanhã",
];
const ENROLL_RECORD_SECS: f32 = 4.0;

/// JARVIS - voice command assistant
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Record your voice so only you can give commands
    Enroll {
        /// Number of phrases to record
        #[arg(short, long, default_value_t = 5)]
        samples: usize,
    },
    /// Delete the enrolled voice profile
    ForgetVoice,
}

// ---------------------------------------------------------------------------
// NoModelTranscriber — used when the Whisper model file is missing
// ---------------------------------------------------------------------------

struct NoModelTranscriber {
    path: String,
}

impl Transcriber for NoModelTranscriber {
    fn transcribe(&self, _audio: &AudioBuffer) -> Result<Transcript, SttError> {
        Err(SttError::ModelNotFound(self.path.clone()))
    }
}

fn load_transcriber(config: &AppConfig) -> Arc<dyn Transcriber> {
    let model_path = AppPaths::new().model_file(&config.stt.model);
    match WhisperEngine::load(&model_path, TranscribeParams::from_config(&config.stt)) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            log::warn!(
                "Could not load Whisper model ({}): {e}. Commands will not be understood.",
                model_path.display()
            );
            Arc::new(NoModelTranscriber {
                path: model_path.display().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

// ---------------------------------------------------------------------------
// Voice enrolment
// ---------------------------------------------------------------------------

fn enroll(config: &AppConfig, verifier: &ProfileVerifier, samples: usize) -> anyhow::Result<()> {
    let capture = MicrophoneCapture::new(config.audio.input_device.clone());
    let speech = CommandSpeech::new(config.tts.clone());
    let mut policy = CapturePolicy::from_config(&config.audio);
    policy.max_duration = Duration::from_secs_f32(ENROLL_RECORD_SECS);
    let token = TokenSource::new().current().clone();

    let mut recordings = Vec::with_capacity(samples);
    for (i, phrase) in ENROLL_PHRASES.iter().cycle().take(samples).enumerate() {
        log::info!("Phrase {}/{samples}: \"{phrase}\"", i + 1);
        if let Err(e) = speech.speak(&format!("Repita: {phrase}")) {
            log::warn!("Prompt failed: {e}");
        }
        match capture.capture(&policy, &token)? {
            Some(audio) => recordings.push(audio),
            None => log::warn!("Nothing recorded for phrase {}", i + 1),
        }
    }

    let profile = verifier.enroll(&recordings)?;
    log::info!(
        "Voice enrolled from {} recordings: {}",
        profile.samples,
        verifier.path().display()
    );
    if let Err(e) = speech.speak("Voz cadastrada com sucesso, senhor.") {
        log::warn!("Confirmation failed: {e}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let verifier = Arc::new(ProfileVerifier::from_config(
        &config.voice_auth,
        &AppPaths::new(),
    ));

    match cli.command {
        Some(Command::Enroll { samples }) => {
            let config = config.clone();
            let verifier = Arc::clone(&verifier);
            return tokio::task::spawn_blocking(move || {
                enroll(&config, &verifier, samples.max(1))
            })
            .await?;
        }
        Some(Command::ForgetVoice) => {
            verifier.delete()?;
            log::info!("Voice profile removed: {}", verifier.path().display());
            return Ok(());
        }
        None => {}
    }
    log::info!("JARVIS starting up");

    // 3. Engines
    let speech = Arc::new(CommandSpeech::new(config.tts.clone()));
    let engines = Engines {
        capture: Arc::new(MicrophoneCapture::new(config.audio.input_device.clone())),
        verifier: verifier.clone(),
        transcriber: load_transcriber(&config),
        inference: Arc::new(ApiInference::from_config(&config.llm)),
        speech: speech.clone(),
        actions: ActionTable::new(Arc::new(DesktopController::new(config.actions.clone()))),
    };
    if config.voice_auth.enabled && !verifier.has_profile() {
        log::info!("No voice profile enrolled; accepting any speaker (run `jarvis enroll`)");
    }

    // 4. Orchestrator
    let orchestrator = PipelineOrchestrator::new(engines, PipelineSettings::from_config(&config));
    let (trigger_tx, trigger_rx) = mpsc::channel::<TriggerSource>(16);

    // 5. Trigger sources
    let key = parse_key(&config.hotkey.trigger_key).unwrap_or_else(|| {
        log::warn!(
            "Unknown trigger key {:?}; falling back to F9",
            config.hotkey.trigger_key
        );
        rdev::Key::F9
    });
    let _hotkey = match HotkeyListener::start(key, trigger_tx.clone()) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::error!("Hotkey listener unavailable: {e}");
            None
        }
    };

    if config.server.enabled {
        let state = Arc::new(ServerState {
            broadcaster: orchestrator.broadcaster(),
            triggers: trigger_tx.clone(),
        });
        let server_config = config.server.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(&server_config, state).await {
                log::error!("State server stopped: {e:#}");
            }
        });
    }
    drop(trigger_tx);

    // 6. Greet and run
    {
        let speech = speech.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = speech.speak(GREETING) {
                log::warn!("Greeting failed: {e}");
            }
        });
    }
    log::info!("Ready. Press {key:?} to give a command.");

    tokio::select! {
        result = orchestrator.clone().run(trigger_rx) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
    }

    orchestrator.shutdown().await;
    let farewell = tokio::task::spawn_blocking(move || speech.speak(FAREWELL));
    match tokio::time::timeout(FAREWELL_LIMIT, farewell).await {
        Ok(Ok(Err(e))) => log::warn!("Farewell failed: {e}"),
        Ok(Err(e)) => log::warn!("Farewell task failed: {e}"),
        Ok(Ok(Ok(()))) | Err(_) => {}
    }

    log::info!("JARVIS stopped");
    Ok(())
}
