//! Pipeline orchestrator — one preemptible voice command at a time.
//!
//! [`PipelineOrchestrator::trigger`] starts a run as an independent tokio task
//! and returns immediately.  A run walks the stages below; a new trigger
//! raises the running generation's token, waits a bounded time for the task
//! to wind down and then starts the next generation.
//!
//! ```text
//! trigger
//!   └─▶ Listening   spawn_blocking(capture)          short/empty ─▶ Idle
//!   └─▶ Processing  spawn_blocking(verify)           rejected ─────▶ Error ─▶ Idle
//!                   spawn_blocking(transcribe)       unusable ─────▶ Error ─▶ Idle
//!                   infer (timeout)                  failure ──────▶ Error ─▶ Idle
//!                   commit history, parse reply
//!   └─▶ Executing   spawn_blocking(dispatch)         (only when an action was requested)
//!   └─▶ Idle        speech spawned detached
//! ```
//!
//! State, token source and history live behind one `std::sync::Mutex`; it is
//! never held across an `.await`.  Every state change and history commit
//! re-validates the run's token inside that critical section, so a preempted
//! run can neither publish nor append once the next generation exists.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::actions::{ActionKind, ActionRequest, ActionTable};
use crate::audio::{AudioBuffer, CaptureEngine, CapturePolicy};
use crate::auth::SpeakerVerifier;
use crate::config::AppConfig;
use crate::llm::{
    parse_response, ChatMessage, ConversationHistory, InferenceEngine, LlmError, SystemPrompt,
};
use crate::stt::Transcriber;
use crate::tts::SpeechOutput;

use super::broadcast::StateBroadcaster;
use super::cancel::{CancellationToken, TokenSource};
use super::error::PipelineError;
use super::state::{PipelineState, StateEvent};

/// How often long awaits look at the run's token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// TriggerSource
// ---------------------------------------------------------------------------

/// Where a trigger came from.  Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Hotkey,
    Interface,
}

// ---------------------------------------------------------------------------
// Engines / PipelineSettings
// ---------------------------------------------------------------------------

/// External collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct Engines {
    pub capture: Arc<dyn CaptureEngine>,
    pub verifier: Arc<dyn SpeakerVerifier>,
    pub transcriber: Arc<dyn Transcriber>,
    pub inference: Arc<dyn InferenceEngine>,
    pub speech: Arc<dyn SpeechOutput>,
    pub actions: ActionTable,
}

/// The slice of [`AppConfig`] the orchestrator needs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub capture: CapturePolicy,
    /// Recordings shorter than this end the run quietly.
    pub min_capture: Duration,
    pub verify_speaker: bool,
    pub min_confidence: f32,
    pub system_prompt: SystemPrompt,
    pub inference_timeout: Duration,
    pub history_exchanges: usize,
    pub preempt_wait: Duration,
    pub error_dwell: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capture: CapturePolicy::from_config(&config.audio),
            min_capture: Duration::from_secs_f32(config.audio.min_capture_secs.max(0.0)),
            verify_speaker: config.voice_auth.enabled,
            min_confidence: config.stt.min_confidence,
            system_prompt: SystemPrompt::new(
                &config.llm.system_prompt,
                &config.assistant.user_name,
            ),
            inference_timeout: Duration::from_secs(config.llm.timeout_secs),
            history_exchanges: config.pipeline.history_exchanges,
            preempt_wait: Duration::from_millis(config.pipeline.preempt_wait_ms),
            error_dwell: Duration::from_millis(config.pipeline.error_dwell_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Verify,
    Transcribe,
    Infer,
    Execute,
    Speak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Summary of one generation's run.
#[derive(Debug, Clone)]
pub struct Run {
    pub generation: u64,
    pub started: Instant,
    pub stage: Stage,
    pub outcome: Option<RunOutcome>,
}

impl Run {
    fn start(generation: u64) -> Self {
        Self {
            generation,
            started: Instant::now(),
            stage: Stage::Capture,
            outcome: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

struct Control {
    state: PipelineState,
    tokens: TokenSource,
    history: ConversationHistory,
    task: Option<JoinHandle<()>>,
    last_run: Option<Run>,
}

struct Inner {
    engines: Engines,
    settings: PipelineSettings,
    broadcaster: StateBroadcaster,
    control: Mutex<Control>,
}

/// Owns the single active run.  Cheap to clone; clones share everything.
///
/// ```rust,ignore
/// let orchestrator = PipelineOrchestrator::new(engines, PipelineSettings::from_config(&config));
/// let mut events = orchestrator.subscribe();
///
/// let (tx, rx) = tokio::sync::mpsc::channel(16);
/// tokio::spawn(orchestrator.clone().run(rx));
/// tx.send(TriggerSource::Hotkey).await?;
/// ```
#[derive(Clone)]
pub struct PipelineOrchestrator {
    inner: Arc<Inner>,
}

impl PipelineOrchestrator {
    pub fn new(engines: Engines, settings: PipelineSettings) -> Self {
        let history = ConversationHistory::new(settings.history_exchanges);
        Self {
            inner: Arc::new(Inner {
                engines,
                settings,
                broadcaster: StateBroadcaster::new(),
                control: Mutex::new(Control {
                    state: PipelineState::Idle,
                    tokens: TokenSource::new(),
                    history,
                    task: None,
                    last_run: None,
                }),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PipelineState {
        self.inner.lock().state
    }

    pub fn broadcaster(&self) -> StateBroadcaster {
        self.inner.broadcaster.clone()
    }

    /// Shorthand for `broadcaster().subscribe()`.
    pub fn subscribe(&self) -> mpsc::Receiver<StateEvent> {
        self.inner.broadcaster.subscribe()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner.lock().history.snapshot()
    }

    pub fn clear_history(&self) {
        self.inner.lock().history.clear();
    }

    /// The most recent run that has finished.
    pub fn last_run(&self) -> Option<Run> {
        self.inner.lock().last_run.clone()
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Preempt whatever is running and start a new run.
    ///
    /// Returns the new run's generation as soon as its task is spawned.
    pub async fn trigger(&self) -> Result<u64, PipelineError> {
        let previous = {
            let control = &mut *self.inner.lock();
            if control.state != PipelineState::Idle {
                log::debug!(
                    "pipeline: preempting generation {} in {:?}",
                    control.tokens.current().generation(),
                    control.state
                );
                control.tokens.cancel();
            }
            // Also silences a reply still being spoken after Idle.
            self.inner.engines.speech.stop();
            control.task.take()
        };

        if let Some(handle) = previous {
            let wait = self.inner.settings.preempt_wait;
            match tokio::time::timeout(wait, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("pipeline: previous run task failed: {e}"),
                Err(_) => log::warn!(
                    "pipeline: previous run still busy after {wait:?}, detaching it"
                ),
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PipelineError::Schedule(e.to_string()))?;

        let control = &mut *self.inner.lock();
        let token = control.tokens.reset();
        let generation = token.generation();
        control.state = PipelineState::Listening;
        self.inner
            .broadcaster
            .publish(StateEvent::new(PipelineState::Listening, "", generation));
        log::debug!("pipeline: generation {generation} → Listening");

        let inner = Arc::clone(&self.inner);
        control.task = Some(runtime.spawn(inner.execute(token)));
        Ok(generation)
    }

    /// Start a run for every trigger received, in arrival order, until the
    /// channel closes.  The run in flight at that point is allowed to finish.
    pub async fn run(
        self,
        mut triggers: mpsc::Receiver<TriggerSource>,
    ) -> Result<(), PipelineError> {
        while let Some(source) = triggers.recv().await {
            let generation = self.trigger().await?;
            log::info!("pipeline: {source:?} trigger started generation {generation}");
        }

        log::info!("pipeline: trigger channel closed, orchestrator shutting down");
        self.wait_idle().await;
        Ok(())
    }

    /// Wait for the current run task, if any, to end.
    pub async fn wait_idle(&self) {
        let handle = self.inner.lock().task.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("pipeline: run task failed: {e}");
            }
        }
    }

    /// Cancel the current run and stop speech, waiting at most the
    /// preemption bound for the task to end.
    pub async fn shutdown(&self) {
        let handle = {
            let control = &mut *self.inner.lock();
            control.tokens.cancel();
            control.task.take()
        };
        self.inner.engines.speech.stop();

        if let Some(handle) = handle {
            if tokio::time::timeout(self.inner.settings.preempt_wait, handle)
                .await
                .is_err()
            {
                log::warn!("pipeline: run did not stop before shutdown");
            }
        }
        let control = &mut *self.inner.lock();
        control.state = PipelineState::Idle;
        self.inner.broadcaster.publish(StateEvent::new(
            PipelineState::Idle,
            "",
            control.tokens.current().generation(),
        ));
    }
}

// ---------------------------------------------------------------------------
// Run execution
// ---------------------------------------------------------------------------

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(self: Arc<Self>, token: CancellationToken) {
        let mut run = Run::start(token.generation());

        let outcome = match self.stages(&token, &mut run).await {
            Ok(()) => RunOutcome::Completed,
            Err(PipelineError::Cancelled) => RunOutcome::Cancelled,
            // Nothing was said: a quiet no-op, not a failure.
            Err(PipelineError::CaptureTooShort) => {
                let _ = self.set_state(&token, PipelineState::Idle, "");
                RunOutcome::Completed
            }
            Err(e) => {
                self.fail(&token, e).await;
                RunOutcome::Failed
            }
        };
        run.outcome = Some(outcome);

        log::info!(
            "pipeline: generation {} {:?} at {:?} after {:?}",
            run.generation,
            outcome,
            run.stage,
            run.started.elapsed()
        );

        let mut control = self.lock();
        let newer_recorded = control
            .last_run
            .as_ref()
            .is_some_and(|r| r.generation > run.generation);
        if !newer_recorded {
            control.last_run = Some(run);
        }
    }

    async fn stages(
        &self,
        token: &CancellationToken,
        run: &mut Run,
    ) -> Result<(), PipelineError> {
        run.stage = Stage::Capture;
        let audio = Arc::new(self.capture(token).await?);
        self.set_state(token, PipelineState::Processing, "")?;

        if self.settings.verify_speaker {
            run.stage = Stage::Verify;
            self.verify(token, Arc::clone(&audio)).await?;
        }

        run.stage = Stage::Transcribe;
        let text = self.transcribe(token, audio).await?;

        run.stage = Stage::Infer;
        let reply = self.infer(token, &text).await?;
        let request = parse_response(&reply);
        log::debug!(
            "pipeline: action {} ({:?})",
            request.kind,
            request.parameter
        );

        if !request.is_no_action() {
            run.stage = Stage::Execute;
            self.set_state(token, PipelineState::Executing, "")?;
            self.dispatch(token, &request).await?;
        }

        run.stage = Stage::Speak;
        self.finish(token, request.speech)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn capture(&self, token: &CancellationToken) -> Result<AudioBuffer, PipelineError> {
        let engine = Arc::clone(&self.engines.capture);
        let policy = self.settings.capture.clone();
        let cancel = token.clone();
        let captured = self
            .blocking(token, move || engine.capture(&policy, &cancel))
            .await?;

        match captured {
            Ok(Some(audio)) if audio.duration_secs() >= self.settings.min_capture.as_secs_f32() => {
                log::debug!("pipeline: captured {:.2}s", audio.duration_secs());
                Ok(audio)
            }
            Ok(Some(audio)) => {
                log::debug!("pipeline: capture too short ({:.2}s)", audio.duration_secs());
                Err(PipelineError::CaptureTooShort)
            }
            Ok(None) => Err(PipelineError::CaptureTooShort),
            Err(e) => {
                log::warn!("pipeline: capture failed: {e}");
                Err(PipelineError::CaptureTooShort)
            }
        }
    }

    async fn verify(
        &self,
        token: &CancellationToken,
        audio: Arc<AudioBuffer>,
    ) -> Result<(), PipelineError> {
        let verifier = Arc::clone(&self.engines.verifier);
        let verdict = self
            .blocking(token, move || {
                verifier
                    .has_profile()
                    .then(|| verifier.verify(&audio))
            })
            .await?;

        match verdict {
            None => {
                log::debug!("pipeline: no voice profile, skipping verification");
                Ok(())
            }
            Some(Ok(v)) if v.accepted => Ok(()),
            Some(Ok(v)) => {
                log::info!("pipeline: speaker rejected (score {:.2})", v.score);
                Err(PipelineError::VerificationRejected)
            }
            Some(Err(e)) => {
                log::warn!("pipeline: verification error: {e}");
                Err(PipelineError::VerificationRejected)
            }
        }
    }

    async fn transcribe(
        &self,
        token: &CancellationToken,
        audio: Arc<AudioBuffer>,
    ) -> Result<String, PipelineError> {
        let transcriber = Arc::clone(&self.engines.transcriber);
        let transcript = self
            .blocking(token, move || transcriber.transcribe(&audio))
            .await?
            .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

        if transcript.is_unusable(self.settings.min_confidence) {
            log::info!(
                "pipeline: transcript unusable {:?} (confidence {:.2})",
                transcript.text,
                transcript.confidence
            );
            return Err(PipelineError::TranscriptionLowConfidence);
        }
        log::info!("pipeline: heard {:?}", transcript.text);
        Ok(transcript.text.trim().to_string())
    }

    /// Ask the model, then commit the exchange to history.
    ///
    /// A reply commits both messages; a failed or timed-out inference still
    /// commits the user message.  Nothing is committed once the run is stale.
    async fn infer(
        &self,
        token: &CancellationToken,
        user_text: &str,
    ) -> Result<String, PipelineError> {
        checkpoint(token)?;
        let history = self.lock().history.snapshot();
        let system = self.settings.system_prompt.render();
        let timeout = self.settings.inference_timeout;

        let request = self
            .engines
            .inference
            .infer(&system, &history, user_text, timeout);
        let outcome = until_cancelled(token, tokio::time::timeout(timeout, request)).await?;

        let reply = match outcome {
            Err(_) | Ok(Err(LlmError::Timeout)) => Err(PipelineError::InferenceTimeout),
            Ok(Err(e)) => Err(PipelineError::InferenceFailure(e.to_string())),
            Ok(Ok(reply)) if reply.trim().is_empty() => {
                Err(PipelineError::InferenceFailure("empty reply".into()))
            }
            Ok(Ok(reply)) => Ok(reply),
        };

        let control = &mut *self.lock();
        if !control.tokens.is_live(token) {
            return Err(PipelineError::Cancelled);
        }
        control.history.push(ChatMessage::user(user_text));
        if let Ok(reply) = &reply {
            control.history.push(ChatMessage::assistant(reply.clone()));
        }
        reply
    }

    /// Run the requested action.  Failures are logged; the run continues.
    ///
    /// An action already handed to the executor is not abandoned on
    /// preemption; the run gives up right after it returns.
    async fn dispatch(
        &self,
        token: &CancellationToken,
        request: &ActionRequest,
    ) -> Result<(), PipelineError> {
        checkpoint(token)?;
        let table = self.engines.actions.clone();
        let kind = request.kind.clone();
        let parameter = request.parameter.clone();

        let result = tokio::task::spawn_blocking(move || table.dispatch(&kind, parameter.as_deref()))
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        if result.success {
            log::info!("pipeline: {} → {}", request.kind, result.message);
        } else {
            let err = if ActionKind::from_identifier(&request.kind).is_none() {
                PipelineError::UnknownActionKind(request.kind.clone())
            } else {
                PipelineError::ActionExecutionFailure(result.message)
            };
            log::warn!("pipeline: {err}");
        }
        checkpoint(token)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn set_state(
        &self,
        token: &CancellationToken,
        state: PipelineState,
        text: &str,
    ) -> Result<(), PipelineError> {
        let control = &mut *self.lock();
        if !control.tokens.is_live(token) {
            return Err(PipelineError::Cancelled);
        }
        control.state = state;
        self.broadcaster
            .publish(StateEvent::new(state, text, token.generation()));
        log::debug!("pipeline: generation {} → {state:?}", token.generation());
        Ok(())
    }

    /// Final `Idle` carrying the reply, with the reply spoken detached.
    fn finish(&self, token: &CancellationToken, speech: String) -> Result<(), PipelineError> {
        let control = &mut *self.lock();
        if !control.tokens.is_live(token) {
            return Err(PipelineError::Cancelled);
        }
        control.state = PipelineState::Idle;
        self.broadcaster.publish(StateEvent::new(
            PipelineState::Idle,
            speech.clone(),
            token.generation(),
        ));
        self.speak_detached(speech);
        Ok(())
    }

    async fn fail(&self, token: &CancellationToken, err: PipelineError) {
        match err {
            PipelineError::Cancelled => {}
            err => {
                log::warn!("pipeline: generation {} failed: {err}", token.generation());
                let apology = err.apology();
                {
                    let control = &mut *self.lock();
                    if !control.tokens.is_live(token) {
                        return;
                    }
                    control.state = PipelineState::Error;
                    self.broadcaster.publish(StateEvent::new(
                        PipelineState::Error,
                        apology,
                        token.generation(),
                    ));
                    self.speak_detached(apology.to_string());
                }
                if until_cancelled(token, tokio::time::sleep(self.settings.error_dwell))
                    .await
                    .is_ok()
                {
                    let _ = self.set_state(token, PipelineState::Idle, "");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Run `f` on the blocking pool, abandoning it if the token is raised.
    async fn blocking<T, F>(&self, token: &CancellationToken, f: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        checkpoint(token)?;
        let joined = until_cancelled(token, tokio::task::spawn_blocking(f)).await?;
        let value = joined.map_err(|e| PipelineError::Internal(e.to_string()))?;
        checkpoint(token)?;
        Ok(value)
    }

    /// Speak `text` on the blocking pool.
    ///
    /// Called with the control lock held, the same lock `trigger` holds while
    /// stopping speech, so the next trigger always silences this utterance,
    /// even one that has not started yet.
    fn speak_detached(&self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let speech = Arc::clone(&self.engines.speech);
        let since = speech.stop_count();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = speech.speak_unless_stopped(&text, since) {
                log::warn!("pipeline: speech failed: {e}");
            }
        });
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Await `fut`, or give up with `Cancelled` once the token is raised.
async fn until_cancelled<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        out = fut => Ok(out),
        _ = cancelled(token) => Err(PipelineError::Cancelled),
    }
}

async fn cancelled(token: &CancellationToken) {
    while !token.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::actions::{ActionExecutor, ActionResult};
    use crate::audio::CaptureError;
    use crate::auth::{Verification, VerifyError};
    use crate::stt::{SttError, Transcript};
    use crate::tts::TtsError;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Blocks for `first_delay` on the first call only.
    fn stall_first(calls: &AtomicUsize, first_delay: Duration) {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(first_delay);
        }
    }

    /// Returns silence of a fixed length.
    struct ScriptedCapture {
        secs: f32,
        first_delay: Duration,
        calls: AtomicUsize,
    }

    impl CaptureEngine for ScriptedCapture {
        fn capture(
            &self,
            policy: &CapturePolicy,
            _cancel: &CancellationToken,
        ) -> Result<Option<AudioBuffer>, CaptureError> {
            stall_first(&self.calls, self.first_delay);
            let n = (self.secs * policy.sample_rate as f32) as usize;
            Ok(Some(AudioBuffer::new(vec![0.0; n], policy.sample_rate)))
        }
    }

    #[derive(Default)]
    struct ScriptedVerifier {
        enrolled: bool,
        score: f32,
        first_delay: Duration,
        calls: AtomicUsize,
    }

    impl SpeakerVerifier for ScriptedVerifier {
        fn has_profile(&self) -> bool {
            self.enrolled
        }

        fn verify(&self, _audio: &AudioBuffer) -> Result<Verification, VerifyError> {
            stall_first(&self.calls, self.first_delay);
            Ok(Verification::from_score(self.score, 0.8))
        }
    }

    struct ScriptedTranscriber {
        transcript: Transcript,
        first_delay: Duration,
        calls: AtomicUsize,
    }

    impl Transcriber for ScriptedTranscriber {
        fn transcribe(&self, _audio: &AudioBuffer) -> Result<Transcript, SttError> {
            stall_first(&self.calls, self.first_delay);
            Ok(self.transcript.clone())
        }
    }

    /// Pops `(delay, reply)` per call; the last entry repeats.
    struct ScriptedInference {
        script: Mutex<VecDeque<(Duration, String)>>,
        calls: AtomicUsize,
    }

    impl ScriptedInference {
        fn new(script: &[(u64, &str)]) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .iter()
                        .map(|(ms, reply)| (Duration::from_millis(*ms), reply.to_string()))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceEngine for ScriptedInference {
        async fn infer(
            &self,
            _system_prompt: &str,
            _history: &[ChatMessage],
            _user_text: &str,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, reply) = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap()
                }
            };
            tokio::time::sleep(delay).await;
            Ok(reply)
        }
    }

    /// Records what would have been heard.  `start_delay` models the time a
    /// synthesiser takes to start, during which a stop still silences it.
    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<String>>,
        stops: AtomicUsize,
        start_delay: Duration,
    }

    impl SpeechOutput for RecordingSpeech {
        fn speak_unless_stopped(&self, text: &str, since: u64) -> Result<(), TtsError> {
            std::thread::sleep(self.start_delay);
            let mut spoken = self.spoken.lock().unwrap();
            if self.stop_count() == since {
                spoken.push(text.to_string());
            }
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn stop_count(&self) -> u64 {
            self.stops.load(Ordering::SeqCst) as u64
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(ActionKind, Option<String>)>>,
        delay: Duration,
    }

    impl ActionExecutor for RecordingExecutor {
        fn execute(&self, kind: ActionKind, parameter: Option<&str>) -> ActionResult {
            std::thread::sleep(self.delay);
            self.calls
                .lock()
                .unwrap()
                .push((kind, parameter.map(str::to_string)));
            ActionResult::ok("ok")
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        orc: PipelineOrchestrator,
        events: mpsc::Receiver<StateEvent>,
        capture: Arc<ScriptedCapture>,
        verifier: Arc<ScriptedVerifier>,
        transcriber: Arc<ScriptedTranscriber>,
        inference: Arc<ScriptedInference>,
        speech: Arc<RecordingSpeech>,
        executor: Arc<RecordingExecutor>,
    }

    struct Setup {
        capture_secs: f32,
        capture_delay: Duration,
        verifier: ScriptedVerifier,
        transcript: Transcript,
        transcribe_delay: Duration,
        script: Vec<(u64, &'static str)>,
        action_delay: Duration,
        speech_delay: Duration,
        settings: PipelineSettings,
    }

    impl Default for Setup {
        fn default() -> Self {
            let mut settings = PipelineSettings::from_config(&AppConfig::default());
            settings.error_dwell = Duration::from_millis(20);
            settings.inference_timeout = Duration::from_secs(2);
            Self {
                capture_secs: 1.0,
                capture_delay: Duration::ZERO,
                verifier: ScriptedVerifier::default(),
                transcript: Transcript::new("abre o chrome", 0.9),
                transcribe_delay: Duration::ZERO,
                script: vec![(0, "[ACTION: ABRIR_PROGRAMA][PARAM: chrome] Abrindo, senhor.")],
                action_delay: Duration::ZERO,
                speech_delay: Duration::ZERO,
                settings,
            }
        }
    }

    fn harness(setup: Setup) -> Harness {
        let capture = Arc::new(ScriptedCapture {
            secs: setup.capture_secs,
            first_delay: setup.capture_delay,
            calls: AtomicUsize::new(0),
        });
        let verifier = Arc::new(setup.verifier);
        let transcriber = Arc::new(ScriptedTranscriber {
            transcript: setup.transcript,
            first_delay: setup.transcribe_delay,
            calls: AtomicUsize::new(0),
        });
        let inference = Arc::new(ScriptedInference::new(&setup.script));
        let speech = Arc::new(RecordingSpeech {
            start_delay: setup.speech_delay,
            ..Default::default()
        });
        let executor = Arc::new(RecordingExecutor {
            delay: setup.action_delay,
            ..Default::default()
        });

        let engines = Engines {
            capture: capture.clone(),
            verifier: verifier.clone(),
            transcriber: transcriber.clone(),
            inference: inference.clone(),
            speech: speech.clone(),
            actions: ActionTable::new(executor.clone()),
        };
        let orc = PipelineOrchestrator::new(engines, setup.settings);
        let events = orc.subscribe();

        Harness {
            orc,
            events,
            capture,
            verifier,
            transcriber,
            inference,
            speech,
            executor,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<StateEvent>) -> Vec<StateEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn states(events: &[StateEvent]) -> Vec<PipelineState> {
        events.iter().map(|e| e.state).collect()
    }

    async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    use crate::pipeline::state::PipelineState::{Error, Executing, Idle, Listening, Processing};

    // -----------------------------------------------------------------------
    // Single runs
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_capture_returns_to_idle_without_processing() {
        let mut h = harness(Setup {
            capture_secs: 0.2,
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        assert_eq!(states(&drain(&mut h.events)), [Idle, Listening, Idle]);
        assert_eq!(h.capture.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.orc.last_run().unwrap().outcome,
            Some(RunOutcome::Completed)
        );
        assert!(h.speech.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn action_reply_executes_and_speaks() {
        let mut h = harness(Setup::default());

        let generation = h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        assert_eq!(
            states(&events),
            [Idle, Listening, Processing, Executing, Idle]
        );
        assert!(events[1..].iter().all(|e| e.generation == generation));
        assert_eq!(events.last().unwrap().text, "Abrindo, senhor.");

        assert_eq!(
            *h.executor.calls.lock().unwrap(),
            vec![(ActionKind::OpenProgram, Some("chrome".to_string()))]
        );

        let history = h.orc.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("abre o chrome"));
        assert_eq!(
            history[1].content,
            "[ACTION: ABRIR_PROGRAMA][PARAM: chrome] Abrindo, senhor."
        );

        let speech = h.speech.clone();
        assert!(
            eventually(|| *speech.spoken.lock().unwrap() == ["Abrindo, senhor."]).await
        );
        assert_eq!(h.orc.state(), Idle);
        assert_eq!(
            h.orc.last_run().unwrap().outcome,
            Some(RunOutcome::Completed)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn conversation_reply_skips_executing() {
        let mut h = harness(Setup {
            script: vec![(0, "Roma foi fundada em 753 a.C., senhor.")],
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        assert_eq!(
            states(&drain(&mut h.events)),
            [Idle, Listening, Processing, Idle]
        );
        assert!(h.executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn inference_timeout_apologises_and_keeps_user_turn() {
        let mut settings = Setup::default().settings;
        settings.inference_timeout = Duration::from_millis(50);
        let mut h = harness(Setup {
            script: vec![(500, "tarde demais")],
            settings,
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        assert_eq!(states(&events), [Idle, Listening, Processing, Error, Idle]);
        assert_eq!(
            events[3].text,
            "Desculpe senhor, ocorreu um erro no processamento."
        );

        let history = h.orc.history();
        assert_eq!(history, vec![ChatMessage::user("abre o chrome")]);

        let speech = h.speech.clone();
        assert!(
            eventually(|| {
                speech
                    .spoken
                    .lock()
                    .unwrap()
                    .contains(&"Desculpe senhor, ocorreu um erro no processamento.".to_string())
            })
            .await
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn low_confidence_transcript_is_not_sent_to_model() {
        let mut h = harness(Setup {
            transcript: Transcript::new("abre o", 0.1),
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        assert_eq!(states(&events), [Idle, Listening, Processing, Error, Idle]);
        assert_eq!(events[3].text, "Desculpe senhor, não consegui entender.");
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 0);
        assert!(h.orc.history().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_speaker_is_not_transcribed() {
        let mut h = harness(Setup {
            verifier: ScriptedVerifier {
                enrolled: true,
                score: 0.5,
                ..Default::default()
            },
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        assert_eq!(states(&events), [Idle, Listening, Processing, Error, Idle]);
        assert_eq!(events[3].text, "Desculpe, não reconheço sua voz.");
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn accepted_speaker_proceeds() {
        let mut h = harness(Setup {
            verifier: ScriptedVerifier {
                enrolled: true,
                score: 0.95,
                ..Default::default()
            },
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        assert_eq!(states(&drain(&mut h.events)).last(), Some(&Idle));
        assert_eq!(h.executor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_action_still_speaks_reply() {
        let mut h = harness(Setup {
            script: vec![(0, "[AÇÃO: INFO_CLIMA] Está ensolarado, senhor.")],
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        assert_eq!(
            states(&events),
            [Idle, Listening, Processing, Executing, Idle]
        );
        assert_eq!(events.last().unwrap().text, "Está ensolarado, senhor.");
        assert!(h.executor.calls.lock().unwrap().is_empty());

        let speech = h.speech.clone();
        assert!(
            eventually(|| *speech.spoken.lock().unwrap() == ["Está ensolarado, senhor."]).await
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn history_is_bounded_across_runs() {
        let mut settings = Setup::default().settings;
        settings.history_exchanges = 2;
        let h = harness(Setup {
            script: vec![(0, "Certo, senhor.")],
            settings,
            ..Setup::default()
        });

        for _ in 0..5 {
            h.orc.trigger().await.unwrap();
            h.orc.wait_idle().await;
        }
        assert_eq!(h.orc.history().len(), 4);
    }

    // -----------------------------------------------------------------------
    // Preemption
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_trigger_preempts_run_in_processing() {
        let mut h = harness(Setup {
            script: vec![
                (500, "[AÇÃO: ABRIR_PROGRAMA][PARAM: chrome] Abrindo."),
                (0, "[AÇÃO: NENHUMA] Pois não, senhor?"),
            ],
            ..Setup::default()
        });

        let first = h.orc.trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.orc.state(), Processing);

        let started = Instant::now();
        let second = h.orc.trigger().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(second, first + 1);
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        let pivot = events
            .iter()
            .position(|e| e.state == Listening && e.generation == second)
            .unwrap();
        assert!(events[pivot..].iter().all(|e| e.generation == second));
        assert_eq!(
            states(&events[pivot..]),
            [Listening, Processing, Idle]
        );

        assert!(h.executor.calls.lock().unwrap().is_empty());
        assert_eq!(
            h.orc.history(),
            vec![
                ChatMessage::user("abre o chrome"),
                ChatMessage::assistant("[AÇÃO: NENHUMA] Pois não, senhor?"),
            ]
        );
        assert_eq!(h.speech.stops.load(Ordering::SeqCst), 2);
        assert_eq!(h.orc.last_run().unwrap().generation, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preemption_wait_is_bounded_by_slow_action() {
        let mut settings = Setup::default().settings;
        settings.preempt_wait = Duration::from_millis(50);
        let mut h = harness(Setup {
            script: vec![
                (0, "[AÇÃO: ABRIR_PROGRAMA][PARAM: chrome] Abrindo."),
                (0, "Olá, senhor."),
            ],
            action_delay: Duration::from_millis(400),
            settings,
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        let executing = {
            let orc = h.orc.clone();
            eventually(move || orc.state() == Executing).await
        };
        assert!(executing);

        let started = Instant::now();
        let second = h.orc.trigger().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        h.orc.wait_idle().await;

        // Let the detached run return from the executor and notice it is stale.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut h.events);
        let pivot = events
            .iter()
            .position(|e| e.state == Listening && e.generation == second)
            .unwrap();
        assert!(events[pivot..].iter().all(|e| e.generation == second));
        assert_eq!(events.last().unwrap().state, Idle);
        assert_eq!(events.last().unwrap().text, "Olá, senhor.");

        assert_eq!(h.executor.calls.lock().unwrap().len(), 1);
        assert_eq!(h.orc.history().len(), 4);
        assert_eq!(h.orc.state(), Idle);
    }

    /// Events from the new generation's `Listening` on, which must all belong
    /// to that generation.
    fn after_handover(events: &[StateEvent], generation: u64) -> &[StateEvent] {
        let pivot = events
            .iter()
            .position(|e| e.state == Listening && e.generation == generation)
            .expect("new generation never reached Listening");
        let tail = &events[pivot..];
        assert!(
            tail.iter().all(|e| e.generation == generation),
            "stale event after handover: {tail:?}"
        );
        tail
    }

    fn chatty() -> Setup {
        Setup {
            script: vec![(0, "Pois não, senhor?")],
            ..Setup::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_while_listening_abandons_recording() {
        let mut h = harness(Setup {
            capture_delay: Duration::from_millis(400),
            ..chatty()
        });

        h.orc.trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.orc.state(), Listening);

        let started = Instant::now();
        let second = h.orc.trigger().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        h.orc.wait_idle().await;
        // Let the abandoned recording return.
        tokio::time::sleep(Duration::from_millis(450)).await;

        let events = drain(&mut h.events);
        assert_eq!(
            states(after_handover(&events, second)),
            [Listening, Processing, Idle]
        );
        assert_eq!(h.capture.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orc.history().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_during_verification_skips_transcription() {
        let mut h = harness(Setup {
            verifier: ScriptedVerifier {
                enrolled: true,
                score: 0.95,
                first_delay: Duration::from_millis(400),
                ..Default::default()
            },
            ..chatty()
        });

        h.orc.trigger().await.unwrap();
        let processing = {
            let orc = h.orc.clone();
            eventually(move || orc.state() == Processing).await
        };
        assert!(processing);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let second = h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(450)).await;

        let events = drain(&mut h.events);
        assert_eq!(
            states(after_handover(&events, second)),
            [Listening, Processing, Idle]
        );
        assert_eq!(h.verifier.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.orc.history().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_during_transcription_skips_inference() {
        let mut h = harness(Setup {
            transcribe_delay: Duration::from_millis(400),
            ..chatty()
        });

        h.orc.trigger().await.unwrap();
        let processing = {
            let orc = h.orc.clone();
            eventually(move || orc.state() == Processing).await
        };
        assert!(processing);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let second = h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(450)).await;

        let events = drain(&mut h.events);
        assert_eq!(
            states(after_handover(&events, second)),
            [Listening, Processing, Idle]
        );
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.inference.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.orc.history(),
            vec![
                ChatMessage::user("abre o chrome"),
                ChatMessage::assistant("Pois não, senhor?"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_during_error_cuts_dwell_short() {
        let mut settings = Setup::default().settings;
        settings.inference_timeout = Duration::from_millis(50);
        settings.error_dwell = Duration::from_secs(2);
        let mut h = harness(Setup {
            script: vec![(500, "tarde demais"), (0, "Pois não, senhor?")],
            settings,
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        let errored = {
            let orc = h.orc.clone();
            eventually(move || orc.state() == Error).await
        };
        assert!(errored);

        let started = Instant::now();
        let second = h.orc.trigger().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        h.orc.wait_idle().await;

        let events = drain(&mut h.events);
        let tail = after_handover(&events, second);
        assert_eq!(states(tail), [Listening, Processing, Idle]);
        // The failed run never reached its own Idle.
        let pivot = events.len() - tail.len();
        assert_eq!(events[pivot - 1].state, Error);

        assert_eq!(
            h.orc.history(),
            vec![
                ChatMessage::user("abre o chrome"),
                ChatMessage::user("abre o chrome"),
                ChatMessage::assistant("Pois não, senhor?"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_right_after_idle_silences_previous_reply() {
        let mut h = harness(Setup {
            script: vec![(0, "Primeira resposta."), (0, "Segunda resposta.")],
            speech_delay: Duration::from_millis(200),
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;
        assert_eq!(
            drain(&mut h.events).last().map(|e| e.text.as_str()),
            Some("Primeira resposta.")
        );

        // The first reply is still starting up when the next trigger lands.
        h.orc.trigger().await.unwrap();
        h.orc.wait_idle().await;

        let speech = h.speech.clone();
        assert!(
            eventually(|| !speech.spoken.lock().unwrap().is_empty()).await
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(*h.speech.spoken.lock().unwrap(), ["Segunda resposta."]);
        assert_eq!(h.speech.stops.load(Ordering::SeqCst), 2);
    }

    // -----------------------------------------------------------------------
    // Trigger channel
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_processes_triggers_until_channel_closes() {
        let h = harness(Setup::default());
        let (tx, rx) = mpsc::channel(4);

        tx.send(TriggerSource::Interface).await.unwrap();
        drop(tx);
        h.orc.clone().run(rx).await.unwrap();

        assert_eq!(h.orc.state(), Idle);
        assert_eq!(h.orc.history().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_cancels_run_in_flight() {
        let mut h = harness(Setup {
            script: vec![(2_000, "tarde demais")],
            ..Setup::default()
        });

        h.orc.trigger().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.orc.shutdown().await;

        assert_eq!(h.orc.state(), Idle);
        assert!(h.orc.history().is_empty());
        assert_eq!(
            states(&drain(&mut h.events)),
            [Idle, Listening, Processing, Idle]
        );
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.voice_auth.enabled = false;
        config.pipeline.preempt_wait_ms = 250;

        let settings = PipelineSettings::from_config(&config);
        assert!(!settings.verify_speaker);
        assert_eq!(settings.preempt_wait, Duration::from_millis(250));
        assert_eq!(settings.inference_timeout, Duration::from_secs(10));
        assert_eq!(settings.min_capture, Duration::from_millis(500));
    }
}
