//! Whisper-backed [`Transcriber`].
//!
//! A new `WhisperState` is created for every call so the engine can be shared
//! across threads without locking.

use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{SttError, Transcriber, Transcript};
use crate::audio::{AudioBuffer, TARGET_RATE};
use crate::config::SttConfig;

// ---------------------------------------------------------------------------
// TranscribeParams
// ---------------------------------------------------------------------------

/// Settings for a single Whisper run.
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 code, or `"auto"` for detection.
    pub language: String,
    /// Candidates per greedy step; 1 is fastest.
    pub best_of: i32,
    pub n_threads: i32,
    pub use_gpu: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "pt".into(),
            best_of: 1,
            n_threads: optimal_threads(),
            use_gpu: false,
        }
    }
}

impl TranscribeParams {
    pub fn from_config(config: &SttConfig) -> Self {
        Self {
            language: config.language.clone(),
            use_gpu: config.use_gpu,
            ..Self::default()
        }
    }
}

/// Available cores, capped at 8; Whisper stops scaling past that.
pub fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}

impl WhisperEngine {
    /// Load a GGML model.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`] — `model_path` does not exist.
    /// - [`SttError::ContextInit`]  — whisper-rs failed to load the file.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }
        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!("non-UTF-8 model path: {}", path.display()))
        })?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(params.use_gpu);
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("stt: loaded {}", path.display());
        Ok(Self { ctx, params })
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<Transcript, SttError> {
        if audio.sample_rate != TARGET_RATE {
            return Err(SttError::SampleRate(audio.sample_rate));
        }

        let mut fp = FullParams::new(SamplingStrategy::Greedy {
            best_of: self.params.best_of,
        });
        let lang = (self.params.language != "auto").then_some(self.params.language.as_str());
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);
        fp.set_single_segment(true);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let err = |e: whisper_rs::WhisperError| SttError::Transcription(e.to_string());

        state.full(fp, &audio.samples).map_err(err)?;

        let mut text = String::new();
        let mut prob_sum = 0.0_f32;
        let mut tokens = 0_u32;

        for seg in 0..state.full_n_segments().map_err(err)? {
            text.push_str(&state.full_get_segment_text(seg).map_err(err)?);
            for tok in 0..state.full_n_tokens(seg).map_err(err)? {
                prob_sum += state.full_get_token_prob(seg, tok).map_err(err)?;
                tokens += 1;
            }
        }

        let confidence = if tokens == 0 {
            0.0
        } else {
            prob_sum / tokens as f32
        };
        let text = text.trim().to_string();
        log::debug!("stt: {text:?} (confidence {confidence:.2})");

        Ok(Transcript { text, confidence })
    }
}
