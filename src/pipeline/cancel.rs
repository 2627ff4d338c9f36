//! Cooperative cancellation for pipeline runs.
//!
//! Every run holds a [`CancellationToken`] stamped with its generation.  A new
//! trigger calls [`TokenSource::reset`], which raises the previous token and
//! hands out a fresh one with the next generation number.  Stages poll the
//! token before and after each external call and give up as soon as it is
//! raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CancellationToken
// ---------------------------------------------------------------------------

/// A shared, clonable "stop" flag tied to one run generation.
///
/// Clones observe the same flag, so the orchestrator can raise a token that a
/// blocking thread is polling.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    generation: u64,
}

impl CancellationToken {
    fn new(generation: u64) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            generation,
        }
    }

    /// Raise the flag.  Raising twice is a no-op.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Non-blocking poll.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Generation of the run this token belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ---------------------------------------------------------------------------
// TokenSource
// ---------------------------------------------------------------------------

/// Issues tokens with strictly increasing generations.
///
/// At most one token from a source is live at a time: issuing a new one raises
/// the previous.
#[derive(Debug)]
pub struct TokenSource {
    current: CancellationToken,
}

impl TokenSource {
    /// Start at generation 0.  The initial token stands for "no run yet" and
    /// is issued already raised.
    pub fn new() -> Self {
        let current = CancellationToken::new(0);
        current.raise();
        Self { current }
    }

    /// Raise the current token and issue one with the next generation.
    pub fn reset(&mut self) -> CancellationToken {
        self.current.raise();
        self.current = CancellationToken::new(self.current.generation + 1);
        self.current.clone()
    }

    /// Raise the current token without issuing a new one.
    pub fn cancel(&self) {
        self.current.raise();
    }

    /// The most recently issued token.
    pub fn current(&self) -> &CancellationToken {
        &self.current
    }

    /// `true` when `token` is the most recent one and has not been raised.
    pub fn is_live(&self, token: &CancellationToken) -> bool {
        token.generation == self.current.generation && !token.is_cancelled()
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
