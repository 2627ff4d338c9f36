//! Fan-out of [`StateEvent`]s to any number of observers.
//!
//! Each observer owns a bounded `tokio::sync::mpsc` receiver.  Publishing
//! never waits: an observer whose queue is full or whose receiver was dropped
//! is removed on the spot.  New observers first receive the current state.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::state::StateEvent;

/// Queue depth per observer.
pub const OBSERVER_CAPACITY: usize = 32;

struct Observers {
    last: StateEvent,
    senders: Vec<mpsc::Sender<StateEvent>>,
}

/// Cheap-to-clone handle; all clones share the observer list.
#[derive(Clone)]
pub struct StateBroadcaster {
    inner: Arc<Mutex<Observers>>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Observers {
                last: StateEvent::initial(),
                senders: Vec::new(),
            })),
        }
    }

    /// Register an observer.  The returned receiver already holds the most
    /// recent event.
    pub fn subscribe(&self) -> mpsc::Receiver<StateEvent> {
        let (tx, rx) = mpsc::channel(OBSERVER_CAPACITY);
        let mut observers = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Fresh channel with spare capacity, cannot fail.
        let _ = tx.try_send(observers.last.clone());
        observers.senders.push(tx);
        rx
    }

    /// Deliver `event` to every observer without blocking.
    pub fn publish(&self, event: StateEvent) {
        let mut observers = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        observers.senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::debug!("broadcast: dropping slow observer");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("broadcast: dropping closed observer");
                false
            }
        });
        observers.last = event;
    }

    /// The most recently published event.
    pub fn current(&self) -> StateEvent {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
