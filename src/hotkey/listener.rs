//! `rdev::listen` on a dedicated OS thread.
//!
//! `rdev::listen` blocks forever and has no shutdown API, so the thread lives
//! until the process exits.  Dropping [`HotkeyListener`] sets a stop flag and
//! the callback discards every later event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pipeline::TriggerSource;

/// Running listener.  Drop it to stop forwarding triggers.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Forward one [`TriggerSource::Hotkey`] per press of `key`.
    ///
    /// Auto-repeat while the key is held does not re-trigger.
    pub fn start(key: rdev::Key, tx: mpsc::Sender<TriggerSource>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut held = false;
                let result = rdev::listen(move |event| {
                    if stopped.load(Ordering::Relaxed) {
                        return;
                    }
                    match event.event_type {
                        rdev::EventType::KeyPress(k) if k == key && !held => {
                            held = true;
                            if tx.blocking_send(TriggerSource::Hotkey).is_err() {
                                log::debug!("hotkey: pipeline gone, dropping trigger");
                            }
                        }
                        rdev::EventType::KeyRelease(k) if k == key => held = false,
                        _ => {}
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey: rdev::listen exited: {e:?}");
                }
            })?;

        log::info!("hotkey: listening for {key:?}");
        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
