//! Dedicated OS-thread key listener using `rdev::listen`.
//!
//! `rdev::listen` has no shutdown API.  Dropping [`HotkeyListener`] sets a
//! stop flag so the callback discards further events; the thread itself stays
//! blocked in rdev until the process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{KeyBindings, KeyMapper};
use crate::session::SessionCommand;

/// Handle to a running listener thread.  Drop it to stop forwarding.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    /// Never joined: `rdev::listen` does not return.
    _thread: Option<std::thread::JoinHandle<()>>,
}

impl HotkeyListener {
    /// Spawn the listener thread.  Mapped commands are forwarded on `tx`
    /// with `blocking_send`.
    ///
    /// A failure to spawn the thread is logged and yields a listener that
    /// forwards nothing.
    pub fn start(bindings: KeyBindings, tx: mpsc::Sender<SessionCommand>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let spawned = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut mapper = KeyMapper::new(bindings);
                let result = rdev::listen(move |event| {
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(command) = mapper.map(&event.event_type) {
                        log::debug!("hotkey: {command:?}");
                        let _ = tx.blocking_send(command);
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey: rdev::listen exited with error: {e:?}");
                }
            });

        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(e) => {
                log::error!("hotkey: failed to spawn listener thread: {e}");
                None
            }
        };

        Self {
            stop,
            _thread: thread,
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
