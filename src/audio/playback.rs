//! The playback engine: sole owner of the process-wide output context.
//!
//! The context is created on the first [`PlaybackEngine::play`] and lives
//! until [`PlaybackEngine::teardown`]; the next `play` after a teardown
//! creates a new one.  Nothing else in the crate touches an
//! [`OutputContext`].
//!
//! At most one buffer is audible: `play` stops the current buffer before
//! starting the next.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;

use super::codec::AudioBuffer;
use super::output::{OutputContext, OutputDevice};

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Playback failures.  Both are distinct from decode failures
/// ([`CodecError`](crate::audio::CodecError)): the audio is fine, the
/// speaker is not.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    /// No usable output device.
    #[error("audio output unavailable: {0}")]
    Device(String),

    /// The device exists but refused to start; a user-initiated replay may
    /// succeed.
    #[error("playback blocked: {0}")]
    Blocked(String),
}

// ---------------------------------------------------------------------------
// PlaybackTicket
// ---------------------------------------------------------------------------

/// Handle to one `play` call.
#[derive(Debug)]
pub struct PlaybackTicket {
    pub id: u64,
    done: oneshot::Receiver<()>,
}

impl PlaybackTicket {
    /// Resolves when playback ends.  `true` if the buffer played to the end,
    /// `false` if it was stopped, replaced or the context was torn down.
    pub async fn finished(self) -> bool {
        self.done.await.is_ok()
    }
}

// ---------------------------------------------------------------------------
// PlaybackEngine
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EngineInner {
    context: Option<Box<dyn OutputContext>>,
    next_ticket: u64,
    current: Option<u64>,
    /// Bumped by every teardown.
    epoch: u64,
}

/// Plays decoded speech through a single shared output context.
///
/// Creating and resuming a context can block for a while, so `play` checks
/// the context out of the lock for those calls.  A teardown that lands
/// meanwhile wins: the checked-out context is closed instead of returned.
pub struct PlaybackEngine {
    device: Arc<dyn OutputDevice>,
    inner: Mutex<EngineInner>,
}

impl PlaybackEngine {
    pub fn new(device: Arc<dyn OutputDevice>) -> Self {
        Self {
            device,
            inner: Mutex::new(EngineInner::default()),
        }
    }

    /// Stop whatever is playing, make sure the context exists and is
    /// running, then start `buffer`.  Blocks on the device; call it from
    /// `spawn_blocking` inside async code.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Device`] when the context cannot be created or was
    /// torn down during the call, [`PlaybackError::Blocked`] when it exists
    /// but will not start.
    pub fn play(&self, buffer: Arc<AudioBuffer>) -> Result<PlaybackTicket, PlaybackError> {
        let (checked_out, epoch) = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(ctx) = inner.context.as_mut() {
                ctx.stop();
            }
            inner.current = None;
            (inner.context.take(), inner.epoch)
        };

        let mut ctx = match checked_out {
            Some(ctx) => ctx,
            None => self.device.create()?,
        };

        let (done_tx, done_rx) = oneshot::channel();
        let started = if ctx.is_suspended() {
            ctx.resume().and_then(|()| ctx.start(buffer, done_tx))
        } else {
            ctx.start(buffer, done_tx)
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.epoch != epoch || inner.context.is_some() {
            drop(inner);
            ctx.stop();
            ctx.close();
            return Err(PlaybackError::Device("output context was torn down".into()));
        }
        inner.context = Some(ctx);
        started?;

        inner.next_ticket += 1;
        let id = inner.next_ticket;
        inner.current = Some(id);
        log::debug!("playback: started ticket {id}");
        Ok(PlaybackTicket { id, done: done_rx })
    }

    /// Silence the current buffer.  Safe when nothing is playing or no
    /// context exists.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ctx) = inner.context.as_mut() {
            ctx.stop();
        }
        if let Some(id) = inner.current.take() {
            log::debug!("playback: stopped ticket {id}");
        }
    }

    /// Stop and release the output context.
    pub fn teardown(&self) {
        let released = {
            let mut inner = self.inner.lock().unwrap();
            inner.current = None;
            inner.epoch += 1;
            inner.context.take()
        };
        if let Some(mut ctx) = released {
            ctx.stop();
            ctx.close();
        }
    }

    /// Record that `id` reached its end.  Ignored if a newer ticket has
    /// started since.
    pub fn mark_finished(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.current == Some(id) {
            inner.current = None;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().current.is_some()
    }

    /// `true` while `id` is the audible buffer.
    pub fn is_current(&self, id: u64) -> bool {
        self.inner.lock().unwrap().current == Some(id)
    }

    /// `true` while an output context is held.
    pub fn has_context(&self) -> bool {
        self.inner.lock().unwrap().context.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Counters shared between a [`FakeOutput`] and its contexts.
    #[derive(Default)]
    pub(crate) struct OutputLog {
        pub created: AtomicUsize,
        pub closed: AtomicUsize,
        pub resumed: AtomicUsize,
        pub started: Mutex<Vec<Arc<AudioBuffer>>>,
        pub stops: AtomicUsize,
        pub block_resume: AtomicBool,
        /// When set, `start` fires `done` immediately.
        pub finish_instantly: AtomicBool,
        /// How long `resume` takes to come back.
        pub resume_delay_ms: AtomicU64,
    }

    pub(crate) struct FakeOutput {
        pub log: Arc<OutputLog>,
    }

    impl FakeOutput {
        pub(crate) fn new() -> (Arc<Self>, Arc<OutputLog>) {
            let log = Arc::new(OutputLog::default());
            (Arc::new(Self { log: Arc::clone(&log) }), log)
        }
    }

    struct FakeContext {
        log: Arc<OutputLog>,
        suspended: bool,
        pending: Option<oneshot::Sender<()>>,
    }

    impl OutputDevice for FakeOutput {
        fn create(&self) -> Result<Box<dyn OutputContext>, PlaybackError> {
            self.log.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext {
                log: Arc::clone(&self.log),
                suspended: true,
                pending: None,
            }))
        }
    }

    impl OutputContext for FakeContext {
        fn is_suspended(&self) -> bool {
            self.suspended
        }

        fn resume(&mut self) -> Result<(), PlaybackError> {
            let delay = self.log.resume_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                std::thread::sleep(Duration::from_millis(delay));
            }
            if self.log.block_resume.load(Ordering::SeqCst) {
                return Err(PlaybackError::Blocked("autoplay refused".into()));
            }
            self.log.resumed.fetch_add(1, Ordering::SeqCst);
            self.suspended = false;
            Ok(())
        }

        fn start(&mut self, buffer: Arc<AudioBuffer>, done: oneshot::Sender<()>) -> Result<(), PlaybackError> {
            self.log.started.lock().unwrap().push(buffer);
            if self.log.finish_instantly.load(Ordering::SeqCst) {
                let _ = done.send(());
            } else {
                self.pending = Some(done);
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.log.stops.fetch_add(1, Ordering::SeqCst);
            self.pending = None;
        }

        fn close(&mut self) {
            self.log.closed.fetch_add(1, Ordering::SeqCst);
            self.pending = None;
        }
    }

    fn tone() -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer {
            sample_rate: 24_000,
            channels: 1,
            samples: vec![0.25; 240],
        })
    }

    #[test]
    fn context_is_created_lazily_once() {
        let (device, log) = FakeOutput::new();
        let engine = PlaybackEngine::new(device);
        assert!(!engine.has_context());
        assert_eq!(log.created.load(Ordering::SeqCst), 0);

        engine.play(tone()).unwrap();
        engine.play(tone()).unwrap();

        assert!(engine.has_context());
        assert_eq!(log.created.load(Ordering::SeqCst), 1);
        assert_eq!(log.resumed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn teardown_then_play_recreates_context() {
        let (device, log) = FakeOutput::new();
        let engine = PlaybackEngine::new(device);

        engine.play(tone()).unwrap();
        engine.teardown();
        assert!(!engine.has_context());
        assert_eq!(log.closed.load(Ordering::SeqCst), 1);

        engine.play(tone()).unwrap();
        assert_eq!(log.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn new_play_cancels_previous_ticket() {
        let (device, _log) = FakeOutput::new();
        let engine = PlaybackEngine::new(device);

        let first = engine.play(tone()).unwrap();
        let second = engine.play(tone()).unwrap();

        assert!(!first.finished().await, "replaced ticket must report cancelled");
        assert!(engine.is_current(second.id));
        assert!(engine.is_playing());
    }

    #[tokio::test]
    async fn finished_ticket_reports_completion() {
        let (device, log) = FakeOutput::new();
        log.finish_instantly.store(true, Ordering::SeqCst);
        let engine = PlaybackEngine::new(device);

        let ticket = engine.play(tone()).unwrap();
        let id = ticket.id;
        assert!(ticket.finished().await);

        engine.mark_finished(id);
        assert!(!engine.is_playing());
    }

    #[test]
    fn mark_finished_ignores_stale_ticket() {
        let (device, _log) = FakeOutput::new();
        let engine = PlaybackEngine::new(device);

        let first = engine.play(tone()).unwrap();
        let _second = engine.play(tone()).unwrap();
        engine.mark_finished(first.id);
        assert!(engine.is_playing());
    }

    #[test]
    fn stop_is_idempotent_without_context() {
        let (device, log) = FakeOutput::new();
        let engine = PlaybackEngine::new(device);
        engine.stop();
        engine.stop();
        engine.teardown();
        assert_eq!(log.created.load(Ordering::SeqCst), 0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn blocked_resume_is_reported_as_blocked() {
        let (device, log) = FakeOutput::new();
        log.block_resume.store(true, Ordering::SeqCst);
        let engine = PlaybackEngine::new(device);

        let err = engine.play(tone()).unwrap_err();
        assert!(matches!(err, PlaybackError::Blocked(_)));
        assert!(!engine.is_playing());

        // The user gesture path: the platform now allows audio.
        log.block_resume.store(false, Ordering::SeqCst);
        engine.play(tone()).unwrap();
        assert_eq!(log.created.load(Ordering::SeqCst), 1);
    }

    fn wait_for_create(log: &OutputLog) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while log.created.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "play never reached the device");
            std::thread::yield_now();
        }
    }

    #[test]
    fn slow_resume_does_not_hold_the_engine_lock() {
        let (device, log) = FakeOutput::new();
        log.resume_delay_ms.store(300, Ordering::SeqCst);
        let engine = Arc::new(PlaybackEngine::new(device));

        let player = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.play(tone()).map(|ticket| ticket.id))
        };
        wait_for_create(&log);

        let asked = Instant::now();
        assert!(!engine.is_playing());
        assert!(!engine.is_current(1));
        assert!(asked.elapsed() < Duration::from_millis(200));

        let id = player.join().unwrap().unwrap();
        assert!(engine.is_current(id));
    }

    #[test]
    fn teardown_during_resume_closes_the_new_context() {
        let (device, log) = FakeOutput::new();
        log.resume_delay_ms.store(200, Ordering::SeqCst);
        let engine = Arc::new(PlaybackEngine::new(device));

        let player = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.play(tone()).map(|ticket| ticket.id))
        };
        wait_for_create(&log);
        engine.teardown();

        let err = player.join().unwrap().unwrap_err();
        assert!(matches!(err, PlaybackError::Device(_)));
        assert!(!engine.has_context());
        assert!(!engine.is_playing());
        assert_eq!(log.closed.load(Ordering::SeqCst), 1);
    }
}
