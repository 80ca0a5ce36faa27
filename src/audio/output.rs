//! Speaker output via `cpal`.
//!
//! [`OutputDevice`] / [`OutputContext`] are the seam the
//! [`PlaybackEngine`](crate::audio::PlaybackEngine) drives; [`CpalOutput`] is
//! the production implementation.
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream lives on a
//! dedicated `audio-output` thread for the whole lifetime of the context.  The
//! context talks to that thread over a command channel and shares a playback
//! cursor with the cpal callback.
//!
//! A freshly created context is *suspended*: the stream is built but not
//! started until the first [`OutputContext::resume`].

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot;

use super::codec::AudioBuffer;
use super::playback::PlaybackError;
use super::resample::{mono_to_interleaved, resample, stereo_to_mono};

/// How long `resume` waits for the audio thread to acknowledge.
const RESUME_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An opened output device.  Exactly one exists at a time, owned by the
/// playback engine.
pub trait OutputContext: Send {
    /// `true` until the platform has agreed to start producing sound.
    fn is_suspended(&self) -> bool;

    /// Start (or restart) the device.  A refusal is
    /// [`PlaybackError::Blocked`].
    fn resume(&mut self) -> Result<(), PlaybackError>;

    /// Replace whatever is playing with `buffer`.  `done` fires once the
    /// last sample has been handed to the device; it is dropped unfired if
    /// the buffer is stopped or replaced first.
    fn start(&mut self, buffer: Arc<AudioBuffer>, done: oneshot::Sender<()>) -> Result<(), PlaybackError>;

    /// Silence the current buffer.  Idempotent.
    fn stop(&mut self);

    /// Release the device.  The context is unusable afterwards.
    fn close(&mut self);
}

/// Factory for [`OutputContext`]s.
pub trait OutputDevice: Send + Sync {
    fn create(&self) -> Result<Box<dyn OutputContext>, PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// Default output device of the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl OutputDevice for CpalOutput {
    fn create(&self) -> Result<Box<dyn OutputContext>, PlaybackError> {
        Ok(Box::new(CpalOutputContext::open()?))
    }
}

enum OutputCommand {
    Play(mpsc::Sender<Result<(), String>>),
    Pause,
    Close,
}

/// Samples queued for the cpal callback, already at the device rate and
/// channel layout.
#[derive(Default)]
struct Cursor {
    samples: Vec<f32>,
    pos: usize,
    done: Option<oneshot::Sender<()>>,
}

struct CpalOutputContext {
    commands: mpsc::Sender<OutputCommand>,
    cursor: Arc<Mutex<Cursor>>,
    device_rate: u32,
    device_channels: u16,
    suspended: bool,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalOutputContext {
    fn open() -> Result<Self, PlaybackError> {
        let cursor = Arc::new(Mutex::new(Cursor::default()));
        let (command_tx, command_rx) = mpsc::channel::<OutputCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), String>>();

        let thread_cursor = Arc::clone(&cursor);
        let thread = std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || run_output_thread(thread_cursor, command_rx, ready_tx))
            .map_err(|e| PlaybackError::Device(format!("failed to spawn audio-output thread: {e}")))?;

        let (device_rate, device_channels) = ready_rx
            .recv()
            .map_err(|_| PlaybackError::Device("audio-output thread exited during setup".into()))?
            .map_err(PlaybackError::Device)?;

        log::info!("playback: output context created ({device_rate} Hz, {device_channels} ch)");

        Ok(Self {
            commands: command_tx,
            cursor,
            device_rate,
            device_channels,
            suspended: true,
            thread: Some(thread),
        })
    }
}

fn run_output_thread(
    cursor: Arc<Mutex<Cursor>>,
    commands: mpsc::Receiver<OutputCommand>,
    ready: mpsc::Sender<Result<(u32, u16), String>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err("no output device found on the default audio host".into()));
        return;
    };

    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to query default output config: {e}")));
            return;
        }
    };
    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();

    let callback_cursor = Arc::clone(&cursor);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut written = 0;
            if let Ok(mut c) = callback_cursor.lock() {
                let remaining = c.samples.len().saturating_sub(c.pos);
                written = remaining.min(data.len());
                let start = c.pos;
                data[..written].copy_from_slice(&c.samples[start..start + written]);
                c.pos += written;
                if c.pos >= c.samples.len() {
                    if let Some(done) = c.done.take() {
                        let _ = done.send(());
                    }
                }
            }
            data[written..].fill(0.0);
        },
        |err: cpal::StreamError| {
            log::error!("cpal output stream error: {err}");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to build output stream: {e}")));
            return;
        }
    };

    let _ = ready.send(Ok((device_rate, device_channels)));

    // Disconnection means the context was dropped without `close()`.
    while let Ok(cmd) = commands.recv() {
        match cmd {
            OutputCommand::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| e.to_string()));
            }
            OutputCommand::Pause => {
                if let Err(e) = stream.pause() {
                    log::warn!("playback: failed to pause output stream: {e}");
                }
            }
            OutputCommand::Close => break,
        }
    }

    drop(stream);
    log::debug!("playback: audio-output thread finished");
}

impl OutputContext for CpalOutputContext {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(OutputCommand::Play(reply_tx))
            .map_err(|_| PlaybackError::Device("audio-output thread is gone".into()))?;

        match reply_rx.recv_timeout(RESUME_TIMEOUT) {
            Ok(Ok(())) => {
                self.suspended = false;
                Ok(())
            }
            Ok(Err(e)) => Err(PlaybackError::Blocked(e)),
            Err(_) => Err(PlaybackError::Blocked("output device did not start in time".into())),
        }
    }

    fn start(&mut self, buffer: Arc<AudioBuffer>, done: oneshot::Sender<()>) -> Result<(), PlaybackError> {
        let mono = stereo_to_mono(&buffer.samples, buffer.channels);
        let at_device_rate = resample(&mono, buffer.sample_rate, self.device_rate);
        let samples = mono_to_interleaved(&at_device_rate, self.device_channels);

        let mut c = self
            .cursor
            .lock()
            .map_err(|_| PlaybackError::Device("playback cursor poisoned".into()))?;
        c.samples = samples;
        c.pos = 0;
        c.done = Some(done);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut c) = self.cursor.lock() {
            c.samples.clear();
            c.pos = 0;
            c.done = None;
        }
    }

    fn close(&mut self) {
        self.stop();
        if !self.suspended {
            let _ = self.commands.send(OutputCommand::Pause);
        }
        let _ = self.commands.send(OutputCommand::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.suspended = true;
        log::info!("playback: output context closed");
    }
}

impl Drop for CpalOutputContext {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.close();
        }
    }
}
