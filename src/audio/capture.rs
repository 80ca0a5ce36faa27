//! Microphone capture via `cpal`.
//!
//! [`Microphone::open`] acquires the input device and starts buffering
//! [`AudioChunk`]s; [`MicrophoneStream::finish`] stops every track and hands
//! back what was captured.  Dropping a stream without finishing it discards
//! the audio and still releases the device.
//!
//! [`CpalMicrophone`] keeps the cpal stream on a dedicated `audio-input`
//! thread because `cpal::Stream` is not `Send` on every platform.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// MicrophoneError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring the microphone.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MicrophoneError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("microphone access refused: {0}")]
    Denied(String),

    #[error("failed to start audio input: {0}")]
    Stream(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of microphone streams.
pub trait Microphone: Send + Sync {
    fn open(&self) -> Result<Box<dyn MicrophoneStream>, MicrophoneError>;
}

/// An acquired, running microphone.
pub trait MicrophoneStream: Send {
    /// Stop all tracks and return every chunk captured since `open`, in
    /// arrival order.
    fn finish(self: Box<Self>) -> Vec<AudioChunk>;
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Default input device of the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl Microphone for CpalMicrophone {
    fn open(&self) -> Result<Box<dyn MicrophoneStream>, MicrophoneError> {
        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), MicrophoneError>>();

        let thread = std::thread::Builder::new()
            .name("audio-input".into())
            .spawn(move || run_input_thread(chunk_tx, stop_rx, ready_tx))
            .map_err(|e| MicrophoneError::Stream(format!("failed to spawn audio-input thread: {e}")))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| MicrophoneError::Stream("audio-input thread exited during setup".into()))??;

        log::info!("recorder: microphone open ({sample_rate} Hz, {channels} ch)");

        Ok(Box::new(CpalMicrophoneStream {
            chunks: chunk_rx,
            stop: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

fn run_input_thread(
    tx: mpsc::Sender<AudioChunk>,
    stop: mpsc::Receiver<()>,
    ready: mpsc::Sender<Result<(u32, u16), MicrophoneError>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready.send(Err(MicrophoneError::NoDevice));
        return;
    };

    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(MicrophoneError::Denied(e.to_string())));
            return;
        }
    };

    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let chunk = AudioChunk {
                samples: data.to_vec(),
                sample_rate,
                channels,
            };
            // Ignore send errors; the receiver may have been dropped.
            let _ = tx.send(chunk);
        },
        |err: cpal::StreamError| {
            log::error!("cpal input stream error: {err}");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(MicrophoneError::Denied(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(MicrophoneError::Stream(e.to_string())));
        return;
    }

    let _ = ready.send(Ok((sample_rate, channels)));

    // Either an explicit stop or the stream handle being dropped.
    let _ = stop.recv();
    drop(stream);
    log::debug!("recorder: audio-input thread finished");
}

struct CpalMicrophoneStream {
    chunks: mpsc::Receiver<AudioChunk>,
    stop: Option<mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalMicrophoneStream {
    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl MicrophoneStream for CpalMicrophoneStream {
    fn finish(mut self: Box<Self>) -> Vec<AudioChunk> {
        self.shutdown();
        self.chunks.try_iter().collect()
    }
}

impl Drop for CpalMicrophoneStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `AudioChunk` must be `Send` so it can cross thread boundaries.
    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn cpal_microphone_is_shareable() {
        fn assert_microphone<T: Microphone + 'static>() {}
        assert_microphone::<CpalMicrophone>();
    }

    #[test]
    fn error_messages_name_the_cause() {
        assert!(MicrophoneError::NoDevice.to_string().contains("no input device"));
        assert!(MicrophoneError::Denied("permission".into())
            .to_string()
            .contains("permission"));
    }
}
