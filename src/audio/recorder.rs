//! Press-and-hold recording.
//!
//! [`RecordingController`] binds the microphone to an explicit
//! `begin()` / `end()` pair.  Whatever drives it (a held key, a button) only
//! has to call those two methods; repeated `begin()`s while recording and
//! `end()`s while idle are ignored.
//!
//! ```text
//! begin()  → stop playback → Microphone::open → chunks accumulate
//! end()    → MicrophoneStream::finish → mono → resample → Utterance
//! cancel() → MicrophoneStream dropped, audio discarded
//! ```

use std::sync::Arc;

use thiserror::Error;

use super::capture::{AudioChunk, Microphone, MicrophoneError, MicrophoneStream};
use super::playback::PlaybackEngine;
use super::resample::{resample, stereo_to_mono};
use super::wav::Utterance;

// ---------------------------------------------------------------------------
// RecordError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(#[from] MicrophoneError),

    #[error("recording too short ({secs:.2}s)")]
    TooShort { secs: f32 },
}

// ---------------------------------------------------------------------------
// RecordingController
// ---------------------------------------------------------------------------

/// Owns at most one live microphone stream.
pub struct RecordingController {
    microphone: Arc<dyn Microphone>,
    playback: Arc<PlaybackEngine>,
    active: Option<Box<dyn MicrophoneStream>>,
    /// Upload sample rate of the finished utterance.
    target_rate: u32,
    min_secs: f32,
    max_secs: f32,
}

impl RecordingController {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        playback: Arc<PlaybackEngine>,
        target_rate: u32,
        min_secs: f32,
        max_secs: f32,
    ) -> Self {
        Self {
            microphone,
            playback,
            active: None,
            target_rate,
            min_secs,
            max_secs,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Start recording.  Returns `Ok(false)` when a recording is already
    /// running.
    pub fn begin(&mut self) -> Result<bool, RecordError> {
        if self.active.is_some() {
            log::debug!("recorder: begin ignored, already recording");
            return Ok(false);
        }

        self.playback.stop();
        let stream = self.microphone.open()?;
        self.active = Some(stream);
        log::info!("recorder: recording started");
        Ok(true)
    }

    /// Stop recording and assemble the utterance.  `Ok(None)` when nothing
    /// was being recorded.
    pub fn end(&mut self) -> Result<Option<Utterance>, RecordError> {
        let Some(stream) = self.active.take() else {
            return Ok(None);
        };

        let chunks = stream.finish();
        let utterance = self.assemble(&chunks);
        let secs = utterance.duration_secs();
        log::info!(
            "recorder: recording stopped ({} chunks, {secs:.2}s)",
            chunks.len()
        );

        if utterance.samples.is_empty() || secs < self.min_secs {
            return Err(RecordError::TooShort { secs });
        }
        Ok(Some(utterance))
    }

    /// Drop an active recording without producing an utterance.
    pub fn cancel(&mut self) {
        if self.active.take().is_some() {
            log::info!("recorder: recording cancelled");
        }
    }

    fn assemble(&self, chunks: &[AudioChunk]) -> Utterance {
        let Some(first) = chunks.first() else {
            return Utterance {
                sample_rate: self.target_rate,
                samples: Vec::new(),
            };
        };

        let mono: Vec<f32> = chunks
            .iter()
            .flat_map(|c| stereo_to_mono(&c.samples, c.channels))
            .collect();
        let mut samples = resample(&mono, first.sample_rate, self.target_rate);

        let max_samples = (self.max_secs * self.target_rate as f32) as usize;
        if samples.len() > max_samples {
            log::warn!("recorder: utterance truncated to {:.1}s", self.max_secs);
            samples.truncate(max_samples);
        }

        Utterance {
            sample_rate: self.target_rate,
            samples,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::codec::AudioBuffer;
    use crate::audio::playback::tests::FakeOutput;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Microphone double that yields `chunks` on every finish.
    #[derive(Default)]
    pub(crate) struct FakeMicrophone {
        pub opened: AtomicUsize,
        pub live: Arc<AtomicUsize>,
        pub deny: AtomicBool,
        pub chunks: Mutex<Vec<AudioChunk>>,
    }

    impl FakeMicrophone {
        /// A microphone that records `secs` of 48 kHz stereo.
        pub(crate) fn with_secs(secs: f32) -> Arc<Self> {
            let frames = (48_000.0 * secs) as usize;
            let mic = Self::default();
            *mic.chunks.lock().unwrap() = vec![AudioChunk {
                samples: vec![0.2; frames * 2],
                sample_rate: 48_000,
                channels: 2,
            }];
            Arc::new(mic)
        }
    }

    struct FakeStream {
        live: Arc<AtomicUsize>,
        chunks: Vec<AudioChunk>,
    }

    impl Microphone for FakeMicrophone {
        fn open(&self) -> Result<Box<dyn MicrophoneStream>, MicrophoneError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(MicrophoneError::Denied("permission denied".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                live: Arc::clone(&self.live),
                chunks: self.chunks.lock().unwrap().clone(),
            }))
        }
    }

    impl MicrophoneStream for FakeStream {
        fn finish(mut self: Box<Self>) -> Vec<AudioChunk> {
            std::mem::take(&mut self.chunks)
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn controller(mic: Arc<FakeMicrophone>) -> (RecordingController, Arc<PlaybackEngine>) {
        let (device, _log) = FakeOutput::new();
        let playback = Arc::new(PlaybackEngine::new(device));
        let rec = RecordingController::new(mic, Arc::clone(&playback), 16_000, 0.3, 15.0);
        (rec, playback)
    }

    #[test]
    fn begin_twice_opens_one_stream() {
        let mic = FakeMicrophone::with_secs(1.0);
        let (mut rec, _) = controller(Arc::clone(&mic));

        assert!(rec.begin().unwrap());
        assert!(!rec.begin().unwrap());

        assert_eq!(mic.opened.load(Ordering::SeqCst), 1);
        assert_eq!(mic.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn end_produces_mono_utterance_at_target_rate() {
        let mic = FakeMicrophone::with_secs(1.0);
        let (mut rec, _) = controller(Arc::clone(&mic));

        rec.begin().unwrap();
        let utterance = rec.end().unwrap().unwrap();

        assert_eq!(utterance.sample_rate, 16_000);
        assert_eq!(utterance.samples.len(), 16_000);
        assert!((utterance.samples[100] - 0.2).abs() < 1e-5);
        assert_eq!(mic.live.load(Ordering::SeqCst), 0);
        assert!(!rec.is_recording());
    }

    #[test]
    fn end_while_idle_is_a_noop() {
        let mic = FakeMicrophone::with_secs(1.0);
        let (mut rec, _) = controller(mic);
        assert_eq!(rec.end().unwrap(), None);
    }

    #[test]
    fn short_recording_is_rejected() {
        let mic = FakeMicrophone::with_secs(0.1);
        let (mut rec, _) = controller(Arc::clone(&mic));

        rec.begin().unwrap();
        assert!(matches!(rec.end(), Err(RecordError::TooShort { .. })));
        assert_eq!(mic.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_recording_is_rejected() {
        let mic = Arc::new(FakeMicrophone::default());
        let (mut rec, _) = controller(mic);

        rec.begin().unwrap();
        assert!(matches!(rec.end(), Err(RecordError::TooShort { .. })));
    }

    #[test]
    fn long_recording_is_truncated() {
        let mic = FakeMicrophone::with_secs(20.0);
        let (mut rec, _) = controller(mic);

        rec.begin().unwrap();
        let utterance = rec.end().unwrap().unwrap();
        assert_eq!(utterance.samples.len(), 15 * 16_000);
    }

    #[test]
    fn denied_microphone_reports_unavailable() {
        let mic = FakeMicrophone::with_secs(1.0);
        mic.deny.store(true, Ordering::SeqCst);
        let (mut rec, _) = controller(Arc::clone(&mic));

        assert!(matches!(
            rec.begin(),
            Err(RecordError::MicrophoneUnavailable(MicrophoneError::Denied(_)))
        ));
        assert!(!rec.is_recording());
    }

    #[test]
    fn cancel_releases_microphone() {
        let mic = FakeMicrophone::with_secs(1.0);
        let (mut rec, _) = controller(Arc::clone(&mic));

        rec.begin().unwrap();
        rec.cancel();
        assert_eq!(mic.live.load(Ordering::SeqCst), 0);
        assert_eq!(rec.end().unwrap(), None);
    }

    #[test]
    fn begin_stops_playback() {
        let mic = FakeMicrophone::with_secs(1.0);
        let (mut rec, playback) = controller(mic);

        playback
            .play(Arc::new(AudioBuffer {
                sample_rate: 24_000,
                channels: 1,
                samples: vec![0.0; 2_400],
            }))
            .unwrap();
        assert!(playback.is_playing());

        rec.begin().unwrap();
        assert!(!playback.is_playing());
    }
}
