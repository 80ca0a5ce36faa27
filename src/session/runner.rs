//! Session orchestrator: drives capture → recognition → speech → recording
//! → evaluation → reward.
//!
//! [`SessionOrchestrator`] owns the [`SharedState`], every device controller
//! and the reward ledger.  It reacts to [`SessionCommand`]s received over a
//! `tokio::sync::mpsc` channel and to completions of the remote calls it
//! spawned.
//!
//! # Flow
//!
//! ```text
//! Start        └─▶ camera.open()                          [Capturing]
//! Capture      └─▶ snapshot once ready (polled on the camera tick)
//!                    └─▶ camera.close() → spawn(recognize) [Recognizing]
//! recognized   └─▶ resolve display word
//!                    └─▶ spawn(synthesize + decode)       [Speaking]
//! synthesized  └─▶ playback.play()                        [AwaitingPronunciation]
//! HoldPressed  └─▶ recorder.begin()                       [Recording]
//! HoldReleased └─▶ recorder.end() → spawn(evaluate)       [Evaluating]
//! evaluated    └─▶ ledger.award() → profile sink          [Scored]
//! ```
//!
//! Every spawned request carries a generation number.  A completion is
//! applied only when its generation is the outstanding one and the stage
//! still expects it; anything else is stale and dropped.  Resetting, going
//! home, moving to the next word or changing language bumps the generation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::audio::{
    decode_speech, AudioBuffer, Microphone, OutputDevice, PlaybackEngine, PlaybackError, RecordError,
    RecordingController, Utterance, WAV_MIME,
};
use crate::camera::{CaptureController, CaptureError, VideoBackend};
use crate::config::AppConfig;
use crate::language::LanguageDescriptor;
use crate::reward::{Profile, RewardLedger};
use crate::services::{
    PronunciationEvaluator, PronunciationResult, RecognitionResult, Recognizer, ServiceError,
    SpeechSynthesizer,
};

use super::state::{ErrorKind, SessionError, SharedState, Stage};

/// How often an open camera is polled for readiness.
const CAMERA_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// SessionCommand
// ---------------------------------------------------------------------------

/// Everything a front end can ask of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Open the camera for a new session.
    Start,
    /// Take the picture.
    Capture,
    SelectLanguage(LanguageDescriptor),
    /// Cycle to the next configured language.
    NextLanguage,
    /// Play the spoken word again.
    Replay,
    /// Press-and-hold started.
    HoldPressed,
    /// Press-and-hold ended.
    HoldReleased,
    /// Skip or finish this word; back to `Idle`.
    NextWord,
    /// Leave `Error` for a fresh capture.
    Retry,
    /// Abort everything and release all devices.
    GoHome,
    /// Release all devices and stop the run loop.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Remote collaborators.  Wrap the evaluator in a
/// [`FallbackEvaluator`](crate::services::FallbackEvaluator) so malformed
/// replies score neutrally instead of failing the stage.
pub struct Services {
    pub recognizer: Arc<dyn Recognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub evaluator: Arc<dyn PronunciationEvaluator>,
}

/// Local hardware.
pub struct Devices {
    pub camera: Arc<dyn VideoBackend>,
    pub microphone: Arc<dyn Microphone>,
    pub output: Arc<dyn OutputDevice>,
}

// ---------------------------------------------------------------------------
// Completions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Recognition,
    Speech,
    Evaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    generation: u64,
    kind: RequestKind,
}

enum Outcome {
    Recognized(Result<RecognitionResult, ServiceError>),
    Synthesized(Result<AudioBuffer, SessionError>),
    Evaluated(Result<PronunciationResult, ServiceError>),
}

impl Outcome {
    fn kind(&self) -> RequestKind {
        match self {
            Outcome::Recognized(_) => RequestKind::Recognition,
            Outcome::Synthesized(_) => RequestKind::Speech,
            Outcome::Evaluated(_) => RequestKind::Evaluation,
        }
    }
}

struct Completion {
    generation: u64,
    outcome: Outcome,
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

/// Drives one learning session at a time.
///
/// Create with [`SessionOrchestrator::new`], then call [`run`](Self::run)
/// inside a tokio task.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pov_kids::audio::{CpalMicrophone, CpalOutput};
/// use pov_kids::camera::FileCamera;
/// use pov_kids::config::AppConfig;
/// use pov_kids::reward::Profile;
/// use pov_kids::services::{FallbackEvaluator, GeminiClient};
/// use pov_kids::session::{new_shared_state, Devices, Services, SessionCommand, SessionOrchestrator};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let client = Arc::new(GeminiClient::from_config(&config.service));
/// let services = Services {
///     recognizer: client.clone(),
///     synthesizer: client,
///     evaluator: Arc::new(FallbackEvaluator::new(GeminiClient::from_config(&config.service))),
/// };
/// let devices = Devices {
///     camera: Arc::new(FileCamera::new(config.camera.resolved_source_dir())),
///     microphone: Arc::new(CpalMicrophone),
///     output: Arc::new(CpalOutput),
/// };
/// let state = new_shared_state(Profile::new("Mia", "🦊", 5), config.initial_language());
///
/// let (command_tx, command_rx) = tokio::sync::mpsc::channel(16);
/// let orchestrator = SessionOrchestrator::new(&config, state, services, devices);
/// tokio::spawn(orchestrator.run(command_rx));
/// command_tx.send(SessionCommand::Start).await.unwrap();
/// # }
/// ```
pub struct SessionOrchestrator {
    state: SharedState,
    config: AppConfig,
    services: Services,
    camera: CaptureController,
    recorder: RecordingController,
    playback: Arc<PlaybackEngine>,
    ledger: RewardLedger,
    profile_sink: Option<mpsc::UnboundedSender<Profile>>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    generation: u64,
    pending: Option<Pending>,
    /// Decoded speech for the current display word.
    speech: Option<Arc<AudioBuffer>>,
    /// Set while a capture waits for the camera's first frame.
    capture_deadline: Option<Instant>,
}

impl SessionOrchestrator {
    pub fn new(config: &AppConfig, state: SharedState, services: Services, devices: Devices) -> Self {
        let playback = Arc::new(PlaybackEngine::new(devices.output));
        let recorder = RecordingController::new(
            devices.microphone,
            Arc::clone(&playback),
            config.audio.recording_sample_rate,
            config.audio.min_recording_secs,
            config.audio.max_recording_secs,
        );
        let camera = CaptureController::new(devices.camera, config.camera.prefer_rear);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        Self {
            state,
            config: config.clone(),
            services,
            camera,
            recorder,
            playback,
            ledger: RewardLedger::new(config.reward.coins_per_point),
            profile_sink: None,
            completion_tx,
            completion_rx,
            generation: 0,
            pending: None,
            speech: None,
            capture_deadline: None,
        }
    }

    /// Receive every profile the ledger proposes.  Persisting them is the
    /// receiver's job.
    pub fn with_profile_sink(mut self, sink: mpsc::UnboundedSender<Profile>) -> Self {
        self.profile_sink = Some(sink);
        self
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until [`SessionCommand::Shutdown`] or until `commands` closes.
    /// Every device is released on the way out.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut camera_tick = tokio::time::interval(CAMERA_POLL_INTERVAL);
        camera_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                Some(completion) = self.completion_rx.recv() => self.apply(completion).await,
                _ = camera_tick.tick() => self.poll_camera(),
            }
        }

        self.release_devices();
        log::info!("session: command channel closed, orchestrator shutting down");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Apply one command.
    pub async fn handle(&mut self, command: SessionCommand) {
        let stage = self.stage();
        log::debug!("session: {command:?} in {stage:?}");

        match command {
            SessionCommand::Start if stage == Stage::Idle => self.start_session(),
            SessionCommand::Capture if stage == Stage::Capturing => self.capture(),
            SessionCommand::SelectLanguage(language) => self.change_language(language),
            SessionCommand::NextLanguage => {
                let language = self.next_language();
                self.change_language(language);
            }
            SessionCommand::Replay => self.replay().await,
            SessionCommand::HoldPressed => self.begin_recording(),
            SessionCommand::HoldReleased => self.end_recording(),
            SessionCommand::NextWord
                if matches!(
                    stage,
                    Stage::Speaking | Stage::AwaitingPronunciation | Stage::Scored
                ) =>
            {
                self.end_session()
            }
            SessionCommand::Retry if stage == Stage::Error => {
                self.release_devices();
                self.start_session();
            }
            SessionCommand::GoHome => self.go_home(),
            SessionCommand::Shutdown => self.release_devices(),
            other => log::debug!("session: {other:?} ignored in {stage:?}"),
        }
    }

    fn start_session(&mut self) {
        self.invalidate();
        self.capture_deadline = None;
        self.recorder.cancel();
        self.stop_playback();
        self.speech = None;

        let opened = self.camera.open();
        let session_id = {
            let mut st = self.state.lock().unwrap();
            st.clear_session();
            st.session_id += 1;
            st.session_id
        };

        match opened {
            Ok(()) => {
                log::info!("session: session {session_id} started");
                self.set_stage(Stage::Capturing);
                self.poll_camera();
            }
            Err(e) => self.fail(SessionError::CameraUnavailable(e.to_string())),
        }
    }

    /// Take the picture now, or once the camera delivers its first frame.
    /// The wait runs on the camera tick so commands keep flowing meanwhile.
    fn capture(&mut self) {
        if self.camera.poll() {
            self.take_snapshot();
            return;
        }
        if self.capture_deadline.is_none() {
            let timeout = Duration::from_millis(self.config.camera.ready_timeout_ms);
            log::debug!("session: capture waits up to {timeout:?} for the camera");
            self.capture_deadline = Some(Instant::now() + timeout);
        }
    }

    fn take_snapshot(&mut self) {
        self.capture_deadline = None;
        let image = match self.camera.snapshot() {
            Ok(image) => image,
            Err(CaptureError::NotReady) => {
                self.notice(SessionError::CameraNotReady);
                return;
            }
            Err(e) => {
                self.fail(SessionError::CameraUnavailable(e.to_string()));
                return;
            }
        };
        self.camera.close();

        {
            let mut st = self.state.lock().unwrap();
            st.captured_image = Some(image.clone());
            st.camera_ready = false;
            st.last_error = None;
            st.stage = Stage::Recognizing;
        }

        let generation = self.issue(RequestKind::Recognition);
        let recognizer = Arc::clone(&self.services.recognizer);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = recognizer.recognize(&image).await;
            let _ = tx.send(Completion {
                generation,
                outcome: Outcome::Recognized(result),
            });
        });
    }

    fn change_language(&mut self, language: LanguageDescriptor) {
        let stage = {
            let mut st = self.state.lock().unwrap();
            if st.target_language == language {
                return;
            }
            st.target_language = language;
            st.stage
        };
        log::info!("session: target language changed in {stage:?}");

        match stage {
            Stage::Speaking | Stage::AwaitingPronunciation | Stage::Recording | Stage::Evaluating => {
                self.recorder.cancel();
                self.invalidate();
                self.enter_speaking();
            }
            Stage::Scored => self.retarget_word(),
            // A failed evaluation can be retried by recording again, which
            // must score the word in the new language.
            Stage::Error if self.evaluation_retry_allowed() => self.retarget_word(),
            _ => {}
        }
    }

    /// Show the current object in the target language.  Speech for the old
    /// word is dropped; a replay fetches the new one.
    fn retarget_word(&mut self) {
        self.stop_playback();
        self.speech = None;
        let mut st = self.state.lock().unwrap();
        st.display_word = st.resolve_display_word();
    }

    fn evaluation_retry_allowed(&self) -> bool {
        let st = self.state.lock().unwrap();
        st.recognition.is_some() && matches!(st.last_error, Some(SessionError::EvaluationFailed(_)))
    }

    fn next_language(&self) -> LanguageDescriptor {
        let current = self.state.lock().unwrap().target_language.clone();
        let languages = &self.config.languages;
        match languages.iter().position(|l| l.code == current.code) {
            Some(i) => languages[(i + 1) % languages.len()].clone(),
            None => languages.first().cloned().unwrap_or(current),
        }
    }

    async fn replay(&mut self) {
        let stage = self.stage();
        if !matches!(stage, Stage::AwaitingPronunciation | Stage::Scored) {
            log::debug!("session: replay ignored in {stage:?}");
            return;
        }

        if self.speech.is_some() {
            self.play_speech().await;
            return;
        }

        if self.pending.map(|p| p.kind) == Some(RequestKind::Speech) {
            log::debug!("session: replay ignored, speech already requested");
            return;
        }

        let (word, voice) = {
            let st = self.state.lock().unwrap();
            (st.display_word.clone(), st.target_language.voice.clone())
        };
        if let Some(word) = word {
            log::info!("session: re-fetching speech for replay");
            self.request_speech(word, voice);
        }
    }

    fn begin_recording(&mut self) {
        let stage = self.stage();

        // Recording and Evaluating fall through here: begin() is a no-op
        // while either is in flight.
        let allowed = stage == Stage::AwaitingPronunciation
            || (stage == Stage::Error && self.evaluation_retry_allowed());
        if !allowed {
            log::debug!("session: hold ignored in {stage:?}");
            return;
        }

        // A replay fetch must not start playing over the microphone.
        if self.pending.map(|p| p.kind) == Some(RequestKind::Speech) {
            self.invalidate();
        }

        match self.recorder.begin() {
            Ok(true) => {
                let mut st = self.state.lock().unwrap();
                st.is_speaking = false;
                st.last_error = None;
                st.stage = Stage::Recording;
            }
            Ok(false) => {}
            Err(RecordError::MicrophoneUnavailable(e)) => {
                self.notice(SessionError::MicrophoneUnavailable(e.to_string()))
            }
            Err(e) => self.notice(SessionError::MicrophoneUnavailable(e.to_string())),
        }
    }

    fn end_recording(&mut self) {
        if self.stage() != Stage::Recording {
            return;
        }

        match self.recorder.end() {
            Ok(Some(utterance)) => self.submit_utterance(utterance),
            Ok(None) => self.set_stage(Stage::AwaitingPronunciation),
            Err(RecordError::TooShort { .. }) => {
                self.set_stage(Stage::AwaitingPronunciation);
                self.notice(SessionError::RecordingTooShort);
            }
            Err(RecordError::MicrophoneUnavailable(e)) => {
                self.set_stage(Stage::AwaitingPronunciation);
                self.notice(SessionError::MicrophoneUnavailable(e.to_string()));
            }
        }
    }

    fn end_session(&mut self) {
        self.invalidate();
        self.capture_deadline = None;
        self.recorder.cancel();
        self.stop_playback();
        self.camera.close();
        self.speech = None;

        let mut st = self.state.lock().unwrap();
        log::info!("session: session {} finished", st.session_id);
        st.clear_session();
        st.stage = Stage::Idle;
    }

    fn go_home(&mut self) {
        self.release_devices();
        self.speech = None;

        let mut st = self.state.lock().unwrap();
        st.clear_session();
        st.stage = Stage::Idle;
    }

    // -----------------------------------------------------------------------
    // Speech
    // -----------------------------------------------------------------------

    fn enter_speaking(&mut self) {
        self.stop_playback();
        self.speech = None;

        let (word, voice) = {
            let mut st = self.state.lock().unwrap();
            let word = st.resolve_display_word().unwrap_or_default();
            st.display_word = Some(word.clone());
            st.pronunciation = None;
            st.stage = Stage::Speaking;
            (word, st.target_language.voice.clone())
        };

        log::info!("session: speaking '{word}' with voice {voice}");
        self.request_speech(word, voice);
    }

    fn request_speech(&mut self, word: String, voice: String) {
        let generation = self.issue(RequestKind::Speech);
        let synthesizer = Arc::clone(&self.services.synthesizer);
        let tx = self.completion_tx.clone();
        let sample_rate = self.config.audio.speech_sample_rate;
        let channels = self.config.audio.speech_channels;

        tokio::spawn(async move {
            let result = synthesize_and_decode(synthesizer, word, voice, sample_rate, channels).await;
            let _ = tx.send(Completion {
                generation,
                outcome: Outcome::Synthesized(result),
            });
        });
    }

    async fn play_speech(&mut self) {
        let Some(buffer) = self.speech.clone() else {
            return;
        };

        let playback = Arc::clone(&self.playback);
        let played = tokio::task::spawn_blocking(move || playback.play(buffer))
            .await
            .unwrap_or_else(|e| Err(PlaybackError::Device(format!("playback task failed: {e}"))));

        match played {
            Ok(ticket) => {
                {
                    let mut st = self.state.lock().unwrap();
                    st.is_speaking = true;
                    if matches!(
                        st.last_error,
                        Some(SessionError::SpeechUnavailable(_) | SessionError::PlaybackBlocked(_))
                    ) {
                        st.last_error = None;
                    }
                }

                let id = ticket.id;
                let playback = Arc::clone(&self.playback);
                let state = Arc::clone(&self.state);
                tokio::spawn(async move {
                    if ticket.finished().await && playback.is_current(id) {
                        playback.mark_finished(id);
                        state.lock().unwrap().is_speaking = false;
                    }
                });
            }
            Err(PlaybackError::Blocked(reason)) => {
                self.state.lock().unwrap().is_speaking = false;
                self.notice(SessionError::PlaybackBlocked(reason));
            }
            Err(PlaybackError::Device(reason)) => {
                self.state.lock().unwrap().is_speaking = false;
                self.notice(SessionError::SpeechUnavailable(reason));
            }
        }
    }

    fn stop_playback(&mut self) {
        self.playback.stop();
        self.state.lock().unwrap().is_speaking = false;
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    fn submit_utterance(&mut self, utterance: Utterance) {
        let audio = match utterance.to_base64() {
            Ok(audio) => audio,
            Err(e) => {
                self.fail(SessionError::EvaluationFailed(e.to_string()));
                return;
            }
        };

        let (word, language_name) = {
            let mut st = self.state.lock().unwrap();
            st.stage = Stage::Evaluating;
            st.last_error = None;
            (
                st.display_word.clone().unwrap_or_default(),
                st.target_language.display_name.clone(),
            )
        };

        let generation = self.issue(RequestKind::Evaluation);
        let evaluator = Arc::clone(&self.services.evaluator);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = evaluator
                .evaluate(&audio, WAV_MIME, &word, &language_name)
                .await;
            let _ = tx.send(Completion {
                generation,
                outcome: Outcome::Evaluated(result),
            });
        });
    }

    // -----------------------------------------------------------------------
    // Completions
    // -----------------------------------------------------------------------

    async fn apply(&mut self, completion: Completion) {
        let kind = completion.outcome.kind();
        let stage = self.stage();
        let current = Pending {
            generation: completion.generation,
            kind,
        };

        if self.pending != Some(current) || !stage_expects(stage, kind) {
            log::debug!(
                "session: dropping stale {kind:?} completion (generation {}, stage {stage:?})",
                completion.generation
            );
            return;
        }
        self.pending = None;

        match completion.outcome {
            Outcome::Recognized(result) => self.on_recognized(result),
            Outcome::Synthesized(result) => self.on_synthesized(result).await,
            Outcome::Evaluated(result) => self.on_evaluated(result),
        }
    }

    fn on_recognized(&mut self, result: Result<RecognitionResult, ServiceError>) {
        match result {
            Ok(recognition) => {
                let identified = recognition.is_identified();
                self.state.lock().unwrap().recognition = Some(recognition);
                if identified {
                    self.enter_speaking();
                } else {
                    self.fail(SessionError::NoObjectIdentified);
                }
            }
            Err(e) => {
                log::warn!("session: recognition failed ({:?})", ErrorKind::from(&e));
                self.fail(SessionError::RecognitionFailed(e.to_string()));
            }
        }
    }

    async fn on_synthesized(&mut self, result: Result<AudioBuffer, SessionError>) {
        {
            let mut st = self.state.lock().unwrap();
            if st.stage == Stage::Speaking {
                st.stage = Stage::AwaitingPronunciation;
            }
        }

        match result {
            Ok(buffer) => {
                log::debug!("session: speech ready ({:.2}s)", buffer.duration_secs());
                self.speech = Some(Arc::new(buffer));
                self.play_speech().await;
            }
            Err(e) => self.notice(e),
        }
    }

    fn on_evaluated(&mut self, result: Result<PronunciationResult, ServiceError>) {
        let pronunciation = match result {
            Ok(pronunciation) => pronunciation,
            Err(e) => {
                log::warn!("session: evaluation failed ({:?})", ErrorKind::from(&e));
                self.fail(SessionError::EvaluationFailed(e.to_string()));
                return;
            }
        };

        let (session_id, profile) = {
            let mut st = self.state.lock().unwrap();
            st.pronunciation = Some(pronunciation.clone());
            st.stage = Stage::Scored;
            (st.session_id, st.profile.clone())
        };
        log::info!(
            "session: scored {} ({})",
            pronunciation.score,
            pronunciation.feedback
        );

        if let Some(next) = self.ledger.award(session_id, &profile, pronunciation.score) {
            self.state.lock().unwrap().profile = next.clone();
            if let Some(sink) = &self.profile_sink {
                if sink.send(next).is_err() {
                    log::warn!("session: profile sink closed, reward not persisted");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn stage(&self) -> Stage {
        self.state.lock().unwrap().stage
    }

    fn set_stage(&self, stage: Stage) {
        self.state.lock().unwrap().stage = stage;
    }

    fn poll_camera(&mut self) {
        if self.stage() != Stage::Capturing {
            self.capture_deadline = None;
            return;
        }
        let ready = self.camera.poll();
        {
            let mut st = self.state.lock().unwrap();
            st.camera_ready = ready;
            if ready && st.last_error == Some(SessionError::CameraNotReady) {
                st.last_error = None;
            }
        }

        let Some(deadline) = self.capture_deadline else {
            return;
        };
        if ready {
            self.take_snapshot();
        } else if Instant::now() >= deadline {
            self.capture_deadline = None;
            self.notice(SessionError::CameraNotReady);
        }
    }

    /// Take a fresh generation for a request of `kind`.
    fn issue(&mut self, kind: RequestKind) -> u64 {
        self.generation += 1;
        self.pending = Some(Pending {
            generation: self.generation,
            kind,
        });
        self.generation
    }

    /// Make any outstanding request stale.
    fn invalidate(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            log::debug!(
                "session: cancelled {:?} request (generation {})",
                pending.kind,
                pending.generation
            );
        }
    }

    /// Camera, microphone and output context, all released now.
    fn release_devices(&mut self) {
        self.invalidate();
        self.capture_deadline = None;
        self.camera.close();
        self.recorder.cancel();
        self.playback.teardown();

        let mut st = self.state.lock().unwrap();
        st.is_speaking = false;
        st.camera_ready = false;
    }

    /// A stage-fatal error: release devices and enter `Error`.
    fn fail(&mut self, err: SessionError) {
        log::warn!("session: {err}");
        self.release_devices();

        let mut st = self.state.lock().unwrap();
        st.stage = Stage::Error;
        st.last_error = Some(err);
    }

    /// A non-fatal error: recorded, stage unchanged.
    fn notice(&self, err: SessionError) {
        log::info!("session: {err}");
        self.state.lock().unwrap().last_error = Some(err);
    }
}

fn stage_expects(stage: Stage, kind: RequestKind) -> bool {
    match kind {
        RequestKind::Recognition => stage == Stage::Recognizing,
        RequestKind::Speech => matches!(
            stage,
            Stage::Speaking | Stage::AwaitingPronunciation | Stage::Scored
        ),
        RequestKind::Evaluation => stage == Stage::Evaluating,
    }
}

async fn synthesize_and_decode(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    word: String,
    voice: String,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioBuffer, SessionError> {
    let encoded = synthesizer
        .synthesize(&word, &voice)
        .await
        .map_err(|e| SessionError::SpeechUnavailable(e.to_string()))?;

    tokio::task::spawn_blocking(move || decode_speech(&encoded, sample_rate, channels))
        .await
        .map_err(|e| SessionError::SpeechUnavailable(format!("decode task failed: {e}")))?
        .map_err(|e| SessionError::SpeechUnavailable(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
