//! Session stage machine and shared session state.
//!
//! [`Stage`] drives the orchestrator's state machine.  Front ends read it via
//! [`SharedState`] to decide what to show.
//!
//! [`SessionState`] is the single source of truth for everything a front end
//! needs: current stage, the captured still, the recognized word, the score
//! and the last error.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<SessionState>>`; cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::camera::CapturedImage;
use crate::language::{resolve_translation, LanguageDescriptor};
use crate::reward::Profile;
use crate::services::{PronunciationResult, RecognitionResult, ServiceError};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Stages of one learning session.
///
/// ```text
/// Idle ──start──▶ Capturing ──capture──▶ Recognizing ──translations──▶ Speaking
/// Speaking ──playback requested──▶ AwaitingPronunciation ──hold──▶ Recording
/// Recording ──release──▶ Evaluating ──score──▶ Scored ──next word──▶ Idle
/// any non-terminal stage ──error──▶ Error ──retry──▶ Capturing
/// any stage ──go home──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// No session; every device is released.
    #[default]
    Idle,

    /// Camera is open; waiting for the learner to take the picture.
    Capturing,

    /// The still is with the recognition service.
    Recognizing,

    /// The display word is being synthesized.
    Speaking,

    /// Speech has been requested; the learner may hold to record.
    AwaitingPronunciation,

    /// Microphone is open.
    Recording,

    /// The utterance is with the evaluation service.
    Evaluating,

    /// Score and feedback are available.
    Scored,

    /// A stage-fatal error; see [`SessionState::last_error`].
    Error,
}

impl Stage {
    /// Returns `true` while waiting on a device or a remote service.
    ///
    /// ```
    /// use pov_kids::session::Stage;
    ///
    /// assert!(Stage::Recognizing.is_busy());
    /// assert!(Stage::Evaluating.is_busy());
    /// assert!(!Stage::AwaitingPronunciation.is_busy());
    /// assert!(!Stage::Scored.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Stage::Recognizing | Stage::Speaking | Stage::Recording | Stage::Evaluating
        )
    }

    /// A short human-readable label for status output.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Idle => "Home",
            Stage::Capturing => "Camera",
            Stage::Recognizing => "Looking…",
            Stage::Speaking => "Speaking",
            Stage::AwaitingPronunciation => "Your turn",
            Stage::Recording => "Listening",
            Stage::Evaluating => "Checking",
            Stage::Scored => "Done",
            Stage::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Coarse classification used to pick a recovery affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Camera or microphone could not be acquired or gave nothing usable.
    DeviceUnavailable,
    /// A remote call failed (including unusable replies outside evaluation).
    TransportFailure,
    /// A remote reply could not be used.
    MalformedResponse,
    /// Recognition worked but found nothing.
    NoObjectIdentified,
    /// The platform refused to start audio output.
    PlaybackBlocked,
}

impl From<&ServiceError> for ErrorKind {
    fn from(err: &ServiceError) -> Self {
        if err.is_malformed() {
            ErrorKind::MalformedResponse
        } else {
            ErrorKind::TransportFailure
        }
    }
}

/// Reasons surfaced to the learner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("the camera is not ready yet")]
    CameraNotReady,

    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    #[error("could not recognize the picture: {0}")]
    RecognitionFailed(String),

    #[error("no object identified, try another picture")]
    NoObjectIdentified,

    #[error("speech unavailable: {0}")]
    SpeechUnavailable(String),

    #[error("audio playback was blocked, press replay: {0}")]
    PlaybackBlocked(String),

    #[error("recording too short, hold while you speak")]
    RecordingTooShort,

    #[error("could not check pronunciation: {0}")]
    EvaluationFailed(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::CameraUnavailable(_)
            | SessionError::CameraNotReady
            | SessionError::MicrophoneUnavailable(_)
            | SessionError::RecordingTooShort => ErrorKind::DeviceUnavailable,
            SessionError::RecognitionFailed(_)
            | SessionError::SpeechUnavailable(_)
            | SessionError::EvaluationFailed(_) => ErrorKind::TransportFailure,
            SessionError::NoObjectIdentified => ErrorKind::NoObjectIdentified,
            SessionError::PlaybackBlocked(_) => ErrorKind::PlaybackBlocked,
        }
    }

    /// `true` when the error moves the session to [`Stage::Error`]; the
    /// others are notices on the current stage.
    pub fn is_fatal_to_stage(&self) -> bool {
        matches!(
            self,
            SessionError::CameraUnavailable(_)
                | SessionError::RecognitionFailed(_)
                | SessionError::NoObjectIdentified
                | SessionError::EvaluationFailed(_)
        )
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Shared session state, mutated only by the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub stage: Stage,

    /// Increments with every started session.  `0` before the first.
    pub session_id: u64,

    /// The still sent to recognition.  Owned by the session; cleared when it
    /// ends.
    pub captured_image: Option<CapturedImage>,

    /// `true` once the open camera has produced a decodable frame.
    pub camera_ready: bool,

    pub target_language: LanguageDescriptor,

    pub recognition: Option<RecognitionResult>,

    /// The word in `target_language`, resolved when speaking starts.
    pub display_word: Option<String>,

    pub pronunciation: Option<PronunciationResult>,

    pub last_error: Option<SessionError>,

    /// `true` while speech audio is audible.
    pub is_speaking: bool,

    /// The learner's profile as of the last award.
    pub profile: Profile,
}

impl SessionState {
    pub fn new(profile: Profile, target_language: LanguageDescriptor) -> Self {
        Self {
            stage: Stage::Idle,
            session_id: 0,
            captured_image: None,
            camera_ready: false,
            target_language,
            recognition: None,
            display_word: None,
            pronunciation: None,
            last_error: None,
            is_speaking: false,
            profile,
        }
    }

    /// Drop everything belonging to the current attempt.  Profile, language
    /// and session id survive.
    pub fn clear_session(&mut self) {
        self.captured_image = None;
        self.camera_ready = false;
        self.recognition = None;
        self.display_word = None;
        self.pronunciation = None;
        self.last_error = None;
        self.is_speaking = false;
    }

    /// The recognized word in the target language, or `None` before
    /// recognition.
    pub fn resolve_display_word(&self) -> Option<String> {
        let recognition = self.recognition.as_ref()?;
        let source = recognition.source_word();
        Some(match &recognition.translations {
            Some(translations) => resolve_translation(translations, &self.target_language, &source),
            None => source,
        })
    }

    /// One line describing what the learner should see right now.
    pub fn status_line(&self) -> String {
        let mut line = format!("[{}] {}", self.target_language.display_name, self.stage.label());
        if self.stage.is_busy() {
            line.push_str(" ⏳");
        }
        if self.stage == Stage::Capturing {
            line.push_str(if self.camera_ready { " (ready)" } else { " (waiting for camera)" });
        }
        if let Some(word) = &self.display_word {
            line.push_str(&format!(" | {word}"));
        }
        if self.is_speaking {
            line.push_str(" 🔊");
        }
        if let Some(result) = &self.pronunciation {
            line.push_str(&format!(" | {} | {}", "★".repeat(usize::from(result.score)), result.feedback));
        }
        if let Some(err) = &self.last_error {
            line.push_str(&format!(" | {err}"));
        }
        line.push_str(&format!(
            " | {} coins, {}/{} today",
            self.profile.coins, self.profile.daily_progress, self.profile.daily_goal
        ));
        line
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].
///
/// Lock with `.lock().unwrap()` for a short critical section; do **not**
/// hold the lock across `.await` points.
pub type SharedState = Arc<Mutex<SessionState>>;

pub fn new_shared_state(profile: Profile, target_language: LanguageDescriptor) -> SharedState {
    Arc::new(Mutex::new(SessionState::new(profile, target_language)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn state() -> SessionState {
        SessionState::new(
            Profile::new("Mia", "🦊", 5),
            LanguageDescriptor::new("Español", "es-ES", "Puck"),
        )
    }

    #[test]
    fn default_stage_is_idle() {
        assert_eq!(Stage::default(), Stage::Idle);
        assert_eq!(state().stage, Stage::Idle);
    }

    #[test]
    fn only_four_errors_are_fatal() {
        let fatal = [
            SessionError::CameraUnavailable("x".into()),
            SessionError::RecognitionFailed("x".into()),
            SessionError::NoObjectIdentified,
            SessionError::EvaluationFailed("x".into()),
        ];
        let notices = [
            SessionError::CameraNotReady,
            SessionError::MicrophoneUnavailable("x".into()),
            SessionError::SpeechUnavailable("x".into()),
            SessionError::PlaybackBlocked("x".into()),
            SessionError::RecordingTooShort,
        ];
        assert!(fatal.iter().all(SessionError::is_fatal_to_stage));
        assert!(!notices.iter().any(SessionError::is_fatal_to_stage));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            SessionError::MicrophoneUnavailable("denied".into()).kind(),
            ErrorKind::DeviceUnavailable
        );
        assert_eq!(
            SessionError::RecognitionFailed("bad json".into()).kind(),
            ErrorKind::TransportFailure
        );
        assert_eq!(SessionError::NoObjectIdentified.kind(), ErrorKind::NoObjectIdentified);
        assert_eq!(
            SessionError::PlaybackBlocked("autoplay".into()).kind(),
            ErrorKind::PlaybackBlocked
        );
        assert_eq!(
            ErrorKind::from(&ServiceError::Parse("x".into())),
            ErrorKind::MalformedResponse
        );
        assert_eq!(ErrorKind::from(&ServiceError::Timeout), ErrorKind::TransportFailure);
    }

    #[test]
    fn apple_resolves_to_manzana() {
        let mut st = state();
        assert_eq!(st.resolve_display_word(), None);

        let mut translations = BTreeMap::new();
        translations.insert("en-US".to_string(), "Apple".to_string());
        translations.insert("es-ES".to_string(), "Manzana".to_string());
        st.recognition = Some(RecognitionResult {
            identified_object: "Apple".into(),
            translations: Some(translations),
        });
        assert_eq!(st.resolve_display_word().as_deref(), Some("Manzana"));

        st.target_language = LanguageDescriptor::new("Nederlands", "nl-NL", "Charon");
        assert_eq!(st.resolve_display_word().as_deref(), Some("Apple"));
    }

    #[test]
    fn clear_session_keeps_profile_and_language() {
        let mut st = state();
        st.session_id = 4;
        st.display_word = Some("Manzana".into());
        st.last_error = Some(SessionError::RecordingTooShort);
        st.is_speaking = true;

        st.clear_session();
        assert_eq!(st.session_id, 4);
        assert_eq!(st.target_language.code, "es-ES");
        assert_eq!(st.profile.name, "Mia");
        assert!(st.display_word.is_none());
        assert!(st.last_error.is_none());
        assert!(!st.is_speaking);
    }

    #[test]
    fn status_line_marks_busy_stages() {
        let mut st = state();
        assert_eq!(st.status_line(), "[Español] Home | 0 coins, 0/5 today");

        st.stage = Stage::Recognizing;
        assert!(st.status_line().starts_with("[Español] Looking… ⏳"));

        st.stage = Stage::Scored;
        st.display_word = Some("Manzana".into());
        st.pronunciation = Some(PronunciationResult {
            score: 3,
            feedback: "Great!".into(),
        });
        st.profile.coins = 15;
        st.profile.daily_progress = 1;
        assert_eq!(
            st.status_line(),
            "[Español] Done | Manzana | ★★★ | Great! | 15 coins, 1/5 today"
        );
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }
}
