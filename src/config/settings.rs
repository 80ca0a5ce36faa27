//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::language::{default_languages, LanguageDescriptor};

/// Environment variable consulted when `service.api_key` is unset.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Settings for the remote recognition / speech / evaluation services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the generative-language endpoint.
    pub base_url: String,
    /// API key; `None` means "read [`API_KEY_ENV`] at startup".
    pub api_key: Option<String>,
    /// Model used to identify and translate the captured object.
    pub recognition_model: String,
    /// Model used to synthesise the spoken word.
    pub speech_model: String,
    /// Model used to score the learner's pronunciation.
    pub evaluation_model: String,
    /// Maximum seconds to wait for any single service response.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            recognition_model: "gemini-2.5-flash".into(),
            speech_model: "gemini-2.5-flash-preview-tts".into(),
            evaluation_model: "gemini-2.5-flash".into(),
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// The configured key, or the value of [`API_KEY_ENV`] when the config
    /// leaves it empty.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for speech playback and utterance recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate of the PCM returned by the speech service (Hz).
    pub speech_sample_rate: u32,
    /// Channel count of the PCM returned by the speech service.
    pub speech_channels: u16,
    /// Sample rate the recorded utterance is resampled to before upload.
    pub recording_sample_rate: u32,
    /// Utterances shorter than this are rejected as "hold longer".
    pub min_recording_secs: f32,
    /// Utterances are truncated to this length.
    pub max_recording_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            speech_sample_rate: 24_000,
            speech_channels: 1,
            recording_sample_rate: 16_000,
            min_recording_secs: 0.3,
            max_recording_secs: 15.0,
        }
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

/// Settings for the capture controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Directory scanned by the file-backed camera.  `None` uses
    /// [`AppPaths::camera_dir`].
    pub source_dir: Option<PathBuf>,
    /// Try rear-facing inputs before any other.
    pub prefer_rear: bool,
    /// How long `Capture` waits for the first decodable frame.
    pub ready_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            prefer_rear: true,
            ready_timeout_ms: 3_000,
        }
    }
}

impl CameraConfig {
    /// Directory the camera backend should read from.
    pub fn resolved_source_dir(&self) -> PathBuf {
        self.source_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().camera_dir)
    }
}

// ---------------------------------------------------------------------------
// RewardConfig
// ---------------------------------------------------------------------------

/// Reward ledger parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Coins earned per pronunciation point (score 1–3).
    pub coins_per_point: u64,
    /// Daily goal given to a freshly created profile.
    pub default_daily_goal: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            coins_per_point: 5,
            default_daily_goal: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// KeyConfig
// ---------------------------------------------------------------------------

/// Keyboard bindings used by the desktop binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Hold to record, release to submit.
    pub hold: String,
    pub start: String,
    pub capture: String,
    pub replay: String,
    pub next_language: String,
    pub next_word: String,
    pub retry: String,
    pub go_home: String,
    pub quit: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            hold: "Space".into(),
            start: "S".into(),
            capture: "C".into(),
            replay: "P".into(),
            next_language: "L".into(),
            next_word: "N".into(),
            retry: "R".into(),
            go_home: "H".into(),
            quit: "Q".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use pov_kids::config::AppConfig;
///
/// let config = AppConfig::load().unwrap();
/// println!("{}", config.initial_language().display_name);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Code of the language selected at startup.
    pub default_language: String,
    /// Remote service settings.
    pub service: ServiceConfig,
    /// Playback / recording settings.
    pub audio: AudioConfig,
    /// Camera settings.
    pub camera: CameraConfig,
    /// Reward ledger settings.
    pub reward: RewardConfig,
    /// Keyboard bindings.
    pub keys: KeyConfig,
    /// Languages the learner can cycle through.
    pub languages: Vec<LanguageDescriptor>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_language: "en-US".into(),
            service: ServiceConfig::default(),
            audio: AudioConfig::default(),
            camera: CameraConfig::default(),
            reward: RewardConfig::default(),
            keys: KeyConfig::default(),
            languages: default_languages(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Look up a configured language by code (exact match).
    pub fn language(&self, code: &str) -> Option<&LanguageDescriptor> {
        self.languages.iter().find(|l| l.code == code)
    }

    /// The language the session starts with: `default_language` if it is
    /// configured, otherwise the first configured language, otherwise the
    /// built-in English descriptor.
    pub fn initial_language(&self) -> LanguageDescriptor {
        self.language(&self.default_language)
            .or_else(|| self.languages.first())
            .cloned()
            .unwrap_or_else(LanguageDescriptor::english)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
