//! Remote collaborators: object recognition, speech synthesis and
//! pronunciation evaluation.
//!
//! This module provides:
//! * [`Recognizer`], [`SpeechSynthesizer`], [`PronunciationEvaluator`]:
//!   async traits the session drives.
//! * [`GeminiClient`]: one HTTPS client implementing all three.
//! * [`FallbackEvaluator`]: wraps any evaluator; malformed replies become
//!   [`PronunciationResult::neutral`].
//! * [`ServiceError`]: error variants shared by every collaborator.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use pov_kids::config::AppConfig;
//! use pov_kids::services::{FallbackEvaluator, GeminiClient, PronunciationEvaluator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let evaluator = FallbackEvaluator::new(GeminiClient::from_config(&config.service));
//!
//!     let result = evaluator
//!         .evaluate("UklGRg==", "audio/wav", "Manzana", "Español")
//!         .await
//!         .unwrap();
//!     println!("{} stars: {}", result.score, result.feedback);
//! }
//! ```

pub mod client;
pub mod fallback;
pub mod prompt;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CapturedImage;
use crate::language::{lookup, LanguageDescriptor};

pub use client::GeminiClient;
pub use fallback::FallbackEvaluator;

/// Feedback used whenever the evaluator's reply cannot be trusted.
pub const NEUTRAL_FEEDBACK: &str = "Good try! Keep practising.";

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Errors returned by any remote collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// HTTP transport, connection or non-success status.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The reply was not the JSON we asked for.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The reply parsed but lacked the part we need (audio, text, score).
    #[error("response is missing {0}")]
    MissingData(String),
}

impl ServiceError {
    /// `true` when the collaborator answered but the answer was unusable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ServiceError::Parse(_) | ServiceError::MissingData(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else {
            ServiceError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What the recognizer saw.  See [`RecognitionResult::is_identified`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecognitionResult {
    #[serde(default, rename = "identifiedObject")]
    pub identified_object: String,
    #[serde(default)]
    pub translations: Option<BTreeMap<String, String>>,
}

impl RecognitionResult {
    /// `false` for `{"translations": null}`, and for a reply that names
    /// nothing at all (no object, no usable translation).
    pub fn is_identified(&self) -> bool {
        self.translations.is_some() && !self.source_word().is_empty()
    }

    /// Name of the object in the source language.
    ///
    /// Falls back to the English translation, then to any translation, when
    /// the service only returned a translation map.
    pub fn source_word(&self) -> String {
        let named = self.identified_object.trim();
        if !named.is_empty() {
            return named.to_string();
        }
        let Some(translations) = &self.translations else {
            return String::new();
        };
        lookup(translations, &LanguageDescriptor::english())
            .or_else(|| translations.values().map(String::as_str).find(|v| !v.trim().is_empty()))
            .unwrap_or_default()
            .to_string()
    }
}

/// A pronunciation score (1 to 3 stars) with encouragement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PronunciationResult {
    pub score: u8,
    pub feedback: String,
}

impl PronunciationResult {
    pub const MIN_SCORE: u8 = 1;
    pub const MAX_SCORE: u8 = 3;

    /// The soft default for an unusable evaluation.
    pub fn neutral() -> Self {
        Self {
            score: 2,
            feedback: NEUTRAL_FEEDBACK.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        (Self::MIN_SCORE..=Self::MAX_SCORE).contains(&self.score)
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Identifies the main object in a still and translates its name.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &CapturedImage) -> Result<RecognitionResult, ServiceError>;
}

/// Speaks `text` with a prebuilt `voice`.
///
/// Returns base64 of raw little-endian `i16` mono PCM.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<String, ServiceError>;
}

/// Scores a recorded attempt at `word`.
#[async_trait]
pub trait PronunciationEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        audio_base64: &str,
        mime_type: &str,
        word: &str,
        language_name: &str,
    ) -> Result<PronunciationResult, ServiceError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
