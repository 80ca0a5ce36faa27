//! `GeminiClient`: the HTTPS implementation of every collaborator trait.
//!
//! Each call is one `POST {base_url}/v1beta/models/{model}:generateContent`
//! with the key in the `x-goog-api-key` header.  All connection details come
//! from [`ServiceConfig`].

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::camera::CapturedImage;
use crate::config::ServiceConfig;
use crate::language::{default_languages, LanguageDescriptor};
use crate::services::prompt::{evaluation_prompt, recognition_prompt, speech_prompt, strip_code_fences};
use crate::services::{
    PronunciationEvaluator, PronunciationResult, RecognitionResult, Recognizer, ServiceError,
    SpeechSynthesizer,
};

/// Longest error body echoed into a [`ServiceError::Request`].
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: reqwest::Client,
    config: ServiceConfig,
    api_key: Option<String>,
    languages: Vec<LanguageDescriptor>,
}

impl GeminiClient {
    /// Build a client from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let api_key = config.resolved_api_key();
        if api_key.is_none() {
            log::warn!("service: no API key configured, remote calls will fail");
        }

        Self {
            client,
            config: config.clone(),
            api_key,
            languages: default_languages(),
        }
    }

    /// Languages the recognizer is asked to translate into.
    pub fn with_languages(mut self, languages: Vec<LanguageDescriptor>) -> Self {
        if !languages.is_empty() {
            self.languages = languages;
        }
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn generate(&self, model: &str, body: &Value) -> Result<Value, ServiceError> {
        let mut req = self.client.post(self.endpoint(model)).json(body);

        let key = self.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.header("x-goog-api-key", key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(ServiceError::Request(format!("HTTP {status}: {snippet}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

fn recognition_body(image: &CapturedImage, prompt: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": image.mime_type, "data": image.base64_data() } },
                { "text": prompt }
            ]
        }]
    })
}

fn speech_body(text: &str, voice: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": speech_prompt(text) }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }
        }
    })
}

fn evaluation_body(audio_base64: &str, mime_type: &str, prompt: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": mime_type, "data": audio_base64 } },
                { "text": prompt }
            ]
        }],
        "generationConfig": { "responseMimeType": "application/json" }
    })
}

// ---------------------------------------------------------------------------
// Response extraction
// ---------------------------------------------------------------------------

fn parts(response: &Value) -> &[Value] {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Concatenated text parts of the first candidate.
pub fn response_text(response: &Value) -> Result<String, ServiceError> {
    let text: String = parts(response)
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect();
    if text.trim().is_empty() {
        return Err(ServiceError::MissingData("text".into()));
    }
    Ok(text)
}

/// Base64 audio of the first inline-data part.
pub fn response_audio(response: &Value) -> Result<String, ServiceError> {
    parts(response)
        .iter()
        .filter_map(|p| p["inlineData"]["data"].as_str())
        .find(|d| !d.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::MissingData("audio".into()))
}

pub fn parse_recognition(text: &str) -> Result<RecognitionResult, ServiceError> {
    serde_json::from_str(strip_code_fences(text)).map_err(|e| {
        log::error!("service: invalid recognition reply: {text}");
        ServiceError::Parse(e.to_string())
    })
}

/// Parse `{"score": …, "feedback": …}`.  Scores given as strings or floats
/// are accepted; anything outside 1..=3 is an error.
pub fn parse_pronunciation(text: &str) -> Result<PronunciationResult, ServiceError> {
    let value: Value =
        serde_json::from_str(strip_code_fences(text)).map_err(|e| ServiceError::Parse(e.to_string()))?;

    let score = match &value["score"] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ServiceError::MissingData("score".into()))?
    .round();

    if !(PronunciationResult::MIN_SCORE as f64..=PronunciationResult::MAX_SCORE as f64).contains(&score) {
        return Err(ServiceError::Parse(format!("score {score} out of range")));
    }

    let feedback = value["feedback"]
        .as_str()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| PronunciationResult::neutral().feedback);

    Ok(PronunciationResult {
        score: score as u8,
        feedback,
    })
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl Recognizer for GeminiClient {
    async fn recognize(&self, image: &CapturedImage) -> Result<RecognitionResult, ServiceError> {
        let body = recognition_body(image, &recognition_prompt(&self.languages));
        let response = self.generate(&self.config.recognition_model, &body).await?;
        let result = parse_recognition(&response_text(&response)?)?;
        log::info!(
            "service: recognized '{}' ({} translations)",
            result.source_word(),
            result.translations.as_ref().map_or(0, |t| t.len())
        );
        Ok(result)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<String, ServiceError> {
        let response = self
            .generate(&self.config.speech_model, &speech_body(text, voice))
            .await?;
        response_audio(&response)
    }
}

#[async_trait]
impl PronunciationEvaluator for GeminiClient {
    async fn evaluate(
        &self,
        audio_base64: &str,
        mime_type: &str,
        word: &str,
        language_name: &str,
    ) -> Result<PronunciationResult, ServiceError> {
        let body = evaluation_body(audio_base64, mime_type, &evaluation_prompt(word, language_name));
        let response = self.generate(&self.config.evaluation_model, &body).await?;
        parse_pronunciation(&response_text(&response)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
