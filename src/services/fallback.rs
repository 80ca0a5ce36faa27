//! Fallback evaluator: wraps any [`PronunciationEvaluator`] and turns
//! unusable replies into the neutral score.
//!
//! Evaluation is encouragement, not a gate: a reply that fails to parse, has
//! no score, or scores outside 1..=3 becomes
//! [`PronunciationResult::neutral`].  Transport failures (`Request`,
//! `Timeout`) are still returned so the learner can retry.

use async_trait::async_trait;

use crate::services::{PronunciationEvaluator, PronunciationResult, ServiceError};

/// A wrapper around any [`PronunciationEvaluator`] that never reports a
/// malformed reply.
///
/// # Example
/// ```rust
/// use pov_kids::config::ServiceConfig;
/// use pov_kids::services::{FallbackEvaluator, GeminiClient};
///
/// let inner = GeminiClient::from_config(&ServiceConfig::default());
/// let evaluator = FallbackEvaluator::new(inner);
/// ```
pub struct FallbackEvaluator<E: PronunciationEvaluator> {
    inner: E,
}

impl<E: PronunciationEvaluator> FallbackEvaluator<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    /// Return a reference to the wrapped evaluator.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: PronunciationEvaluator + Send + Sync> PronunciationEvaluator for FallbackEvaluator<E> {
    async fn evaluate(
        &self,
        audio_base64: &str,
        mime_type: &str,
        word: &str,
        language_name: &str,
    ) -> Result<PronunciationResult, ServiceError> {
        match self
            .inner
            .evaluate(audio_base64, mime_type, word, language_name)
            .await
        {
            Ok(result) if result.is_valid() => Ok(result),
            Ok(result) => {
                log::warn!(
                    "evaluation: score {} out of range, using neutral result",
                    result.score
                );
                Ok(PronunciationResult::neutral())
            }
            Err(err) if err.is_malformed() => {
                log::warn!("evaluation: unusable reply ({err}), using neutral result");
                Ok(PronunciationResult::neutral())
            }
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    struct Fixed(Result<PronunciationResult, ServiceError>);

    #[async_trait]
    impl PronunciationEvaluator for Fixed {
        async fn evaluate(
            &self,
            _audio: &str,
            _mime: &str,
            _word: &str,
            _language: &str,
        ) -> Result<PronunciationResult, ServiceError> {
            self.0.clone()
        }
    }

    async fn run(reply: Result<PronunciationResult, ServiceError>) -> Result<PronunciationResult, ServiceError> {
        FallbackEvaluator::new(Fixed(reply))
            .evaluate("UklGRg==", "audio/wav", "Manzana", "Español")
            .await
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn passes_through_valid_score() {
        let good = PronunciationResult {
            score: 3,
            feedback: "Excellent!".into(),
        };
        assert_eq!(run(Ok(good.clone())).await.unwrap(), good);
    }

    #[tokio::test]
    async fn parse_error_becomes_neutral() {
        let result = run(Err(ServiceError::Parse("not json".into()))).await.unwrap();
        assert_eq!(result, PronunciationResult::neutral());
    }

    #[tokio::test]
    async fn missing_score_becomes_neutral() {
        let result = run(Err(ServiceError::MissingData("score".into()))).await.unwrap();
        assert_eq!(result, PronunciationResult::neutral());
    }

    #[tokio::test]
    async fn out_of_range_score_becomes_neutral() {
        let result = run(Ok(PronunciationResult {
            score: 9,
            feedback: "??".into(),
        }))
        .await
        .unwrap();
        assert_eq!(result, PronunciationResult::neutral());
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        assert_eq!(run(Err(ServiceError::Timeout)).await.unwrap_err(), ServiceError::Timeout);
        assert!(matches!(
            run(Err(ServiceError::Request("refused".into()))).await,
            Err(ServiceError::Request(_))
        ));
    }
}
