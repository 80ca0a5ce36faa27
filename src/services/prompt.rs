//! Prompt text for the three collaborator calls.
//!
//! The recognition and evaluation prompts ask for bare JSON; replies that
//! still arrive inside markdown fences are unwrapped by
//! [`strip_code_fences`].

use crate::language::LanguageDescriptor;

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

/// Build the recognition prompt for the given target languages.
///
/// ```rust
/// use pov_kids::language::default_languages;
/// use pov_kids::services::prompt::recognition_prompt;
///
/// let prompt = recognition_prompt(&default_languages());
/// assert!(prompt.contains("es (Español)"));
/// assert!(prompt.contains("{\"translations\": null}"));
/// ```
pub fn recognition_prompt(languages: &[LanguageDescriptor]) -> String {
    let codes = languages
        .iter()
        .map(|l| format!("{} ({})", l.base_code(), l.display_name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an AI for a kids' learning app. Analyze this image and identify the main, \
most obvious object. Respond with ONLY a valid JSON object with two keys: \
'identifiedObject', the English name of the object, and 'translations', an object mapping \
language codes to the translated name of the object. The language codes are: {codes}. \
For example, if the image is an apple, respond with:\n\
{{\"identifiedObject\": \"apple\", \"translations\": {{\"en\": \"apple\", \"es\": \"manzana\"}}}}\n\
If you cannot identify a clear object, respond with: {{\"translations\": null}}\n\
Do not wrap your response in markdown backticks."
    )
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

pub fn speech_prompt(word: &str) -> String {
    format!("Please say the following: {word}")
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Build the pronunciation-evaluation prompt.
pub fn evaluation_prompt(word: &str, language_name: &str) -> String {
    format!(
        "You are a friendly pronunciation coach for young children. The attached recording \
is a child trying to say the {language_name} word \"{word}\". Rate the pronunciation from 1 \
to 3, where 1 means it needs more practice, 2 means it is close and 3 means it is excellent. \
Respond with ONLY a valid JSON object of the form \
{{\"score\": 2, \"feedback\": \"one short, encouraging sentence\"}}. \
Do not wrap your response in markdown backticks."
    )
}

// ---------------------------------------------------------------------------
// Reply cleanup
// ---------------------------------------------------------------------------

/// Remove a surrounding ```` ```json ```` / ```` ``` ```` fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
