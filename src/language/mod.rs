//! Language descriptors and translation lookup.
//!
//! The recognition service returns translations keyed by whatever codes the
//! model felt like using (`"es"`, `"es-ES"`, `"ES"` …).  [`resolve_translation`]
//! maps a [`LanguageDescriptor`] onto such a map in a fixed order:
//!
//! 1. exact code
//! 2. case-insensitive code
//! 3. base-language prefix (`es-ES` ↔ `es`, `es` ↔ `es-MX`)
//! 4. the identified object's source name
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use pov_kids::language::{resolve_translation, LanguageDescriptor};
//!
//! let mut translations = BTreeMap::new();
//! translations.insert("es".to_string(), "manzana".to_string());
//!
//! let spanish = LanguageDescriptor::new("Español", "es-ES", "Puck");
//! assert_eq!(resolve_translation(&translations, &spanish, "apple"), "manzana");
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LanguageDescriptor
// ---------------------------------------------------------------------------

/// A language the learner can practise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    /// Name shown to the learner, in the language itself.
    pub display_name: String,
    /// BCP-47 style code (`"es-ES"`).
    pub code: String,
    /// Prebuilt voice used by the speech service.
    pub voice: String,
}

impl LanguageDescriptor {
    pub fn new(display_name: &str, code: &str, voice: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            code: code.to_string(),
            voice: voice.to_string(),
        }
    }

    /// The built-in English descriptor.
    pub fn english() -> Self {
        Self::new("English", "en-US", "Zephyr")
    }

    /// Base language of the code (`"es-ES"` → `"es"`).
    pub fn base_code(&self) -> &str {
        base_code(&self.code)
    }
}

/// The languages offered out of the box.
pub fn default_languages() -> Vec<LanguageDescriptor> {
    vec![
        LanguageDescriptor::english(),
        LanguageDescriptor::new("Español", "es-ES", "Puck"),
        LanguageDescriptor::new("普通话", "zh-CN", "Kore"),
        LanguageDescriptor::new("Bahasa Melayu", "ms-MY", "Fenrir"),
        LanguageDescriptor::new("Nederlands", "nl-NL", "Charon"),
        LanguageDescriptor::new("ภาษาไทย", "th-TH", "Puck"),
    ]
}

fn base_code(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code)
}

// ---------------------------------------------------------------------------
// resolve_translation
// ---------------------------------------------------------------------------

/// Find the word for `language` in `translations`, falling back to
/// `source_word` when nothing matches.  Never fails.
pub fn resolve_translation(
    translations: &BTreeMap<String, String>,
    language: &LanguageDescriptor,
    source_word: &str,
) -> String {
    lookup(translations, language)
        .map(str::to_string)
        .unwrap_or_else(|| source_word.to_string())
}

/// Steps 1–3 of the lookup; `None` when only the source word would do.
///
/// Empty translations are skipped so a blank entry never hides a usable one.
pub fn lookup<'a>(
    translations: &'a BTreeMap<String, String>,
    language: &LanguageDescriptor,
) -> Option<&'a str> {
    let usable = |(k, v): (&'a String, &'a String)| {
        if v.trim().is_empty() {
            None
        } else {
            Some((k.as_str(), v.as_str()))
        }
    };
    let entries = || translations.iter().filter_map(usable);

    if let Some((_, word)) = entries().find(|(k, _)| *k == language.code) {
        return Some(word);
    }

    if let Some((_, word)) = entries().find(|(k, _)| k.eq_ignore_ascii_case(&language.code)) {
        return Some(word);
    }

    let base = language.base_code();
    entries()
        .find(|(k, _)| base_code(k).eq_ignore_ascii_case(base))
        .map(|(_, word)| word)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn spanish() -> LanguageDescriptor {
        LanguageDescriptor::new("Español", "es-ES", "Puck")
    }

    #[test]
    fn exact_code_wins() {
        let t = map(&[("en-US", "Apple"), ("es-ES", "Manzana")]);
        assert_eq!(resolve_translation(&t, &spanish(), "Apple"), "Manzana");
    }

    #[test]
    fn exact_beats_case_insensitive_and_prefix() {
        let t = map(&[("es", "prefix"), ("ES-es", "case"), ("es-ES", "exact")]);
        assert_eq!(resolve_translation(&t, &spanish(), "src"), "exact");
    }

    #[test]
    fn case_insensitive_beats_prefix() {
        let t = map(&[("es", "prefix"), ("ES-ES", "case")]);
        assert_eq!(resolve_translation(&t, &spanish(), "src"), "case");
    }

    #[test]
    fn regional_code_matches_base_key() {
        let t = map(&[("en", "apple"), ("es", "manzana"), ("zh", "苹果")]);
        assert_eq!(resolve_translation(&t, &spanish(), "apple"), "manzana");
    }

    #[test]
    fn base_code_matches_regional_key() {
        let t = map(&[("es-MX", "manzana")]);
        let base_only = LanguageDescriptor::new("Español", "es", "Puck");
        assert_eq!(resolve_translation(&t, &base_only, "apple"), "manzana");
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let t = map(&[("ES", "manzana")]);
        assert_eq!(resolve_translation(&t, &spanish(), "apple"), "manzana");
    }

    #[test]
    fn no_match_falls_back_to_source_word() {
        let t = map(&[("fr", "pomme")]);
        assert_eq!(resolve_translation(&t, &spanish(), "Apple"), "Apple");
    }

    #[test]
    fn empty_map_falls_back_to_source_word() {
        let t = BTreeMap::new();
        assert_eq!(resolve_translation(&t, &spanish(), "Apple"), "Apple");
        assert!(lookup(&t, &spanish()).is_none());
    }

    #[test]
    fn blank_entries_are_skipped() {
        let t = map(&[("es-ES", "  "), ("es", "manzana")]);
        assert_eq!(resolve_translation(&t, &spanish(), "Apple"), "manzana");
    }

    #[test]
    fn base_code_handles_underscore_and_plain_codes() {
        assert_eq!(LanguageDescriptor::new("x", "zh_CN", "v").base_code(), "zh");
        assert_eq!(LanguageDescriptor::new("x", "th", "v").base_code(), "th");
    }

    #[test]
    fn default_languages_have_unique_codes() {
        let langs = default_languages();
        let mut codes: Vec<_> = langs.iter().map(|l| l.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), langs.len());
    }
}
