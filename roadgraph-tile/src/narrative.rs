//! # Narrative dictionaries
//!
//! Localized phrase templates used to render turn-by-turn instructions.
//! The storage layer never calls into this; it is an immutable lookup table
//! keyed by (language tag, phrase set, phrase key).
//!
//! Templates contain placeholder tokens like `<STREET_NAMES>`,
//! which [`fill_template`] replaces.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NarrativeError {
    #[error("Unknown language tag: {0}")]
    UnknownLanguageTag(String),
    #[error("The {language_tag} dictionary has no phrase set named {phrase_set}")]
    UnknownPhraseSet {
        language_tag: String,
        phrase_set: String,
    },
    #[error("The {phrase_set} phrase set has no phrase {key}")]
    UnknownPhrase { phrase_set: String, key: String },
}

/// The phrases for one kind of instruction (ex: `start`, `ramp_verbal`),
/// along with the word lists their placeholders draw from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PhraseSet {
    /// Phrase key (ex: `"0"`) to template.
    pub phrases: BTreeMap<String, String>,
    pub cardinal_directions: Vec<String>,
    pub relative_directions: Vec<String>,
    pub empty_street_name_labels: Vec<String>,
    pub metric_lengths: Vec<String>,
    pub us_customary_lengths: Vec<String>,
    pub ordinal_values: Vec<String>,
}

impl PhraseSet {
    #[must_use]
    pub fn phrase(&self, key: &str) -> Option<&str> {
        self.phrases.get(key).map(String::as_str)
    }
}

/// All phrase sets for a single language.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NarrativeDictionary {
    pub posix_locale: Option<String>,
    /// Other tags this dictionary answers to.
    pub aliases: Vec<String>,
    #[cfg_attr(feature = "serde", serde(rename = "instructions"))]
    pub phrase_sets: BTreeMap<String, PhraseSet>,
}

impl NarrativeDictionary {
    #[must_use]
    pub fn phrase_set(&self, name: &str) -> Option<&PhraseSet> {
        self.phrase_sets.get(name)
    }
}

/// Dictionaries for every supported language.
#[derive(Clone, Debug, Default)]
pub struct NarrativeDictionaries {
    /// In registration order, which decides language fallback.
    dictionaries: Vec<(String, NarrativeDictionary)>,
}

impl NarrativeDictionaries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dictionary, replacing any previous one with the same tag.
    pub fn insert<T: Into<String>>(&mut self, language_tag: T, dictionary: NarrativeDictionary) {
        let language_tag = language_tag.into();
        match self
            .dictionaries
            .iter_mut()
            .find(|(tag, _)| *tag == language_tag)
        {
            Some((_, existing)) => *existing = dictionary,
            None => self.dictionaries.push((language_tag, dictionary)),
        }
    }

    /// The registered language tags.
    pub fn language_tags(&self) -> impl Iterator<Item = &str> {
        self.dictionaries.iter().map(|(tag, _)| tag.as_str())
    }

    /// Looks up the dictionary for a language tag.
    ///
    /// Tags are matched exactly, then against dictionary aliases.
    /// A bare language (ex: `en`) falls back to the first registered regional variant (ex: `en-US`).
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError::UnknownLanguageTag`] if nothing matches.
    pub fn dictionary(&self, language_tag: &str) -> Result<&NarrativeDictionary, NarrativeError> {
        let find = |matches: &dyn Fn(&str, &NarrativeDictionary) -> bool| {
            self.dictionaries
                .iter()
                .find(|(tag, dictionary)| matches(tag, dictionary))
                .map(|(_, dictionary)| dictionary)
        };

        find(&|tag, _| tag == language_tag)
            .or_else(|| find(&|_, dictionary| dictionary.aliases.iter().any(|a| a == language_tag)))
            .or_else(|| {
                if language_tag.contains('-') {
                    return None;
                }
                find(&|tag, _| {
                    tag.split_once('-')
                        .is_some_and(|(language, _)| language == language_tag)
                })
            })
            .ok_or_else(|| NarrativeError::UnknownLanguageTag(language_tag.to_string()))
    }

    /// Looks up a phrase set.
    ///
    /// # Errors
    ///
    /// Fails if the language or the phrase set is unknown.
    pub fn phrase_set(
        &self,
        language_tag: &str,
        phrase_set: &str,
    ) -> Result<&PhraseSet, NarrativeError> {
        self.dictionary(language_tag)?
            .phrase_set(phrase_set)
            .ok_or_else(|| NarrativeError::UnknownPhraseSet {
                language_tag: language_tag.to_string(),
                phrase_set: phrase_set.to_string(),
            })
    }

    /// Looks up a single phrase template.
    ///
    /// # Errors
    ///
    /// Fails if the language, phrase set, or phrase key is unknown.
    pub fn phrase(
        &self,
        language_tag: &str,
        phrase_set: &str,
        key: &str,
    ) -> Result<&str, NarrativeError> {
        self.phrase_set(language_tag, phrase_set)?
            .phrase(key)
            .ok_or_else(|| NarrativeError::UnknownPhrase {
                phrase_set: phrase_set.to_string(),
                key: key.to_string(),
            })
    }
}

impl<T: Into<String>> FromIterator<(T, NarrativeDictionary)> for NarrativeDictionaries {
    fn from_iter<I: IntoIterator<Item = (T, NarrativeDictionary)>>(iter: I) -> Self {
        let mut dictionaries = Self::new();
        for (tag, dictionary) in iter {
            dictionaries.insert(tag, dictionary);
        }
        dictionaries
    }
}

/// Replaces `<TOKEN>` placeholders in a template.
///
/// Tokens are given without angle brackets (ex: `("STREET_NAMES", "Main Street")`).
/// Placeholders without a substitution are left as they are.
pub fn fill_template<I, K, V>(template: &str, substitutions: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let substitutions: Vec<(K, V)> = substitutions.into_iter().collect();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            // Unterminated placeholder
            out.push_str(&rest[start..]);
            return out;
        };

        let token = &after[..end];
        match substitutions.iter().find(|(key, _)| key.as_ref() == token) {
            Some((_, value)) => out.push_str(value.as_ref()),
            None => out.push_str(&rest[start..start + end + 2]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    out
}
