//! # Pronunciation Substitution
//!
//! Some synthesis providers mangle technical terms and acronyms. Before
//! text reaches a phoneme-sensitive provider, known phrases are swapped
//! for phonetic spellings; after synthesis, the returned captions are
//! rewritten back so the audience never sees a phonetic form.
//!
//! Matching rules:
//! - The phrase table is compiled once per process (lazy, cached).
//! - Matchers are ordered by descending phrase length, so a longer phrase
//!   wins over any shorter phrase it contains ("PostgreSQL" before "SQL").
//! - Matching is case-insensitive.
//! - A word-boundary anchor is applied only on the side(s) where the
//!   phrase begins/ends with a word character, so punctuation-bearing
//!   phrases like "Q&A" still match.
//! - Each phrase is substituted at most once across the whole text (its
//!   first occurrence); every applied substitution records a reverse
//!   entry, and absent phrases record nothing.

use once_cell::sync::Lazy;
use regex::Regex;

/// Phrase table: (written form, phonetic spelling handed to the provider).
const PHRASE_TABLE: &[(&str, &str)] = &[
    ("PostgreSQL", "postgress cue ell"),
    ("Kubernetes", "koober netties"),
    ("SQL", "sequel"),
    ("GIF", "jif"),
    ("Q&A", "cue and ay"),
    ("LLM", "el el em"),
    ("API", "ay pee eye"),
    ("nginx", "engine ex"),
];

struct Matcher {
    phrase: &'static str,
    phonetic: &'static str,
    pattern: Regex,
}

/// Compiled matchers, longest phrase first.
static MATCHERS: Lazy<Vec<Matcher>> = Lazy::new(|| {
    let mut entries: Vec<&(&str, &str)> = PHRASE_TABLE.iter().collect();
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    entries
        .into_iter()
        .map(|&(phrase, phonetic)| {
            let mut pattern = String::from("(?i)");
            if phrase
                .chars()
                .next()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false)
            {
                pattern.push_str(r"\b");
            }
            pattern.push_str(&regex::escape(phrase));
            if phrase
                .chars()
                .last()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false)
            {
                pattern.push_str(r"\b");
            }
            Matcher {
                phrase,
                phonetic,
                pattern: Regex::new(&pattern).expect("pronunciation pattern must compile"),
            }
        })
        .collect()
});

/// One applied substitution, kept so captions can be rewritten back.
#[derive(Debug, Clone, PartialEq)]
pub struct Reversal {
    /// Phonetic form that went to the provider (and into its captions)
    pub phonetic: String,
    /// Text as it appeared in the utterance
    pub original: String,
}

/// Result of running the processor over one utterance.
#[derive(Debug, Clone)]
pub struct Substituted {
    pub text: String,
    pub reversals: Vec<Reversal>,
}

/// Substitute known phrases in `text` with their phonetic spellings.
///
/// Each table phrase is replaced at its first occurrence only; the
/// returned reversal list contains exactly the substitutions applied.
pub fn apply(text: &str) -> Substituted {
    let mut result = text.to_string();
    let mut reversals = Vec::new();

    for matcher in MATCHERS.iter() {
        let found = matcher
            .pattern
            .find(&result)
            .map(|m| (m.range(), m.as_str().to_string()));
        if let Some((range, original)) = found {
            result.replace_range(range, matcher.phonetic);
            reversals.push(Reversal {
                phonetic: matcher.phonetic.to_string(),
                original,
            });
            tracing::trace!(phrase = matcher.phrase, "applied pronunciation substitution");
        }
    }

    Substituted {
        text: result,
        reversals,
    }
}

/// Rewrite a caption string, restoring original words for every phonetic
/// form that was substituted into the synthesized text.
pub fn restore(text: &str, reversals: &[Reversal]) -> String {
    let mut result = text.to_string();
    for reversal in reversals {
        if let Some(pos) = result.find(&reversal.phonetic) {
            result.replace_range(pos..pos + reversal.phonetic.len(), &reversal.original);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_phrase_wins() {
        // "PostgreSQL" contains "SQL"; the longer phrase must be applied,
        // never the shorter one alone.
        let result = apply("We moved to PostgreSQL last year.");
        assert!(result.text.contains("postgress cue ell"));
        assert!(!result.text.contains("PostgreSQL"));
        assert_eq!(result.reversals.len(), 1);
        assert_eq!(result.reversals[0].original, "PostgreSQL");
    }

    #[test]
    fn test_case_insensitive_match() {
        let result = apply("the sql layer");
        assert_eq!(result.text, "the sequel layer");
        assert_eq!(result.reversals[0].original, "sql");
    }

    #[test]
    fn test_word_boundary_guard() {
        // "SQL" inside a longer word must not match.
        let result = apply("the sqlite file");
        assert_eq!(result.text, "the sqlite file");
        assert!(result.reversals.is_empty());
    }

    #[test]
    fn test_punctuation_bearing_phrase() {
        let result = apply("Time for the Q&A session.");
        assert!(result.text.contains("cue and ay"));
        assert_eq!(result.reversals[0].original, "Q&A");
    }

    #[test]
    fn test_at_most_once_per_phrase() {
        let result = apply("A GIF here and a GIF there.");
        assert_eq!(result.text, "A jif here and a GIF there.");
        assert_eq!(result.reversals.len(), 1);
    }

    #[test]
    fn test_absent_phrases_record_nothing() {
        let result = apply("Nothing notable here.");
        assert_eq!(result.text, "Nothing notable here.");
        assert!(result.reversals.is_empty());
    }

    #[test]
    fn test_caption_restore_roundtrip() {
        let result = apply("Ask the API during Q&A.");
        let restored = restore(&result.text, &result.reversals);
        assert_eq!(restored, "Ask the API during Q&A.");
    }
}
