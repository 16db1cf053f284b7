//! # Display-Text Normalization
//!
//! Persona utterances may carry markdown emphasis for display. Speech
//! synthesis must never see that markup, so every synthesis task strips it
//! here before any provider-specific step runs. Stored conversation
//! messages keep the markup untouched.
//!
//! Stripping is idempotent: running it over already-plain text returns the
//! text unchanged (modulo whitespace normalization, which is itself
//! idempotent).

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*```[^\n]*$").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").unwrap());
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*>\s?").unwrap());
static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-+*]\s+").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static BOLD_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip markdown markup from `text`, producing plain prose suitable for
/// speech synthesis. Newlines collapse to single spaces.
pub fn strip_markup(text: &str) -> String {
    let mut result = text.to_string();

    // Line-level markers first; they anchor on ^ and must see newlines
    result = CODE_FENCE.replace_all(&result, "").to_string();
    result = HEADING.replace_all(&result, "").to_string();
    result = BLOCKQUOTE.replace_all(&result, "").to_string();
    result = LIST_MARKER.replace_all(&result, "").to_string();

    // Inline spans, longest delimiters before their prefixes
    result = IMAGE.replace_all(&result, "$1").to_string();
    result = LINK.replace_all(&result, "$1").to_string();
    result = BOLD.replace_all(&result, "$1").to_string();
    result = BOLD_UNDERSCORE.replace_all(&result, "$1").to_string();
    result = EMPHASIS.replace_all(&result, "$1").to_string();
    result = INLINE_CODE.replace_all(&result, "$1").to_string();

    // Orphaned emphasis delimiters that the paired patterns missed
    result = result.replace(['*', '`'], "");

    WHITESPACE.replace_all(&result, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_heading() {
        let output = strip_markup("## Summary\nThis is the content.");
        assert!(output.contains("Summary"));
        assert!(output.contains("This is the content"));
        assert!(!output.contains('#'));
    }

    #[test]
    fn test_strip_is_idempotent() {
        let inputs = [
            "## Summary\nThis is the content.",
            "**Bold** and *italic* with `code`.",
            "Plain text stays plain.",
            "A [link](https://example.com) and ![img](x.png).",
        ];
        for input in inputs {
            let once = strip_markup(input);
            assert_eq!(strip_markup(&once), once);
        }
    }

    #[test]
    fn test_strip_emphasis_and_links() {
        assert_eq!(
            strip_markup("**Key point**: see *this* and [the docs](https://x)."),
            "Key point: see this and the docs."
        );
    }

    #[test]
    fn test_strip_list_and_quote() {
        let output = strip_markup("> Quoted\n- first\n- second");
        assert_eq!(output, "Quoted first second");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(
            strip_markup("Interest rates stayed flat."),
            "Interest rates stayed flat."
        );
    }
}
