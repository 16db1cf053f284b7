//! # Conversation Data Model
//!
//! Messages, speakers, and the immutable per-meeting options snapshot.
//! The conversation is append-only: messages are created once, and the
//! only later mutation is attaching caption timings after synthesis.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::synthesis::VoiceProvider;

/// What produced a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary persona turn
    Utterance,
    /// Message typed or spoken by a human participant
    Human,
    /// Chair inviting a raised hand to speak
    Invitation,
    /// Operator-injected text
    Injected,
    /// Closing summary produced during wrap-up
    Summary,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Utterance => "utterance",
            MessageKind::Human => "human",
            MessageKind::Invitation => "invitation",
            MessageKind::Injected => "injected",
            MessageKind::Summary => "summary",
        }
    }
}

/// One per-sentence caption span, aligned to audio playback seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceTiming {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// A speaking persona. Immutable for the lifetime of its meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub voice_id: String,
    pub provider: VoiceProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Delivery instruction folded into the persona prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// One entry in a meeting's conversation.
///
/// `text` is the display text and may retain rich-text emphasis; synthesis
/// always works from a stripped copy. When a length envelope truncated the
/// text, `pretrimmed` keeps the original for bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Correlates with the Audio record of the same id
    pub id: Uuid,
    pub kind: MessageKind,
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretrimmed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentences: Option<Vec<SentenceTiming>>,
}

impl ConversationMessage {
    pub fn new(kind: MessageKind, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            speaker: speaker.into(),
            text: text.into(),
            pretrimmed: None,
            sentences: None,
        }
    }

    /// Build a message under a length envelope. Text longer than
    /// `max_chars` is cut at a word boundary; the untrimmed original is
    /// retained in `pretrimmed`.
    pub fn with_length_envelope(
        kind: MessageKind,
        speaker: impl Into<String>,
        text: &str,
        max_chars: usize,
    ) -> Self {
        let mut message = Self::new(kind, speaker, text);
        if let Some(trimmed) = trim_to_envelope(text, max_chars) {
            message.pretrimmed = Some(text.to_string());
            message.text = trimmed;
        }
        message
    }
}

/// Immutable configuration snapshot captured when a meeting is created.
/// Later changes to the global configuration never affect this snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingOptions {
    pub topic: String,
    pub characters: Vec<Character>,
    pub language: String,
    pub max_turns: u32,
    pub utterance_word_limit: u32,
    pub summary_word_limit: u32,
    #[serde(default)]
    pub allow_extension: bool,
    /// Development-mode generation overrides; stripped in production
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl MeetingOptions {
    /// The chair persona: first roster entry. It delivers raise-hand
    /// invitations and the closing summary.
    pub fn chair(&self) -> &Character {
        &self.characters[0]
    }

    pub fn character_by_name(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }
}

/// Cut `text` to at most `max_chars` characters at a word boundary.
/// Returns `None` when no trimming is needed.
fn trim_to_envelope(text: &str, max_chars: usize) -> Option<String> {
    if text.chars().count() <= max_chars {
        return None;
    }

    let hard_cut: String = text.chars().take(max_chars).collect();
    let trimmed = match hard_cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => hard_cut[..pos].trim_end().to_string(),
        _ => hard_cut,
    };
    Some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_not_trimmed() {
        let message =
            ConversationMessage::with_length_envelope(MessageKind::Injected, "Chair", "short", 100);
        assert_eq!(message.text, "short");
        assert!(message.pretrimmed.is_none());
    }

    #[test]
    fn test_long_text_keeps_pretrimmed_original() {
        let original = "one two three four five six seven";
        let message = ConversationMessage::with_length_envelope(
            MessageKind::Injected,
            "Chair",
            original,
            12,
        );
        assert_eq!(message.text, "one two");
        assert_eq!(message.pretrimmed.as_deref(), Some(original));
    }

    #[test]
    fn test_trim_respects_char_boundaries() {
        // Multi-byte characters count once and are never split.
        let trimmed = trim_to_envelope("héllo wörld ünd mehr", 14).unwrap();
        assert_eq!(trimmed, "héllo wörld");
    }

    #[test]
    fn test_message_kind_strings() {
        assert_eq!(MessageKind::Summary.as_str(), "summary");
        assert_eq!(MessageKind::Invitation.as_str(), "invitation");
    }
}
