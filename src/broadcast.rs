//! # Outbound Events and the Broadcaster Contract
//!
//! The meeting manager never touches the transport. Everything it sends
//! outward goes through [`MeetingBroadcaster`], a fire-and-forget
//! capability a session adapter implements. This keeps orchestration
//! testable against a recording fake, and lets a live manager be rebound
//! to a fresh session on reconnect, or to [`NullBroadcaster`] when the
//! client disconnects while synthesis is still running.
//!
//! ## Wire Format
//!
//! Outbound messages are JSON objects discriminated by a `type` field,
//! e.g. `{"type": "meeting_started", "meeting_id": 12}`. Audio payloads
//! travel base64-encoded.

use base64::Engine;
use serde::Serialize;
use uuid::Uuid;

use crate::meeting::conversation::{ConversationMessage, SentenceTiming};

/// Resolved audio for one message, ready to publish.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub id: Uuid,
    pub audio: Option<Vec<u8>>,
    pub sentences: Option<Vec<SentenceTiming>>,
    /// Message kind marker for non-utterance audio ("summary", …)
    pub kind: Option<String>,
}

/// Every message the server can push to a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "meeting_started")]
    MeetingStarted { meeting_id: i64 },

    #[serde(rename = "conversation_update")]
    ConversationUpdate {
        conversation: Vec<ConversationMessage>,
    },

    #[serde(rename = "conversation_end")]
    ConversationEnd {
        conversation: Vec<ConversationMessage>,
    },

    #[serde(rename = "audio_update")]
    AudioUpdate {
        id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sentences: Option<Vec<SentenceTiming>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },

    #[serde(rename = "conversation_error")]
    ConversationError { message: String, code: String },

    #[serde(rename = "meeting_not_found")]
    MeetingNotFound { meeting_id: i64 },

    #[serde(rename = "clientkey_response")]
    ClientKeyResponse { value: String },
}

impl ServerMessage {
    pub fn audio_update(payload: AudioPayload) -> Self {
        ServerMessage::AudioUpdate {
            id: payload.id,
            audio: payload
                .audio
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            sentences: payload.sentences,
            kind: payload.kind,
        }
    }
}

/// Abstract outbound capability handed to a meeting manager.
///
/// Methods are synchronous and must not block: implementations enqueue
/// and return (the session actor mailbox, a test recorder, or nothing).
pub trait MeetingBroadcaster: Send + Sync {
    fn meeting_started(&self, meeting_id: i64);
    fn conversation_update(&self, conversation: &[ConversationMessage]);
    fn conversation_end(&self, conversation: &[ConversationMessage]);
    fn audio_update(&self, payload: AudioPayload);
    fn client_key(&self, value: &str);
    fn error(&self, message: &str, code: &str);
    fn meeting_not_found(&self, meeting_id: i64);
}

/// Broadcaster for a detached meeting: every event is dropped. Installed
/// when the client disconnects so in-flight generation and synthesis can
/// run to completion and persist without a live session.
pub struct NullBroadcaster;

impl MeetingBroadcaster for NullBroadcaster {
    fn meeting_started(&self, _meeting_id: i64) {}
    fn conversation_update(&self, _conversation: &[ConversationMessage]) {}
    fn conversation_end(&self, _conversation: &[ConversationMessage]) {}
    fn audio_update(&self, _payload: AudioPayload) {}
    fn client_key(&self, _value: &str) {}
    fn error(&self, _message: &str, _code: &str) {}
    fn meeting_not_found(&self, _meeting_id: i64) {}
}
