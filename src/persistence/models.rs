//! # Persisted Documents
//!
//! BSON document shapes for the three collections: `meetings`, `audio`,
//! and `counters`. Meetings use the atomically allocated integer id as
//! `_id`; audio records are keyed by their message id so one lookup joins
//! a caption update to its conversation entry.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meeting::conversation::{ConversationMessage, MeetingOptions, SentenceTiming};

/// One meeting document. The conversation array is append-only; `summary`
/// appears exactly once, at wrap-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,
    pub conversation: Vec<ConversationMessage>,
    pub options: MeetingOptions,
    /// Ids of the audio records synthesized for this meeting
    pub audio: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl MeetingDocument {
    pub fn new(id: i64, options: MeetingOptions) -> Self {
        Self {
            id,
            date: Utc::now(),
            conversation: Vec::new(),
            options,
            audio: Vec::new(),
            summary: None,
        }
    }
}

/// One synthesized track. Created once after merging; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDocument {
    /// Same id as the conversation message this audio belongs to
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,
    pub meeting_id: i64,
    pub audio: bson::Binary,
    pub sentences: Vec<SentenceTiming>,
}

impl AudioDocument {
    pub fn new(id: Uuid, meeting_id: i64, audio: Vec<u8>, sentences: Vec<SentenceTiming>) -> Self {
        Self {
            id,
            date: Utc::now(),
            meeting_id,
            audio: bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: audio,
            },
            sentences,
        }
    }
}

/// The single atomic sequence document allocating meeting ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: i64,
}

/// `_id` of the meeting-id counter.
pub const MEETING_COUNTER: &str = "meeting_id";
