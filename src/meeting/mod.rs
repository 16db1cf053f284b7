//! # Meeting Orchestration
//!
//! The per-meeting state machine and its data model: turn-taking, human
//! interjection, raise-hand, wrap-up, and reconnection recovery. Consumes
//! the text-generation capability, the audio system, and the persistence
//! adapter; never touches the transport directly.

pub mod conversation;
pub mod manager;
pub mod turn_policy;

pub use conversation::{
    Character, ConversationMessage, MeetingOptions, MessageKind, SentenceTiming,
};
pub use manager::{HumanMessage, MeetingDeps, MeetingManager, MeetingPhase};
pub use turn_policy::{RoundRobinPolicy, TurnPolicy};
