//! # Persistence
//!
//! Document storage for meetings, audio records, and the meeting-id
//! counter. The store trait is the only surface the rest of the crate
//! sees; the MongoDB implementation lives behind it.

pub mod models;
pub mod store;

pub use models::{AudioDocument, CounterDocument, MeetingDocument, MEETING_COUNTER};
pub use store::{MeetingStore, MongoMeetingStore};
