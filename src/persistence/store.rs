//! # Meeting Store
//!
//! Persistence adapter behind a trait so orchestration and tests never
//! depend on a running database. The production implementation wraps the
//! MongoDB driver; the single writer per meeting is the owning manager,
//! so no update here needs a transaction.

use async_trait::async_trait;
use bson::doc;
use futures_util::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::meeting::conversation::{ConversationMessage, SentenceTiming};
use crate::persistence::models::{
    AudioDocument, CounterDocument, MeetingDocument, MEETING_COUNTER,
};

/// Document storage and atomic id allocation.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Create the meeting-id counter if it does not exist yet. A
    /// duplicate-key race between concurrently booting instances is
    /// benign and swallowed.
    async fn ensure_counter(&self) -> AppResult<()>;

    /// Allocate the next meeting id: strictly increasing, never reused.
    async fn next_meeting_id(&self) -> AppResult<i64>;

    async fn insert_meeting(&self, meeting: &MeetingDocument) -> AppResult<()>;

    /// Append one message to a meeting's conversation.
    async fn append_message(
        &self,
        meeting_id: i64,
        message: &ConversationMessage,
    ) -> AppResult<()>;

    /// Attach caption timings to an already-appended message.
    async fn set_message_sentences(
        &self,
        meeting_id: i64,
        message_id: Uuid,
        sentences: &[SentenceTiming],
    ) -> AppResult<()>;

    async fn set_summary(&self, meeting_id: i64, summary: &str) -> AppResult<()>;

    /// Store one audio record and register it on its meeting.
    async fn insert_audio(&self, audio: &AudioDocument) -> AppResult<()>;

    async fn find_meeting(&self, meeting_id: i64) -> AppResult<Option<MeetingDocument>>;

    /// All audio records for a meeting, used for reconnection replay.
    async fn find_audio_for_meeting(&self, meeting_id: i64) -> AppResult<Vec<AudioDocument>>;
}

/// MongoDB-backed store.
pub struct MongoMeetingStore {
    meetings: Collection<MeetingDocument>,
    audio: Collection<AudioDocument>,
    counters: Collection<CounterDocument>,
}

impl MongoMeetingStore {
    pub async fn connect(uri: &str, database: &str) -> AppResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        info!(database, "connected to MongoDB");
        Ok(Self::new(client.database(database)))
    }

    pub fn new(db: Database) -> Self {
        Self {
            meetings: db.collection("meetings"),
            audio: db.collection("audio"),
            counters: db.collection("counters"),
        }
    }
}

/// Server error code for a duplicate `_id` insert.
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write)) => {
            write.code == DUPLICATE_KEY
        }
        _ => false,
    }
}

#[async_trait]
impl MeetingStore for MongoMeetingStore {
    async fn ensure_counter(&self) -> AppResult<()> {
        let counter = CounterDocument {
            id: MEETING_COUNTER.to_string(),
            seq: 0,
        };
        match self.counters.insert_one(&counter).await {
            Ok(_) => {
                info!("meeting-id counter bootstrapped");
                Ok(())
            }
            Err(err) if is_duplicate_key(&err) => {
                debug!("meeting-id counter already exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn next_meeting_id(&self) -> AppResult<i64> {
        let updated = self
            .counters
            .find_one_and_update(
                doc! { "_id": MEETING_COUNTER },
                doc! { "$inc": { "seq": 1 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| {
                AppError::Persistence("counter upsert returned no document".to_string())
            })?;
        Ok(updated.seq)
    }

    async fn insert_meeting(&self, meeting: &MeetingDocument) -> AppResult<()> {
        self.meetings.insert_one(meeting).await?;
        Ok(())
    }

    async fn append_message(
        &self,
        meeting_id: i64,
        message: &ConversationMessage,
    ) -> AppResult<()> {
        let message_bson = bson::to_bson(message)
            .map_err(|e| AppError::Persistence(format!("message serialization: {}", e)))?;
        let result = self
            .meetings
            .update_one(
                doc! { "_id": meeting_id },
                doc! { "$push": { "conversation": message_bson } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::Persistence(format!(
                "meeting {} vanished during append",
                meeting_id
            )));
        }
        Ok(())
    }

    async fn set_message_sentences(
        &self,
        meeting_id: i64,
        message_id: Uuid,
        sentences: &[SentenceTiming],
    ) -> AppResult<()> {
        let sentences_bson = bson::to_bson(sentences)
            .map_err(|e| AppError::Persistence(format!("sentence serialization: {}", e)))?;
        self.meetings
            .update_one(
                doc! { "_id": meeting_id, "conversation.id": message_id.to_string() },
                doc! { "$set": { "conversation.$.sentences": sentences_bson } },
            )
            .await?;
        Ok(())
    }

    async fn set_summary(&self, meeting_id: i64, summary: &str) -> AppResult<()> {
        self.meetings
            .update_one(
                doc! { "_id": meeting_id },
                doc! { "$set": { "summary": summary } },
            )
            .await?;
        Ok(())
    }

    async fn insert_audio(&self, audio: &AudioDocument) -> AppResult<()> {
        self.audio.insert_one(audio).await?;
        self.meetings
            .update_one(
                doc! { "_id": audio.meeting_id },
                doc! { "$push": { "audio": audio.id.to_string() } },
            )
            .await?;
        Ok(())
    }

    async fn find_meeting(&self, meeting_id: i64) -> AppResult<Option<MeetingDocument>> {
        Ok(self.meetings.find_one(doc! { "_id": meeting_id }).await?)
    }

    async fn find_audio_for_meeting(&self, meeting_id: i64) -> AppResult<Vec<AudioDocument>> {
        let cursor = self.audio.find(doc! { "meeting_id": meeting_id }).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory store used across the crate's tests. Mirrors the Mongo
    //! store's observable behavior, including strictly increasing ids.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        counter: AtomicI64,
        pub meetings: Mutex<HashMap<i64, MeetingDocument>>,
        pub audio: Mutex<Vec<AudioDocument>>,
        /// When set, every write fails with a persistence error
        pub fail_writes: AtomicBool,
    }

    impl MemoryStore {
        pub fn failing() -> Self {
            let store = Self::default();
            store.fail_writes.store(true, Ordering::SeqCst);
            store
        }

        fn check_writable(&self) -> AppResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(AppError::Persistence("scripted write failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl MeetingStore for MemoryStore {
        async fn ensure_counter(&self) -> AppResult<()> {
            Ok(())
        }

        async fn next_meeting_id(&self) -> AppResult<i64> {
            self.check_writable()?;
            Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn insert_meeting(&self, meeting: &MeetingDocument) -> AppResult<()> {
            self.check_writable()?;
            self.meetings
                .lock()
                .unwrap()
                .insert(meeting.id, meeting.clone());
            Ok(())
        }

        async fn append_message(
            &self,
            meeting_id: i64,
            message: &ConversationMessage,
        ) -> AppResult<()> {
            self.check_writable()?;
            let mut meetings = self.meetings.lock().unwrap();
            let meeting = meetings.get_mut(&meeting_id).ok_or_else(|| {
                AppError::Persistence(format!("meeting {} vanished during append", meeting_id))
            })?;
            meeting.conversation.push(message.clone());
            Ok(())
        }

        async fn set_message_sentences(
            &self,
            meeting_id: i64,
            message_id: Uuid,
            sentences: &[SentenceTiming],
        ) -> AppResult<()> {
            self.check_writable()?;
            let mut meetings = self.meetings.lock().unwrap();
            if let Some(meeting) = meetings.get_mut(&meeting_id) {
                if let Some(message) =
                    meeting.conversation.iter_mut().find(|m| m.id == message_id)
                {
                    message.sentences = Some(sentences.to_vec());
                }
            }
            Ok(())
        }

        async fn set_summary(&self, meeting_id: i64, summary: &str) -> AppResult<()> {
            self.check_writable()?;
            if let Some(meeting) = self.meetings.lock().unwrap().get_mut(&meeting_id) {
                meeting.summary = Some(summary.to_string());
            }
            Ok(())
        }

        async fn insert_audio(&self, audio: &AudioDocument) -> AppResult<()> {
            self.check_writable()?;
            self.audio.lock().unwrap().push(audio.clone());
            if let Some(meeting) = self.meetings.lock().unwrap().get_mut(&audio.meeting_id) {
                meeting.audio.push(audio.id);
            }
            Ok(())
        }

        async fn find_meeting(&self, meeting_id: i64) -> AppResult<Option<MeetingDocument>> {
            Ok(self.meetings.lock().unwrap().get(&meeting_id).cloned())
        }

        async fn find_audio_for_meeting(&self, meeting_id: i64) -> AppResult<Vec<AudioDocument>> {
            Ok(self
                .audio
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.meeting_id == meeting_id)
                .cloned()
                .collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::meeting::conversation::MeetingOptions;

        fn options() -> MeetingOptions {
            MeetingOptions {
                topic: "t".into(),
                characters: vec![],
                language: "English".into(),
                max_turns: 10,
                utterance_word_limit: 80,
                summary_word_limit: 150,
                allow_extension: false,
                model: None,
                temperature: None,
            }
        }

        #[tokio::test]
        async fn test_ids_are_strictly_increasing_under_contention() {
            let store = std::sync::Arc::new(MemoryStore::default());

            let mut handles = Vec::new();
            for _ in 0..16 {
                let store = store.clone();
                handles.push(tokio::spawn(
                    async move { store.next_meeting_id().await },
                ));
            }

            let mut ids = Vec::new();
            for handle in handles {
                ids.push(handle.await.unwrap().unwrap());
            }
            ids.sort_unstable();
            let unique: std::collections::HashSet<_> = ids.iter().collect();
            assert_eq!(unique.len(), 16);
            assert_eq!(*ids.first().unwrap(), 1);
            assert_eq!(*ids.last().unwrap(), 16);
        }

        #[tokio::test]
        async fn test_counter_bootstrap_is_idempotent() {
            let store = MemoryStore::default();
            store.ensure_counter().await.unwrap();
            store.ensure_counter().await.unwrap();
        }

        #[tokio::test]
        async fn test_audio_insert_registers_on_meeting() {
            let store = MemoryStore::default();
            let id = store.next_meeting_id().await.unwrap();
            store
                .insert_meeting(&MeetingDocument::new(id, options()))
                .await
                .unwrap();

            let audio = AudioDocument::new(Uuid::new_v4(), id, vec![1, 2], vec![]);
            store.insert_audio(&audio).await.unwrap();

            let meeting = store.find_meeting(id).await.unwrap().unwrap();
            assert_eq!(meeting.audio, vec![audio.id]);
        }
    }
}
