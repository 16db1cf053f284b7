//! # Audio System
//!
//! Runs the per-task synthesis pipeline behind the queue:
//!
//! 1. Strip display markup before any provider-specific step, so stored
//!    text keeps its emphasis while synthesized text never carries it.
//! 2. For phoneme-sensitive providers, apply pronunciation substitution
//!    and retain the reversal map.
//! 3. Call the selected provider under the network retry policy.
//! 4. Merge multi-chunk results into one track, rebasing caption offsets
//!    on probed chunk durations.
//! 5. Rewrite captions through the reversal map so they never show a
//!    phonetic spelling.
//! 6. Persist the audio record (a failure here is fatal for the meeting).
//! 7. Hand the resolution to the queue for in-order publication.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::audio::merge::merge_chunks;
use crate::audio::probe::DurationProbe;
use crate::audio::queue::{
    AudioFailure, AudioQueue, AudioTask, ResolvedAudio, TaskProcessor,
};
use crate::meeting::conversation::SentenceTiming;
use crate::persistence::{AudioDocument, MeetingStore};
use crate::pronunciation;
use crate::retry::NetworkRetryPolicy;
use crate::synthesis::{SpeechRequest, SynthesizerRegistry};
use crate::text::strip_markup;

/// Submission seam between orchestration and the queue, so the manager
/// can be exercised against a recording fake.
pub trait AudioSubmitter: Send + Sync {
    fn submit(&self, task: AudioTask);
}

/// Public entry point: owns the queue and the pipeline behind it.
pub struct AudioSystem {
    queue: AudioQueue,
}

impl AudioSubmitter for AudioSystem {
    fn submit(&self, task: AudioTask) {
        self.queue.submit(task);
    }
}

impl AudioSystem {
    pub fn start(
        synthesizers: SynthesizerRegistry,
        store: Arc<dyn MeetingStore>,
        probe: Arc<dyn DurationProbe>,
        concurrency: usize,
    ) -> Arc<Self> {
        let pipeline = Arc::new(SynthesisPipeline {
            synthesizers,
            store,
            probe,
            retry: NetworkRetryPolicy::default(),
        });
        Arc::new(Self {
            queue: AudioQueue::start(pipeline, concurrency),
        })
    }
}

struct SynthesisPipeline {
    synthesizers: SynthesizerRegistry,
    store: Arc<dyn MeetingStore>,
    probe: Arc<dyn DurationProbe>,
    retry: NetworkRetryPolicy,
}

impl SynthesisPipeline {
    fn provider_failure(err: crate::error::AppError) -> AudioFailure {
        AudioFailure {
            message: err.to_string(),
            code: "synthesis_failed",
            fatal: false,
        }
    }

    fn persistence_failure(err: crate::error::AppError) -> AudioFailure {
        AudioFailure {
            message: err.to_string(),
            code: "persistence_error",
            fatal: true,
        }
    }
}

#[async_trait]
impl TaskProcessor for SynthesisPipeline {
    async fn process(&self, task: &AudioTask) -> Result<ResolvedAudio, AudioFailure> {
        // Markup never reaches a provider; stored text keeps it
        let plain = strip_markup(&task.text);

        let provider = task.speaker.provider;
        let (synth_text, reversals) = if provider.is_phoneme_sensitive() {
            let substituted = pronunciation::apply(&plain);
            (substituted.text, substituted.reversals)
        } else {
            (plain, Vec::new())
        };

        let request = SpeechRequest {
            text: synth_text,
            voice_id: task.speaker.voice_id.clone(),
            language: task.speaker.locale.clone().or_else(|| task.language.clone()),
            instruction: task.speaker.instruction.clone(),
        };

        let synthesizer = self.synthesizers.get(provider);
        let chunks = self
            .retry
            .run("synthesize", || async {
                synthesizer.synthesize(&request).await
            })
            .await
            .map_err(|err| {
                warn!(
                    meeting_id = task.meeting_id,
                    message_id = %task.message_id,
                    error = %err,
                    "synthesis failed"
                );
                Self::provider_failure(err)
            })?;

        let merged = merge_chunks(&chunks, self.probe.as_ref()).map_err(Self::provider_failure)?;

        // Captions show the words the persona actually used
        let sentences: Vec<SentenceTiming> = merged
            .sentences
            .into_iter()
            .map(|timing| SentenceTiming {
                text: pronunciation::restore(&timing.text, &reversals),
                start: timing.start,
                end: timing.end,
            })
            .collect();

        let document = AudioDocument::new(
            task.message_id,
            task.meeting_id,
            merged.audio.clone(),
            sentences.clone(),
        );
        self.store
            .insert_audio(&document)
            .await
            .map_err(Self::persistence_failure)?;
        self.store
            .set_message_sentences(task.meeting_id, task.message_id, &sentences)
            .await
            .map_err(Self::persistence_failure)?;

        debug!(
            meeting_id = task.meeting_id,
            message_id = %task.message_id,
            bytes = merged.audio.len(),
            sentences = sentences.len(),
            "synthesis task complete"
        );

        Ok(ResolvedAudio {
            audio: merged.audio,
            sentences,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::probe::testing::FixedRateProbe;
    use crate::audio::queue::AudioListener;
    use crate::error::AppResult;
    use crate::meeting::conversation::{Character, MessageKind};
    use crate::persistence::store::testing::MemoryStore;
    use crate::persistence::MeetingDocument;
    use crate::synthesis::{SpeechSynthesizer, SynthesizedChunk, VoiceProvider};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Captures the exact text handed to the provider.
    struct CapturingSynthesizer {
        pub seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for CapturingSynthesizer {
        async fn synthesize(&self, request: &SpeechRequest) -> AppResult<Vec<SynthesizedChunk>> {
            self.seen.lock().unwrap().push(request.text.clone());
            Ok(vec![SynthesizedChunk {
                // First byte 10 => 1.0s under FixedRateProbe
                audio: vec![10, 0, 0, 0],
                sentences: vec![SentenceTiming {
                    text: request.text.clone(),
                    start: 0.0,
                    end: 1.0,
                }],
            }])
        }
    }

    struct DropListener;
    impl AudioListener for DropListener {
        fn audio_resolved(&self, _outcome: crate::audio::queue::AudioOutcome) {}
    }

    fn pipeline_with(
        synthesizer: Arc<CapturingSynthesizer>,
        store: Arc<MemoryStore>,
    ) -> SynthesisPipeline {
        SynthesisPipeline {
            synthesizers: SynthesizerRegistry::new(synthesizer.clone(), synthesizer),
            store,
            probe: Arc::new(FixedRateProbe),
            retry: NetworkRetryPolicy::default(),
        }
    }

    fn speaker(provider: VoiceProvider) -> Character {
        Character {
            id: "ada".into(),
            name: "Ada".into(),
            voice_id: "v1".into(),
            provider,
            locale: None,
            instruction: None,
            temperature: None,
        }
    }

    fn task_for(meeting_id: i64, text: &str, provider: VoiceProvider) -> AudioTask {
        AudioTask {
            meeting_id,
            message_id: Uuid::new_v4(),
            kind: MessageKind::Summary,
            text: text.to_string(),
            speaker: speaker(provider),
            language: None,
            listener: Arc::new(DropListener),
        }
    }

    async fn store_with_meeting(id: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        let options = crate::meeting::conversation::MeetingOptions {
            topic: "t".into(),
            characters: vec![speaker(VoiceProvider::OpenAi)],
            language: "English".into(),
            max_turns: 10,
            utterance_word_limit: 80,
            summary_word_limit: 150,
            allow_extension: false,
            model: None,
            temperature: None,
        };
        store
            .insert_meeting(&MeetingDocument::new(id, options))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_markup_is_stripped_before_the_provider() {
        let synthesizer = Arc::new(CapturingSynthesizer {
            seen: Mutex::new(vec![]),
        });
        let store = store_with_meeting(1).await;
        let pipeline = pipeline_with(synthesizer.clone(), store);

        let task = task_for(1, "## Summary\nThis is **the** content.", VoiceProvider::OpenAi);
        pipeline.process(&task).await.unwrap();

        let seen = synthesizer.seen.lock().unwrap();
        assert_eq!(seen[0], "Summary This is the content.");
        assert!(!seen[0].contains('#'));
        assert!(!seen[0].contains('*'));
    }

    #[tokio::test]
    async fn test_phonetic_forms_never_reach_captions() {
        let synthesizer = Arc::new(CapturingSynthesizer {
            seen: Mutex::new(vec![]),
        });
        let store = store_with_meeting(2).await;
        let pipeline = pipeline_with(synthesizer.clone(), store.clone());

        let task = task_for(2, "We use SQL daily.", VoiceProvider::ElevenLabs);
        let resolved = pipeline.process(&task).await.unwrap();

        // Provider saw the phonetic spelling…
        assert!(synthesizer.seen.lock().unwrap()[0].contains("sequel"));
        // …but the published captions show the original word.
        assert!(resolved.sentences[0].text.contains("SQL"));
        assert!(!resolved.sentences[0].text.contains("sequel"));

        // And so does the persisted record.
        let audio = store.audio.lock().unwrap();
        assert!(audio[0].sentences[0].text.contains("SQL"));
    }

    #[tokio::test]
    async fn test_audio_is_persisted_once_with_captions() {
        let synthesizer = Arc::new(CapturingSynthesizer {
            seen: Mutex::new(vec![]),
        });
        let store = store_with_meeting(3).await;
        let pipeline = pipeline_with(synthesizer, store.clone());

        let task = task_for(3, "Plain sentence.", VoiceProvider::OpenAi);
        let message_id = task.message_id;
        pipeline.process(&task).await.unwrap();

        let audio = store.audio.lock().unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].id, message_id);
        assert_eq!(audio[0].meeting_id, 3);

        let meetings = store.meetings.lock().unwrap();
        assert_eq!(meetings.get(&3).unwrap().audio, vec![message_id]);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let synthesizer = Arc::new(CapturingSynthesizer {
            seen: Mutex::new(vec![]),
        });
        let store = Arc::new(MemoryStore::failing());
        let pipeline = pipeline_with(synthesizer, store);

        let task = task_for(4, "Doomed.", VoiceProvider::OpenAi);
        let failure = pipeline.process(&task).await.unwrap_err();
        assert!(failure.fatal);
        assert_eq!(failure.code, "persistence_error");
    }
}
