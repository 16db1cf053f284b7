//! # OpenAI Speech Synthesizer
//!
//! The speech endpoint returns plain audio with no timing information, so
//! long input is synthesized sentence by sentence: each sentence becomes
//! its own chunk whose duration is probed from the returned container.
//! The merge step then accumulates the chunk durations into absolute
//! caption offsets. Wrap-up summaries take this path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::audio::probe::DurationProbe;
use crate::error::{AppError, AppResult};
use crate::meeting::conversation::SentenceTiming;
use crate::synthesis::provider::{
    split_sentences, SpeechRequest, SpeechSynthesizer, SynthesizedChunk,
};

const MODEL: &str = "tts-1";

pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    probe: Arc<dyn DurationProbe>,
}

impl OpenAiSynthesizer {
    pub fn new(
        api_base: String,
        api_key: String,
        timeout_secs: u64,
        probe: Arc<dyn DurationProbe>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base,
            api_key,
            probe,
        })
    }

    async fn synthesize_sentence(&self, request: &SpeechRequest, sentence: &str) -> AppResult<Vec<u8>> {
        let mut body = json!({
            "model": MODEL,
            "voice": request.voice_id,
            "input": sentence,
            "response_format": "mp3",
        });
        if let Some(instruction) = &request.instruction {
            body["instructions"] = json!(instruction);
        }

        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AppError::from)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "OpenAI speech returned {}: {}",
                status, detail
            )));
        }

        Ok(response.bytes().await.map_err(AppError::from)?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> AppResult<Vec<SynthesizedChunk>> {
        let sentences = split_sentences(&request.text);
        if sentences.is_empty() {
            return Err(AppError::Provider(
                "nothing to synthesize after normalization".to_string(),
            ));
        }

        let mut chunks = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            let audio = self.synthesize_sentence(request, &sentence).await?;
            let duration = self.probe.duration_secs(&audio)?;

            chunks.push(SynthesizedChunk {
                audio,
                sentences: vec![SentenceTiming {
                    text: sentence,
                    start: 0.0,
                    end: duration,
                }],
            });
        }

        debug!(
            voice = %request.voice_id,
            chunks = chunks.len(),
            "OpenAI synthesis complete"
        );

        Ok(chunks)
    }
}
