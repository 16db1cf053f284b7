//! # ElevenLabs Synthesizer
//!
//! Calls the `with-timestamps` endpoint, which returns the full track plus
//! per-character alignment. Sentence caption timings are folded out of the
//! character alignment, so a single request yields one chunk with real
//! timings and the merge step has nothing to reconstruct.
//!
//! This provider is phoneme-sensitive: the pipeline applies pronunciation
//! substitution before the text arrives here.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::meeting::conversation::SentenceTiming;
use crate::synthesis::provider::{SpeechRequest, SpeechSynthesizer, SynthesizedChunk};

const API_BASE: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_multilingual_v2";

pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct WithTimestampsResponse {
    audio_base64: String,
    alignment: Option<Alignment>,
}

#[derive(Debug, Deserialize)]
struct Alignment {
    #[allow(dead_code)]
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: String, timeout_secs: u64) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> AppResult<Vec<SynthesizedChunk>> {
        let url = format!(
            "{}/text-to-speech/{}/with-timestamps",
            API_BASE, request.voice_id
        );

        let mut body = json!({
            "text": request.text,
            "model_id": MODEL_ID,
        });
        if let Some(language) = &request.language {
            body["language_code"] = json!(language);
        }

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AppError::from)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "ElevenLabs returned {}: {}",
                status, detail
            )));
        }

        let parsed: WithTimestampsResponse = response.json().await.map_err(AppError::from)?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&parsed.audio_base64)
            .map_err(|e| AppError::Provider(format!("undecodable ElevenLabs audio: {}", e)))?;

        let alignment = parsed.alignment.ok_or_else(|| {
            AppError::Provider("ElevenLabs response carried no alignment".to_string())
        })?;

        let sentences = sentences_from_alignment(
            &request.text,
            &alignment.character_start_times_seconds,
            &alignment.character_end_times_seconds,
        );

        debug!(
            voice = %request.voice_id,
            bytes = audio.len(),
            sentences = sentences.len(),
            "ElevenLabs synthesis complete"
        );

        Ok(vec![SynthesizedChunk { audio, sentences }])
    }
}

/// Fold per-character alignment into per-sentence timings. Character index
/// `i` of the synthesized text corresponds to alignment index `i`; indices
/// beyond the alignment arrays clamp to the last known time.
fn sentences_from_alignment(text: &str, starts: &[f64], ends: &[f64]) -> Vec<SentenceTiming> {
    let mut sentences = Vec::new();
    let mut buffer = String::new();
    let mut first_index = None;
    let mut last_index = 0usize;

    let time_at = |times: &[f64], index: usize| -> f64 {
        times
            .get(index)
            .or_else(|| times.last())
            .copied()
            .unwrap_or(0.0)
    };

    let mut flush =
        |buffer: &mut String, first_index: &mut Option<usize>, last_index: usize| {
            let sentence = buffer.trim().to_string();
            if !sentence.is_empty() {
                let first = first_index.unwrap_or(0);
                sentences.push(SentenceTiming {
                    text: sentence,
                    start: time_at(starts, first),
                    end: time_at(ends, last_index),
                });
            }
            buffer.clear();
            *first_index = None;
        };

    for (index, ch) in text.chars().enumerate() {
        if buffer.is_empty() && ch.is_whitespace() {
            continue;
        }
        if first_index.is_none() {
            first_index = Some(index);
        }
        buffer.push(ch);
        last_index = index;

        if matches!(ch, '.' | '!' | '?' | ';') {
            flush(&mut buffer, &mut first_index, last_index);
        }
    }
    flush(&mut buffer, &mut first_index, last_index);

    sentences
}
