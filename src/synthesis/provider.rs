//! # Synthesis Provider Abstraction
//!
//! A speaker selects one of a fixed, small set of speech-synthesis
//! providers. Providers differ in two ways that matter to the pipeline:
//! whether their phoneme handling needs pronunciation substitution, and
//! whether they return caption timings themselves or force the pipeline
//! to reconstruct them from sentence-chunked requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::meeting::conversation::SentenceTiming;

/// The provider a speaker's voice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceProvider {
    ElevenLabs,
    OpenAi,
}

impl VoiceProvider {
    /// Providers whose phoneme handling mangles technical terms get the
    /// pronunciation substitution pass.
    pub fn is_phoneme_sensitive(&self) -> bool {
        matches!(self, VoiceProvider::ElevenLabs)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceProvider::ElevenLabs => "elevenlabs",
            VoiceProvider::OpenAi => "openai",
        }
    }
}

/// One synthesis request, already normalized (markup stripped, phonetic
/// substitutions applied) by the pipeline.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub language: Option<String>,
    /// Delivery hint for providers that accept one
    pub instruction: Option<String>,
}

/// One contiguous piece of synthesized audio with chunk-relative caption
/// timings. Providers returning a single track emit one chunk; providers
/// that synthesize sentence by sentence emit several, and the merge step
/// rebuilds the absolute offsets.
#[derive(Debug, Clone)]
pub struct SynthesizedChunk {
    pub audio: Vec<u8>,
    pub sentences: Vec<SentenceTiming>,
}

/// A speech-synthesis backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> AppResult<Vec<SynthesizedChunk>>;
}

/// Split prose into sentences for chunked synthesis and caption
/// reconstruction. Terminators stay attached to their sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split_inclusive(['.', '!', '?', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
