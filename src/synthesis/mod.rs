//! # Speech Synthesis Providers
//!
//! The fixed provider set a speaker's voice can point at, behind one
//! trait. ElevenLabs returns timed captions with the track; OpenAI audio
//! is sentence-chunked and timed by probing.

pub mod elevenlabs;
pub mod openai;
pub mod provider;

pub use provider::{
    split_sentences, SpeechRequest, SpeechSynthesizer, SynthesizedChunk, VoiceProvider,
};

use std::sync::Arc;

/// One synthesizer per provider, resolved by a speaker's selector.
pub struct SynthesizerRegistry {
    elevenlabs: Arc<dyn SpeechSynthesizer>,
    openai: Arc<dyn SpeechSynthesizer>,
}

impl SynthesizerRegistry {
    pub fn new(
        elevenlabs: Arc<dyn SpeechSynthesizer>,
        openai: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self { elevenlabs, openai }
    }

    pub fn get(&self, provider: VoiceProvider) -> Arc<dyn SpeechSynthesizer> {
        match provider {
            VoiceProvider::ElevenLabs => self.elevenlabs.clone(),
            VoiceProvider::OpenAi => self.openai.clone(),
        }
    }
}
