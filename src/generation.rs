//! # Text Generation Capability
//!
//! The language model is an opaque capability to the orchestration layer:
//! given the conversation so far and a persona, return that persona's next
//! utterance. [`UtteranceGenerator`] is the seam; the shipped
//! implementation talks to an OpenAI-compatible chat endpoint.

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ProvidersConfig;
use crate::error::{AppError, AppResult};
use crate::meeting::conversation::Character;
use crate::retry::NetworkRetryPolicy;

/// One prior conversation entry, as shown to the model.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub speaker: String,
    pub text: String,
}

/// Everything a generator needs for one turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub persona: Character,
    pub topic: String,
    pub language: String,
    pub history: Vec<HistoryEntry>,
    /// Turn-specific ask ("give your view", "invite X to speak", …)
    pub instruction: String,
    pub word_limit: u32,
    /// Per-meeting model override (development mode only)
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Opaque capability: history + persona in, utterance out.
#[async_trait]
pub trait UtteranceGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<String>;
}

impl From<OpenAIError> for AppError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => AppError::from(e),
            other => AppError::Provider(other.to_string()),
        }
    }
}

/// Generator backed by an OpenAI-compatible chat completion endpoint.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    default_model: String,
    retry: NetworkRetryPolicy,
}

impl OpenAiGenerator {
    pub fn new(providers: &ProvidersConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(providers.request_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {}", e)))?;

        let config = OpenAIConfig::new()
            .with_api_key(&providers.llm_api_key)
            .with_api_base(&providers.llm_api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            default_model: providers.llm_model.clone(),
            retry: NetworkRetryPolicy::default(),
        })
    }

    fn build_messages(request: &GenerationRequest) -> Vec<ChatCompletionRequestMessage> {
        let persona = &request.persona;
        let mut system_prompt = format!(
            "You are {}, a panelist in a live roundtable discussion about \"{}\". \
             Speak {} in character, in spoken prose, at most {} words.",
            persona.name, request.topic, request.language, request.word_limit
        );
        if let Some(instruction) = &persona.instruction {
            system_prompt.push(' ');
            system_prompt.push_str(instruction);
        }

        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: system_prompt.into(),
                name: None,
            },
        )];

        for entry in &request.history {
            messages.push(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: format!("[{} said]: {}", entry.speaker, entry.text).into(),
                    name: None,
                },
            ));
        }

        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: request.instruction.clone().into(),
                name: None,
            },
        ));

        messages
    }
}

#[async_trait]
impl UtteranceGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<String> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let temperature = request.temperature.or(request.persona.temperature);

        // Word limit to token budget, with headroom for multi-token words
        let max_tokens = (request.word_limit * 4).max(256);

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&model)
            .max_completion_tokens(max_tokens)
            .messages(Self::build_messages(request));
        if let Some(t) = temperature {
            args.temperature(t);
        }
        let chat_request = args.build().map_err(AppError::from)?;

        let response = self
            .retry
            .run("chat_completion", || async {
                self.client
                    .chat()
                    .create(chat_request.clone())
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let utterance = sanitize_utterance(&content);
        if utterance.is_empty() {
            return Err(AppError::Provider(format!(
                "model '{}' returned an empty utterance",
                model
            )));
        }

        Ok(utterance)
    }
}

static REASONING_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(thinking|think|reflection|reasoning|internal|scratchpad)[^>]*>.*?</(thinking|think|reflection|reasoning|internal|scratchpad)>")
        .unwrap()
});
static ORPHAN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[\w]+[^>]*>").unwrap());

/// Strip model reasoning blocks and stray XML-like tags from a response.
/// Markdown emphasis is deliberately left alone; display text keeps it and
/// the synthesis pipeline strips it on its own.
fn sanitize_utterance(response: &str) -> String {
    let without_blocks = REASONING_BLOCK.replace_all(response, "");
    let without_tags = ORPHAN_TAG.replace_all(&without_blocks, "");
    without_tags.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::VoiceProvider;

    fn request() -> GenerationRequest {
        GenerationRequest {
            persona: Character {
                id: "ada".into(),
                name: "Ada".into(),
                voice_id: "v1".into(),
                provider: VoiceProvider::ElevenLabs,
                locale: None,
                instruction: Some("Be contrarian.".into()),
                temperature: None,
            },
            topic: "open source AI".into(),
            language: "English".into(),
            history: vec![HistoryEntry {
                speaker: "Grace".into(),
                text: "I think it helps everyone.".into(),
            }],
            instruction: "Give your view.".into(),
            word_limit: 80,
            model: None,
            temperature: None,
        }
    }

    #[test]
    fn test_messages_carry_persona_and_history() {
        let messages = OpenAiGenerator::build_messages(&request());
        assert_eq!(messages.len(), 3);
        match &messages[0] {
            ChatCompletionRequestMessage::System(system) => {
                let content = format!("{:?}", system.content);
                assert!(content.contains("Ada"));
                assert!(content.contains("open source AI"));
                assert!(content.contains("Be contrarian."));
            }
            other => panic!("expected system message, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_strips_reasoning_blocks() {
        let input = "<thinking>weigh the options</thinking>Open models win.";
        assert_eq!(sanitize_utterance(input), "Open models win.");
    }

    #[test]
    fn test_sanitize_keeps_markdown() {
        let input = "I **strongly** disagree.";
        assert_eq!(sanitize_utterance(input), "I **strongly** disagree.");
    }

    #[test]
    fn test_sanitize_removes_orphan_tags() {
        let input = "Fine. </thinking> Moving on.";
        assert_eq!(sanitize_utterance(input), "Fine.  Moving on.");
    }
}
