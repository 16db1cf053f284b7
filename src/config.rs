//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - `config.toml` in the working directory (optional)
//! - Environment variables with the `APP_` prefix
//! - `HOST`/`PORT` deployment-platform overrides
//!
//! The `mode` switch decides how much a client may influence a meeting:
//! in `production` the generation options carried on `start_conversation`
//! are discarded; in `development` they are honored.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// How the server treats client-supplied tuning options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Client-supplied generation options are honored
    Development,
    /// Client-supplied generation options are stripped
    Production,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub meeting: MeetingConfig,
    pub providers: ProvidersConfig,
    pub database: DatabaseConfig,
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: RuntimeMode,
    /// Key handed to clients on `request_clientkey`. Empty disables it.
    pub client_key: String,
}

/// Per-meeting tunables snapshotted into `MeetingOptions` at creation.
/// Changing these at runtime never affects an in-flight meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingConfig {
    /// Persona turns after which wrap-up is forced
    pub max_turns: u32,
    /// Upper bound on words requested per persona utterance
    pub utterance_word_limit: u32,
    /// Upper bound on words requested for the closing summary
    pub summary_word_limit: u32,
    /// Synthesis tasks allowed in flight at once (process-wide)
    pub audio_concurrency: usize,
    /// Whether a completed meeting may be re-opened with `continue_conversation`
    pub allow_extension: bool,
}

/// Document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub name: String,
}

/// External provider endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// OpenAI-compatible chat completion endpoint
    pub llm_api_base: String,
    pub llm_api_key: String,
    pub llm_model: String,
    /// ElevenLabs speech synthesis
    pub elevenlabs_api_key: String,
    /// OpenAI speech synthesis
    pub openai_tts_api_key: String,
    /// Request timeout for provider calls, seconds
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                mode: RuntimeMode::Development,
                client_key: String::new(),
            },
            meeting: MeetingConfig {
                max_turns: 20,
                utterance_word_limit: 80,
                summary_word_limit: 150,
                audio_concurrency: 3,
                allow_extension: true,
            },
            providers: ProvidersConfig {
                llm_api_base: "https://api.openai.com/v1".to_string(),
                llm_api_key: String::new(),
                llm_model: "gpt-4o-mini".to_string(),
                elevenlabs_api_key: String::new(),
                openai_tts_api_key: String::new(),
                request_timeout_secs: 120,
            },
            database: DatabaseConfig {
                uri: "mongodb://127.0.0.1:27017".to_string(),
                name: "roundtable".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration in priority order: defaults, then `config.toml`,
    /// then `APP_*` environment variables, then `HOST`/`PORT` overrides.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a working server.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.meeting.max_turns == 0 {
            return Err(anyhow::anyhow!("Meeting max_turns must be greater than 0"));
        }

        if self.meeting.audio_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "Audio concurrency ceiling must be greater than 0"
            ));
        }

        if self.providers.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "Provider request timeout must be greater than 0"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.mode, RuntimeMode::Development);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.meeting.audio_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_parsing() {
        let mode: RuntimeMode = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(mode, RuntimeMode::Production);
    }
}
