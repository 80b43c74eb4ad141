use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "Qwen/Qwen1.5-0.5B-Chat";

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Você é um assistente útil, conciso e responde sempre em português claro.";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty or `["*"]` means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Model requested at startup.
    pub name: String,
    /// Tried in order when the requested model cannot be loaded.
    pub fallbacks: Vec<String>,
    pub loading_timeout_seconds: u64,
}

impl ModelConfig {
    /// Ordered load candidates: the requested model first, then unique fallbacks.
    pub fn candidates(&self) -> Vec<String> {
        let mut out = vec![self.name.clone()];
        for fallback in &self.fallbacks {
            if !out.contains(fallback) {
                out.push(fallback.clone());
            }
        }
        out
    }

    pub fn loading_timeout(&self) -> Duration {
        Duration::from_secs(self.loading_timeout_seconds)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            fallbacks: vec![
                "Qwen/Qwen1.5-0.5B-Chat".to_string(),
                "Qwen/Qwen1.5-1.8B-Chat".to_string(),
            ],
            loading_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the llama.cpp / OpenAI compatible inference server.
    pub base_url: String,
    pub api_key: Option<String>,
    pub connect_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub system_prompt: String,
    /// Max characters accepted in a single user message.
    pub max_message_length: usize,
    /// Exchange pairs (user + assistant) retained per session besides the system turn.
    pub max_history_pairs: usize,
    pub default_max_length: u32,
    pub default_temperature: f32,
    pub stream_chunk_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_message_length: 1000,
            max_history_pairs: 9,
            default_max_length: 1000,
            default_temperature: 0.7,
            stream_chunk_size: 50,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,chat_api_server=debug".to_string(),
            format: "pretty".to_string(),
            directory: "logs".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_sources(File::with_name("config/settings").required(false))
    }

    /// Layer `APP_<SECTION>__<KEY>` environment overrides on top of `file`.
    fn from_sources(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("model.fallbacks")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_contract() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.chat.max_message_length, 1000);
        assert_eq!(settings.chat.max_history_pairs, 9);
        assert_eq!(settings.chat.stream_chunk_size, 50);
        assert_eq!(settings.model.loading_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_candidates_put_requested_first_without_duplicates() {
        let model = ModelConfig {
            name: "Qwen/Qwen1.5-1.8B-Chat".to_string(),
            ..ModelConfig::default()
        };
        assert_eq!(
            model.candidates(),
            vec![
                "Qwen/Qwen1.5-1.8B-Chat".to_string(),
                "Qwen/Qwen1.5-0.5B-Chat".to_string(),
            ]
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::builder()
            .add_source(File::from_str(
                "[chat]\nmax_history_pairs = 4\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.chat.max_history_pairs, 4);
        assert_eq!(settings.chat.max_message_length, 1000);
        assert_eq!(settings.model.name, DEFAULT_MODEL);
    }

    #[test]
    fn test_env_overrides_use_single_underscore_after_prefix() {
        std::env::set_var("APP_CHAT__MAX_HISTORY_PAIRS", "4");
        std::env::set_var("APP_MODEL__FALLBACKS", "org/a,org/b");
        let settings = Settings::from_sources(File::with_name("no/such/settings").required(false));
        std::env::remove_var("APP_CHAT__MAX_HISTORY_PAIRS");
        std::env::remove_var("APP_MODEL__FALLBACKS");

        let settings = settings.unwrap();
        assert_eq!(settings.chat.max_history_pairs, 4);
        assert_eq!(settings.model.fallbacks, vec!["org/a".to_string(), "org/b".to_string()]);
        assert_eq!(settings.chat.max_message_length, 1000);
    }
}
