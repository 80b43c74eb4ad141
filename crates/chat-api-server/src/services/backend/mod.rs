//! Generation backend abstraction
//!
//! The conversation layer never talks to a model directly. It sees:
//! - `GenerationBackend`: stateless `generate(prompt, params) -> text`
//! - `BackendLoader`: turns a model identifier into a ready backend
//!
//! The llama.cpp server client is the production implementation.

pub mod llama_server;
pub mod template;

use anyhow::Result;
use std::sync::Arc;

pub use llama_server::{LlamaServerBackend, LlamaServerLoader};
pub use template::ChatTemplate;

/// Sampling parameters for a single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    /// Stochastic sampling; `false` means greedy decoding.
    pub do_sample: bool,
}

impl GenerationParams {
    /// Hard ceiling on generated tokens, whatever the caller asked for.
    pub const MAX_NEW_TOKENS_CEILING: u32 = 384;

    /// Chat sampling profile: nucleus sampling with a mild repetition penalty.
    pub fn chat(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_new_tokens: max_tokens.min(Self::MAX_NEW_TOKENS_CEILING),
            temperature,
            top_p: 0.9,
            top_k: 50,
            repetition_penalty: 1.12,
            do_sample: true,
        }
    }
}

/// Text-completion capability of a loaded model
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Identifier of the model actually serving requests.
    fn model_name(&self) -> &str;

    /// Structured chat-template capability, if the model ships one.
    fn chat_template(&self) -> Option<&ChatTemplate>;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Resolves a model identifier into a ready backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, model: &str) -> Result<Arc<dyn GenerationBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_params_cap_token_budget() {
        assert_eq!(GenerationParams::chat(300, 0.7).max_new_tokens, 300);
        assert_eq!(GenerationParams::chat(1000, 0.7).max_new_tokens, 384);
        assert_eq!(GenerationParams::chat(384, 0.7).max_new_tokens, 384);
    }

    #[test]
    fn test_chat_params_sampling_profile() {
        let params = GenerationParams::chat(100, 1.3);
        assert_eq!(params.temperature, 1.3);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.top_k, 50);
        assert_eq!(params.repetition_penalty, 1.12);
        assert!(params.do_sample);
    }
}
