use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BackendLoader, ChatTemplate, GenerationBackend, GenerationParams};
use crate::config::BackendConfig;

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub n_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ServerProps {
    #[serde(default)]
    chat_template: Option<String>,
    #[serde(default)]
    bos_token: Option<String>,
    #[serde(default)]
    eos_token: Option<String>,
}

/// Shared HTTP plumbing for the loader and the backends it produces
#[derive(Clone)]
struct LlamaServerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlamaServerClient {
    fn new(config: &BackendConfig) -> Result<Self> {
        // No overall request timeout: generation may legitimately take long.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to call {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("llama-server error on {}: {} - {}", path, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }
}

/// Loads models served by a llama.cpp (or OpenAI compatible) inference server
#[derive(Clone)]
pub struct LlamaServerLoader {
    http: LlamaServerClient,
}

impl LlamaServerLoader {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            http: LlamaServerClient::new(config)?,
        })
    }
}

#[async_trait::async_trait]
impl BackendLoader for LlamaServerLoader {
    async fn load(&self, model: &str) -> Result<Arc<dyn GenerationBackend>> {
        let models: ModelList = self.http.get_json("/v1/models").await?;
        if !models.data.iter().any(|m| m.id == model) {
            let served: Vec<&str> = models.data.iter().map(|m| m.id.as_str()).collect();
            return Err(anyhow!(
                "Model '{}' is not served by {} (available: {:?})",
                model,
                self.http.base_url,
                served
            ));
        }

        // Older servers have no /props; treat that as "no chat template".
        let props: ServerProps = match self.http.get_json("/props").await {
            Ok(props) => props,
            Err(e) => {
                debug!("No server props for {}: {:#}", model, e);
                ServerProps::default()
            }
        };

        let template = match props.chat_template.filter(|t| !t.trim().is_empty()) {
            Some(source) => match ChatTemplate::new(source, props.bos_token, props.eos_token) {
                Ok(template) => Some(template),
                Err(e) => {
                    warn!("Chat template of {} is unusable, using plain prompts: {:#}", model, e);
                    None
                }
            },
            None => None,
        };

        info!(
            "Model {} available at {} (chat template: {})",
            model,
            self.http.base_url,
            template.is_some()
        );

        Ok(Arc::new(LlamaServerBackend {
            http: self.http.clone(),
            model: model.to_string(),
            template,
        }))
    }
}

/// Generation backend backed by the llama-server `/completion` endpoint
pub struct LlamaServerBackend {
    http: LlamaServerClient,
    model: String,
    template: Option<ChatTemplate>,
}

#[async_trait::async_trait]
impl GenerationBackend for LlamaServerBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn chat_template(&self) -> Option<&ChatTemplate> {
        self.template.as_ref()
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        debug!(
            "Generating with {} (prompt_len={}, n_predict={})",
            self.model,
            prompt.len(),
            params.max_new_tokens
        );

        let request = CompletionRequest {
            model: &self.model,
            prompt,
            n_predict: params.max_new_tokens,
            temperature: if params.do_sample { params.temperature } else { 0.0 },
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repetition_penalty,
            stream: false,
        };

        let url = format!("{}/completion", self.http.base_url);
        let response = self
            .http
            .request(self.http.client.post(&url))
            .json(&request)
            .send()
            .await
            .context("Failed to call llama-server completion API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("llama-server completion error: {} - {}", status, body);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        Ok(completion.content)
    }
}
