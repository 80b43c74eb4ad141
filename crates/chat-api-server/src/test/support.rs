//! Shared fixtures for unit and router tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::services::backend::{BackendLoader, ChatTemplate, GenerationBackend, GenerationParams};
use crate::services::conversation::{ConversationManager, SessionStore};
use crate::services::readiness::ReadinessGate;
use crate::state::AppState;

pub const SYSTEM_PROMPT: &str = "You are a test assistant.";

const CHATML: &str = "{% for message in messages %}\
{{ '<|im_start|>' + message['role'] + '\\n' + message['content'] + '<|im_end|>' + '\\n' }}\
{% endfor %}\
{% if add_generation_prompt %}{{ '<|im_start|>assistant\\n' }}{% endif %}";

pub fn chatml_template() -> ChatTemplate {
    ChatTemplate::new(CHATML, None, Some("<|im_end|>".to_string())).expect("ChatML template compiles")
}

/// Scripted backend that records what it was asked
pub struct StubBackend {
    model: String,
    template: Option<ChatTemplate>,
    reply: String,
    fail: bool,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_params: Mutex<Option<GenerationParams>>,
    hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl StubBackend {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            template: None,
            reply: "Olá!".to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_params: Mutex::new(None),
            hook: Mutex::new(None),
        }
    }

    pub fn templated(model: &str) -> Self {
        Self {
            template: Some(chatml_template()),
            ..Self::new(model)
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Run `hook` inside every `generate` call, before replying
    pub fn on_generate(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }

    pub fn last_params(&self) -> Option<GenerationParams> {
        self.last_params.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn chat_template(&self) -> Option<&ChatTemplate> {
        self.template.as_ref()
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        *self.last_params.lock() = Some(params.clone());
        if let Some(hook) = self.hook.lock().as_ref() {
            hook();
        }

        if self.fail {
            return Err(anyhow!("backend exploded"));
        }
        Ok(self.reply.clone())
    }
}

/// Always hands out the same backend
pub struct StaticLoader(pub Arc<StubBackend>);

#[async_trait]
impl BackendLoader for StaticLoader {
    async fn load(&self, _model: &str) -> Result<Arc<dyn GenerationBackend>> {
        Ok(self.0.clone() as Arc<dyn GenerationBackend>)
    }
}

/// Never finishes within a test's patience
pub struct SlowLoader {
    delay: Duration,
}

impl SlowLoader {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl BackendLoader for SlowLoader {
    async fn load(&self, model: &str) -> Result<Arc<dyn GenerationBackend>> {
        tokio::time::sleep(self.delay).await;
        Ok(Arc::new(StubBackend::new(model)) as Arc<dyn GenerationBackend>)
    }
}

/// A gate that has already loaded `backend`
pub async fn ready_gate(backend: Arc<StubBackend>) -> Arc<ReadinessGate> {
    let model = backend.model_name().to_string();
    let gate = Arc::new(ReadinessGate::new(Arc::new(StaticLoader(backend)), vec![model]));
    assert!(gate.await_ready(Duration::from_secs(5)).await);
    gate
}

pub async fn ready_manager(backend: Arc<StubBackend>, max_pairs: usize) -> ConversationManager {
    let gate = ready_gate(backend).await;
    ConversationManager::new(SessionStore::new(SYSTEM_PROMPT, max_pairs), gate, 50)
}

pub fn app_state(gate: Arc<ReadinessGate>) -> AppState {
    let mut settings = Settings::default();
    settings.chat.system_prompt = SYSTEM_PROMPT.to_string();

    let store = SessionStore::new(SYSTEM_PROMPT, settings.chat.max_history_pairs);
    let manager = Arc::new(ConversationManager::new(
        store,
        gate,
        settings.chat.stream_chunk_size,
    ));
    AppState::new(manager, settings)
}
