//! Background model loading and the readiness gate
//!
//! State only moves forward: NotStarted -> Loading -> Ready | Failed.
//! The loading task walks an ordered candidate list (requested model first,
//! then fallbacks) and stops at the first model that loads.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::backend::{BackendLoader, GenerationBackend};
use super::conversation::PromptStrategy;

/// A backend that finished loading, with its prompt strategy fixed once
#[derive(Clone)]
pub struct LoadedModel {
    pub backend: Arc<dyn GenerationBackend>,
    pub strategy: PromptStrategy,
    pub requested_model: String,
    pub fallback_used: bool,
}

impl LoadedModel {
    pub fn new(backend: Arc<dyn GenerationBackend>, requested_model: &str) -> Self {
        let strategy = PromptStrategy::for_backend(backend.as_ref());
        let fallback_used = backend.model_name() != requested_model;
        Self {
            backend,
            strategy,
            requested_model: requested_model.to_string(),
            fallback_used,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model", &self.backend.model_name())
            .field("strategy", &self.strategy)
            .field("requested_model", &self.requested_model)
            .field("fallback_used", &self.fallback_used)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum LoadState {
    NotStarted,
    Loading,
    Ready(LoadedModel),
    Failed(String),
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Loading => "loading",
            Self::Ready(model) if model.fallback_used => "loaded_with_fallback",
            Self::Ready(_) => "loaded",
            Self::Failed(_) => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Failed(_))
    }
}

pub struct ReadinessGate {
    state: Arc<watch::Sender<LoadState>>,
    loader: Arc<dyn BackendLoader>,
    candidates: Vec<String>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReadinessGate {
    /// `candidates` is the ordered load list; the first entry is the requested model.
    pub fn new(loader: Arc<dyn BackendLoader>, candidates: Vec<String>) -> Self {
        let (state, _) = watch::channel(LoadState::NotStarted);
        Self {
            state: Arc::new(state),
            loader,
            candidates,
            task: Mutex::new(None),
        }
    }

    pub fn requested_model(&self) -> &str {
        self.candidates.first().map(String::as_str).unwrap_or_default()
    }

    /// Start loading in the background. Only the first call has any effect.
    pub fn start_loading(&self) -> bool {
        let mut started = false;
        self.state.send_if_modified(|state| {
            if matches!(state, LoadState::NotStarted) {
                *state = LoadState::Loading;
                started = true;
                true
            } else {
                false
            }
        });

        if !started {
            return false;
        }

        info!("Starting background model loading: {:?}", self.candidates);

        let state = self.state.clone();
        let loader = self.loader.clone();
        let candidates = self.candidates.clone();

        let handle = tokio::spawn(async move {
            let outcome = Self::load_with_fallback(loader.as_ref(), &candidates).await;
            state.send_replace(outcome);
        });
        *self.task.lock() = Some(handle);

        true
    }

    async fn load_with_fallback(loader: &dyn BackendLoader, candidates: &[String]) -> LoadState {
        let Some(requested) = candidates.first() else {
            return LoadState::Failed("No model configured".to_string());
        };

        let mut last_error = String::new();
        for candidate in candidates {
            if candidate != requested {
                info!("Trying fallback model: {}", candidate);
            }

            match loader.load(candidate).await {
                Ok(backend) => {
                    let loaded = LoadedModel::new(backend, requested);
                    if loaded.fallback_used {
                        warn!(
                            "Requested model {} unavailable, serving fallback {}",
                            requested,
                            loaded.model_name()
                        );
                    } else {
                        info!("Model {} loaded", loaded.model_name());
                    }
                    return LoadState::Ready(loaded);
                }
                Err(e) => {
                    warn!("Failed to load model {}: {:#}", candidate, e);
                    last_error = format!("{}: {:#}", candidate, e);
                }
            }
        }

        error!("All model candidates failed to load, last error: {}", last_error);
        LoadState::Failed(last_error)
    }

    pub fn status(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), LoadState::Ready(_))
    }

    /// The loaded model, if loading finished successfully.
    pub fn loaded(&self) -> Option<LoadedModel> {
        match &*self.state.borrow() {
            LoadState::Ready(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Whether the loading task has run to completion (diagnostics only).
    pub fn loader_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(false)
    }

    /// Wait until the model is ready. Returns `false` on timeout or if loading failed.
    /// Starts loading if nobody did yet.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        self.start_loading();

        let mut rx = self.state.subscribe();
        let finished = tokio::time::timeout(timeout, async {
            match rx.wait_for(LoadState::is_terminal).await {
                Ok(state) => matches!(*state, LoadState::Ready(_)),
                Err(_) => false,
            }
        })
        .await;

        finished.unwrap_or(false)
    }
}
