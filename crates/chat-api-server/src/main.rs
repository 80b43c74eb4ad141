use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use chat_api_server::config::Settings;
use chat_api_server::server::{build_router, run_server};
use chat_api_server::services::{
    ConversationManager, LlamaServerLoader, LoadState, ReadinessGate, SessionStore,
};
use chat_api_server::state::AppState;
use chat_api_server::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let _log_guard = init_logger(&settings.logging)?;

    info!("🚀 Starting Chat API Server...");
    info!(
        "✅ Configuration loaded (model={}, backend={})",
        settings.model.name, settings.backend.base_url
    );

    let loader = Arc::new(LlamaServerLoader::new(&settings.backend)?);
    let gate = Arc::new(ReadinessGate::new(loader, settings.model.candidates()));

    let store = SessionStore::new(settings.chat.system_prompt.clone(), settings.chat.max_history_pairs);
    let manager = Arc::new(ConversationManager::new(
        store,
        gate.clone(),
        settings.chat.stream_chunk_size,
    ));

    // Load in the background; requests get 503 until the gate opens
    gate.start_loading();
    let watcher_gate = gate.clone();
    let timeout = settings.model.loading_timeout();
    tokio::spawn(async move {
        if watcher_gate.await_ready(timeout).await {
            info!("✅ Model ready: {}", watcher_gate.status().as_str());
            return;
        }
        match watcher_gate.status() {
            LoadState::Failed(e) => error!("❌ Model loading failed: {}", e),
            state => warn!(
                "Model not ready after {}s (state: {})",
                timeout.as_secs(),
                state.as_str()
            ),
        }
    });

    let server_config = settings.server.clone();
    let app = build_router(AppState::new(manager, settings));

    run_server(app, &server_config).await
}
