pub mod settings;

pub use settings::{BackendConfig, ChatConfig, LoggingConfig, ModelConfig, ServerConfig, Settings};
