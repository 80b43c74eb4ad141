pub mod backend;
pub mod conversation;
pub mod readiness;

pub use backend::{BackendLoader, GenerationBackend, LlamaServerLoader};
pub use conversation::{ConversationManager, SessionStore};
pub use readiness::{LoadState, ReadinessGate};
