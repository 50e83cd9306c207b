pub mod config;
pub mod error;
pub mod factory;
pub mod providers;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::ProviderError;
pub use factory::build_llm_provider;
pub use providers::*;
pub use traits::LlmProvider;
pub use types::{ChatMessage, ChatRole, CompletionRequest, CompletionResponse};
