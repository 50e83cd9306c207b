use std::sync::Arc;

use crate::config::LlmProviderConfig;
use crate::error::ProviderError;
use crate::providers::OpenAiCompatibleLlmProvider;
use crate::traits::LlmProvider;

pub fn build_llm_provider(cfg: LlmProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    match cfg {
        LlmProviderConfig::OpenAiCompatible(c) => Ok(Arc::new(OpenAiCompatibleLlmProvider::new(c)?)),
    }
}
