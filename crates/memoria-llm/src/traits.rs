use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{ChatMessage, CompletionRequest, CompletionResponse};

/// The LLM capability: plain-text or JSON-mode completion over a message list.
///
/// Implementations ask the upstream model for JSON when `json_mode` is set, but
/// callers must still parse the returned string defensively — no provider's
/// JSON mode is a schema guarantee.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    async fn complete_text(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let res = self.complete(CompletionRequest::new(messages)).await?;
        Ok(res.content)
    }
}
