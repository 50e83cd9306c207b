use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{EmbeddingRequest, EmbeddingResponse};

/// The embedding capability (spec.md §6.2): `embed`/`embedBatch` collapse
/// into a single `embed(request)` call here since a batch is just a
/// multi-input request. Implementations are expected to be
/// deterministic-for-inputs, since the deduplicator's vector pre-filter
/// relies on re-embedding the same text producing comparable vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut res = self.embed(EmbeddingRequest::single(text)).await?;
        res.vectors.pop().ok_or_else(|| {
            ProviderError::InvalidResponse("embedding response had no vectors".to_string())
        })
    }
}
