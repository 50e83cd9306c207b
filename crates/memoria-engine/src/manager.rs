//! The Manager (spec.md §4.8): the public façade over ingestion, retrieval,
//! manual store, update, forget, list, stats, export/import and re-embed.
//! Every field here is `Arc`'d so a single `Manager` instance is `Send +
//! Sync` and may be shared across an async runtime's tasks (spec.md §5);
//! the write serialiser inside `memoria_storage` is the only interior
//! mutability boundary.

use std::collections::HashMap;
use std::sync::Arc;

use memoria_core::{
    now_ms, AbstractionLevel, Memory, MemoryCategory, MemoryDelta, MemoriaConfig, MemoriaError,
    MemoryStats, NewMemory, Scope,
};
use memoria_embed::EmbeddingProvider;
use memoria_llm::LlmProvider;
use memoria_rerank::RerankProvider;
use memoria_storage::{ListFilter, OrderBy, OrderDir, StorageBackend, WriteSerializer};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dedup::{DedupDecision, Deduplicator};
use crate::extractor::{trailing_context, ExtractedMemory, Extractor, Turn};
use crate::retriever::{self, RetrievalOptions, RetrievalResult, Retriever};

/// The capability handles a `Manager` is built from. Constructing concrete
/// providers from `MemoriaConfig`'s string fields (selecting an embedding
/// provider by name, etc.) is the out-of-scope config-reader/CLI's job
/// (spec.md §1); the Manager only ever depends on the capability traits,
/// per spec.md §6.2.
pub struct ManagerDeps {
    pub storage: Arc<dyn StorageBackend>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub rerank: Option<Arc<dyn RerankProvider>>,
}

pub struct Manager {
    config: MemoriaConfig,
    storage: Arc<WriteSerializer>,
    embedding: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    extractor: Extractor,
    dedup: Deduplicator,
}

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub scope: Option<Scope>,
    pub skip_extraction: bool,
    pub importance: Option<f32>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    pub scope: Option<Scope>,
    pub categories: Vec<MemoryCategory>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct BuildContextOptions {
    pub recall: RecallOptions,
    pub level: AbstractionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    pub version: String,
    pub exported_at: i64,
    pub memories: Vec<Memory>,
    pub stats: MemoryStats,
}

impl Manager {
    /// Opens a `Manager` over an already-validated config and an
    /// already-constructed set of capability handles.
    pub fn open(config: MemoriaConfig, deps: ManagerDeps) -> Self {
        let storage = Arc::new(WriteSerializer::new(deps.storage));
        let retriever = Retriever::new(
            Arc::clone(&storage),
            Arc::clone(&deps.embedding),
            deps.rerank,
        );
        let extractor = Extractor::new(Arc::clone(&deps.llm));
        let dedup = Deduplicator::new(Arc::clone(&storage), deps.llm);
        Self {
            config,
            storage,
            embedding: deps.embedding,
            retriever,
            extractor,
            dedup,
        }
    }

    fn default_scope(&self) -> Result<Scope, MemoriaError> {
        Scope::parse(&self.config.default_scope)
    }

    fn resolve_scope(&self, scope: Option<Scope>) -> Result<Scope, MemoriaError> {
        match scope {
            Some(s) => Ok(s),
            None => self.default_scope(),
        }
    }

    /// Runs the per-turn extraction → dedup → apply pipeline and returns
    /// every memory that was created or updated as a result.
    pub async fn process_turn(
        &self,
        user_message: &str,
        assistant_response: &str,
        scope: Option<Scope>,
        existing_context: Option<&str>,
    ) -> Result<Vec<Memory>, MemoriaError> {
        if !self.config.capture.auto {
            return Ok(Vec::new());
        }
        let scope = self.resolve_scope(scope)?;
        let turn = Turn {
            user_message: user_message.to_string(),
            assistant_response: assistant_response.to_string(),
        };
        let candidates = self
            .extractor
            .extract_from_turn(&turn, &self.config.capture, existing_context)
            .await;
        self.apply_candidates(candidates, &scope).await
    }

    /// Runs extraction over an entire session history (no per-turn noise
    /// gate applies) and applies the resulting candidates.
    pub async fn process_session(
        &self,
        history: &[(String, String)],
        scope: Option<Scope>,
    ) -> Result<Vec<Memory>, MemoriaError> {
        if !self.config.capture.auto || !self.config.capture.session_summary {
            return Ok(Vec::new());
        }
        let scope = self.resolve_scope(scope)?;
        let turns: Vec<Turn> = history
            .iter()
            .map(|(u, a)| Turn {
                user_message: u.clone(),
                assistant_response: a.clone(),
            })
            .collect();
        let candidates = self.extractor.extract_from_session(&turns).await;
        self.apply_candidates(candidates, &scope).await
    }

    /// Builds the "existing context" block of the last six turns for a
    /// per-turn extraction call, per spec.md §4.6.
    pub fn trailing_context(history: &[(String, String)]) -> String {
        let turns: Vec<Turn> = history
            .iter()
            .map(|(u, a)| Turn {
                user_message: u.clone(),
                assistant_response: a.clone(),
            })
            .collect();
        trailing_context(&turns, 6)
    }

    async fn apply_candidates(
        &self,
        candidates: Vec<ExtractedMemory>,
        scope: &Scope,
    ) -> Result<Vec<Memory>, MemoriaError> {
        let mut applied = Vec::new();
        for candidate in candidates {
            let text = format!(
                "{}\n{}\n{}",
                candidate.headline, candidate.summary, candidate.content
            );
            let vector = match self.embedding.embed_one(&text).await {
                Ok(v) => v,
                Err(err) => {
                    debug!(error = %err, "embedding failed for candidate, skipping");
                    continue;
                }
            };

            let decision = self
                .dedup
                .decide(&candidate, &vector, scope, &self.config.deduplication)
                .await;

            match decision {
                DedupDecision::Skip => {}
                DedupDecision::Create => {
                    let row = NewMemory {
                        headline: candidate.headline,
                        summary: candidate.summary,
                        content: candidate.content,
                        category: candidate.category,
                        scope: scope.clone(),
                        importance: candidate.importance,
                        tags: candidate.tags,
                        metadata: candidate.metadata,
                        vector,
                    };
                    match self.storage.insert(row).await {
                        Ok(memory) => applied.push(memory),
                        Err(err) => warn!(error = %err, "insert failed for candidate"),
                    }
                }
                DedupDecision::Merge { target_id, merged } => {
                    let merged_text =
                        format!("{}\n{}\n{}", merged.headline, merged.summary, merged.content);
                    let merged_vector = match self.embedding.embed_one(&merged_text).await {
                        Ok(v) => v,
                        Err(err) => {
                            debug!(error = %err, "re-embed failed for merge, skipping");
                            continue;
                        }
                    };
                    let delta = MemoryDelta {
                        headline: Some(merged.headline),
                        summary: Some(merged.summary),
                        content: Some(merged.content),
                        importance: None,
                        tags: Some(merged.tags),
                        metadata: None,
                        vector: Some(merged_vector),
                    };
                    match self.storage.update(&target_id, &delta).await {
                        Ok(Some(memory)) => applied.push(memory),
                        Ok(None) => warn!(memory_id = %target_id, "merge target vanished"),
                        Err(err) => warn!(error = %err, "merge update failed"),
                    }
                }
            }
        }
        Ok(applied)
    }

    /// Either runs the LLM extractor (overriding `category` on every
    /// extracted record) or, with `skip_extraction`, inserts a single
    /// record whose headline/summary/content are truncated from `content`
    /// directly (spec.md §4.8).
    pub async fn store(
        &self,
        content: &str,
        category: MemoryCategory,
        opts: StoreOptions,
    ) -> Result<Vec<Memory>, MemoriaError> {
        let scope = self.resolve_scope(opts.scope)?;

        if opts.skip_extraction {
            let vector = self
                .embedding
                .embed_one(content)
                .await
                .map_err(|e| MemoriaError::capability("embedding", e.to_string()))?;
            let row = NewMemory {
                headline: truncate_chars(content, 100),
                summary: truncate_chars(content, 300),
                content: content.to_string(),
                category,
                scope,
                importance: opts.importance.unwrap_or(0.5).clamp(0.0, 1.0),
                tags: opts.tags,
                metadata: HashMap::new(),
                vector,
            };
            let memory = self.storage.insert(row).await.map_err(store_error)?;
            return Ok(vec![memory]);
        }

        let mut candidates = self.extractor.extract_from_text(content).await;
        for candidate in &mut candidates {
            candidate.category = category;
        }
        self.apply_candidates(candidates, &scope).await
    }

    pub async fn recall(&self, query: &str, opts: RecallOptions) -> Result<RetrievalResult, MemoriaError> {
        let scope = match opts.scope {
            Some(s) => Some(s),
            None => Some(self.default_scope()?),
        };
        let retrieval_opts = RetrievalOptions {
            scope,
            categories: opts.categories,
            limit: opts.limit.unwrap_or(self.config.retrieval.limit),
            min_score: opts.min_score.unwrap_or(self.config.retrieval.min_score),
            hybrid: self.config.retrieval.hybrid,
            candidate_multiplier: self.config.retrieval.candidate_multiplier,
            noise_filter: self.config.capture.noise_filter,
        };
        self.retriever
            .recall(query, &self.config.scoring, &retrieval_opts, now_ms())
            .await
    }

    pub async fn build_context(
        &self,
        query: &str,
        opts: BuildContextOptions,
    ) -> Result<String, MemoriaError> {
        let result = self.recall(query, opts.recall).await?;
        Ok(retriever::build_context(&result.memories, opts.level))
    }

    pub async fn forget(&self, id: &str) -> Result<bool, MemoriaError> {
        self.storage.delete(id).await.map_err(store_error)
    }

    pub async fn forget_many(&self, ids: &[String]) -> Result<usize, MemoriaError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.storage.delete_many(ids).await.map_err(store_error)
    }

    pub async fn forget_by_scope(&self, scope: &Scope) -> Result<usize, MemoriaError> {
        self.storage.delete_by_scope(scope).await.map_err(store_error)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Memory>, MemoriaError> {
        self.storage
            .backend()
            .get_by_id(id)
            .await
            .map_err(store_error)
    }

    /// Re-embeds iff `delta` touches `headline`/`summary`/`content`, from
    /// the post-merge concatenation of the updated fields.
    pub async fn update(&self, id: &str, mut delta: MemoryDelta) -> Result<Option<Memory>, MemoriaError> {
        if delta.touches_text() {
            let Some(current) = self.get_by_id(id).await? else {
                return Ok(None);
            };
            let projected = current.apply_delta(&delta, now_ms());
            let vector = self
                .embedding
                .embed_one(&projected.embeddable_text())
                .await
                .map_err(|e| MemoriaError::capability("embedding", e.to_string()))?;
            delta.vector = Some(vector);
        }
        self.storage.update(id, &delta).await.map_err(store_error)
    }

    pub async fn list(
        &self,
        filter: ListFilter,
        order_by: OrderBy,
        order_dir: OrderDir,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, MemoriaError> {
        self.storage
            .backend()
            .list(&filter, order_by, order_dir, limit, offset)
            .await
            .map_err(store_error)
    }

    pub async fn get_stats(&self) -> Result<MemoryStats, MemoriaError> {
        self.storage.backend().get_stats().await.map_err(store_error)
    }

    pub async fn export(&self, scope: Option<Scope>) -> Result<ExportPayload, MemoriaError> {
        let filter = ListFilter {
            scope,
            categories: Vec::new(),
        };
        let memories = self
            .storage
            .backend()
            .list(&filter, OrderBy::CreatedAt, OrderDir::Asc, usize::MAX, 0)
            .await
            .map_err(store_error)?;
        let stats = self.get_stats().await?;
        Ok(ExportPayload {
            version: "1.0.0".to_string(),
            exported_at: now_ms(),
            memories,
            stats,
        })
    }

    /// Inserts each memory afresh, assigning a new id, re-embedding, and
    /// overriding scope if requested. Failures are logged and skipped —
    /// import never aborts partway.
    pub async fn import(
        &self,
        payload: &ExportPayload,
        override_scope: Option<Scope>,
    ) -> Result<Vec<Memory>, MemoriaError> {
        let mut imported = Vec::new();
        for memory in &payload.memories {
            let scope = override_scope.clone().unwrap_or_else(|| memory.scope.clone());
            let vector = match self.embedding.embed_one(&memory.embeddable_text()).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(memory_id = %memory.id, error = %err, "import re-embed failed, skipping");
                    continue;
                }
            };
            let row = NewMemory {
                headline: memory.headline.clone(),
                summary: memory.summary.clone(),
                content: memory.content.clone(),
                category: memory.category,
                scope,
                importance: memory.importance,
                tags: memory.tags.clone(),
                metadata: memory.metadata.clone(),
                vector,
            };
            match self.storage.insert(row).await {
                Ok(inserted) => imported.push(inserted),
                Err(err) => warn!(memory_id = %memory.id, error = %err, "import insert failed, skipping"),
            }
        }
        Ok(imported)
    }

    /// Recomputes the vector for every memory in `scope` and writes it
    /// back as a vector-only update. Per-memory errors are swallowed; the
    /// count of successfully re-embedded memories is returned.
    pub async fn reembed(&self, scope: Option<Scope>) -> Result<usize, MemoriaError> {
        let filter = ListFilter {
            scope,
            categories: Vec::new(),
        };
        let memories = self
            .storage
            .backend()
            .list(&filter, OrderBy::CreatedAt, OrderDir::Asc, usize::MAX, 0)
            .await
            .map_err(store_error)?;

        let mut count = 0;
        for memory in memories {
            let vector = match self.embedding.embed_one(&memory.embeddable_text()).await {
                Ok(v) => v,
                Err(err) => {
                    debug!(memory_id = %memory.id, error = %err, "reembed failed, skipping");
                    continue;
                }
            };
            let delta = MemoryDelta {
                vector: Some(vector),
                ..Default::default()
            };
            match self.storage.update(&memory.id, &delta).await {
                Ok(Some(_)) => count += 1,
                Ok(None) => {}
                Err(err) => debug!(memory_id = %memory.id, error = %err, "reembed update failed"),
            }
        }
        Ok(count)
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn store_error(err: memoria_storage::StorageError) -> MemoriaError {
    match err {
        memoria_storage::StorageError::InvalidInput(msg) => MemoriaError::InvalidArgument(msg),
        other => MemoriaError::StoreFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_char_boundaries_not_bytes() {
        let s = "héllo wörld";
        let truncated = truncate_chars(s, 5);
        assert_eq!(truncated.chars().count(), 5);
    }

    #[test]
    fn truncate_chars_shorter_than_limit_is_unchanged() {
        assert_eq!(truncate_chars("hi", 100), "hi");
    }
}
