use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use memoria_core::{now_ms, validate_id, Memory, MemoryCategory, MemoryStats, NewMemory, Scope};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::backend::{ListFilter, LexicalHit, OrderBy, OrderDir, StorageBackend, VectorHit};
use crate::error::StorageError;
use crate::lexical::{bm25_like, cosine_similarity, tokenize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Persisted {
    memories: Vec<Memory>,
}

struct State {
    memories: Vec<Memory>,
}

/// A single-file JSON-backed `StorageBackend`. This is memoria's default:
/// no external engine dependency, adequate for development, tests and
/// small deployments. The `lancedb-backend` feature swaps in
/// [`crate::lancedb_backend::LanceDbBackend`] for production-scale ANN and
/// full-text indices; both implement the same trait so callers never
/// branch on which one is in use.
pub struct LocalJsonBackend {
    path: PathBuf,
    state: RwLock<State>,
}

impl LocalJsonBackend {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if !tokio::fs::try_exists(&path).await? {
            let persisted = Persisted::default();
            let bytes = serde_json::to_vec_pretty(&persisted)?;
            tokio::fs::write(&path, bytes).await?;
        }

        let bytes = tokio::fs::read(&path).await?;
        let persisted: Persisted = serde_json::from_slice(&bytes)?;

        Ok(Self {
            path,
            state: RwLock::new(State {
                memories: persisted.memories,
            }),
        })
    }

    async fn persist(&self, memories: &[Memory]) -> Result<(), StorageError> {
        let persisted = Persisted {
            memories: memories.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    fn matches(memory: &Memory, scope: Option<&Scope>, categories: &[MemoryCategory]) -> bool {
        if let Some(scope) = scope {
            if &memory.scope != scope {
                return false;
            }
        }
        if !categories.is_empty() && !categories.contains(&memory.category) {
            return false;
        }
        true
    }
}

#[async_trait]
impl StorageBackend for LocalJsonBackend {
    async fn insert(&self, row: NewMemory) -> Result<Memory, StorageError> {
        if row.headline.trim().is_empty() && row.summary.trim().is_empty() {
            return Err(StorageError::InvalidInput(
                "headline and summary cannot both be empty".to_string(),
            ));
        }

        let now = now_ms();
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            headline: row.headline,
            summary: row.summary,
            content: row.content,
            category: row.category,
            scope: row.scope,
            importance: row.importance.clamp(0.0, 1.0),
            tags: row.tags,
            metadata: row.metadata,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            vector: Some(row.vector),
        };

        let mut state = self.state.write().await;
        state.memories.push(memory.clone());
        self.persist(&state.memories).await?;
        Ok(memory)
    }

    async fn reinsert(&self, row: Memory) -> Result<Memory, StorageError> {
        let mut state = self.state.write().await;
        state.memories.push(row.clone());
        self.persist(&state.memories).await?;
        Ok(row)
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        validate_id(id)?;
        let mut state = self.state.write().await;
        let before = state.memories.len();
        state.memories.retain(|m| m.id != id);
        let changed = state.memories.len() != before;
        if changed {
            self.persist(&state.memories).await?;
        }
        Ok(changed)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, StorageError> {
        for id in ids {
            validate_id(id)?;
        }
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut state = self.state.write().await;
        let before = state.memories.len();
        state.memories.retain(|m| !wanted.contains(m.id.as_str()));
        let removed = before - state.memories.len();
        if removed > 0 {
            self.persist(&state.memories).await?;
        }
        Ok(removed)
    }

    async fn delete_by_scope(&self, scope: &Scope) -> Result<usize, StorageError> {
        let mut state = self.state.write().await;
        let before = state.memories.len();
        state.memories.retain(|m| &m.scope != scope);
        let removed = before - state.memories.len();
        if removed > 0 {
            self.persist(&state.memories).await?;
        }
        Ok(removed)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Memory>, StorageError> {
        validate_id(id)?;
        let state = self.state.read().await;
        Ok(state.memories.iter().find(|m| m.id == id).cloned())
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: Option<&Scope>,
        categories: &[MemoryCategory],
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>, StorageError> {
        let state = self.state.read().await;
        let mut hits: Vec<VectorHit> = state
            .memories
            .iter()
            .filter(|m| Self::matches(m, scope, categories))
            .filter_map(|m| {
                let mv = m.vector.as_deref()?;
                let similarity = cosine_similarity(vector, mv)?;
                let distance = 1.0 - similarity;
                let score = 1.0 - distance;
                if min_score.is_some_and(|min| score < min) {
                    return None;
                }
                Some(VectorHit {
                    memory: m.clone(),
                    distance,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit.max(1));
        Ok(hits)
    }

    async fn full_text_search(
        &self,
        query: &str,
        limit: usize,
        scope: Option<&Scope>,
        categories: &[MemoryCategory],
    ) -> Result<Vec<LexicalHit>, StorageError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut hits: Vec<LexicalHit> = state
            .memories
            .iter()
            .filter(|m| Self::matches(m, scope, categories))
            .filter_map(|m| {
                let haystack = format!(
                    "{} {} {} {}",
                    m.headline.to_lowercase(),
                    m.summary.to_lowercase(),
                    m.content.to_lowercase(),
                    m.tags.join(" ").to_lowercase()
                );
                let doc_len = (haystack.len() as f32 / 5.0).max(1.0);
                let score = bm25_like(&haystack, doc_len, &terms);
                if score <= 0.0 {
                    return None;
                }
                Some(LexicalHit {
                    memory: m.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit.max(1));
        Ok(hits)
    }

    async fn list(
        &self,
        filter: &ListFilter,
        order_by: OrderBy,
        order_dir: OrderDir,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, StorageError> {
        let state = self.state.read().await;
        let mut rows: Vec<Memory> = state
            .memories
            .iter()
            .filter(|m| Self::matches(m, filter.scope.as_ref(), &filter.categories))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let key = |m: &Memory| match order_by {
                OrderBy::CreatedAt => m.created_at as f64,
                OrderBy::UpdatedAt => m.updated_at as f64,
                OrderBy::LastAccessedAt => m.last_accessed_at as f64,
                OrderBy::Importance => f64::from(m.importance),
            };
            let ord = key(a).total_cmp(&key(b));
            if order_dir == OrderDir::Desc {
                ord.reverse()
            } else {
                ord
            }
        });

        Ok(rows.into_iter().skip(offset).take(limit.max(1)).collect())
    }

    async fn get_stats(&self) -> Result<MemoryStats, StorageError> {
        let state = self.state.read().await;
        let mut stats = MemoryStats::empty();
        stats.total = state.memories.len();

        let mut importance_sum = 0.0_f32;
        for memory in &state.memories {
            *stats
                .by_category
                .entry(memory.category.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_scope
                .entry(memory.scope.as_str().to_string())
                .or_insert(0) += 1;
            importance_sum += memory.importance;
            stats.oldest_created_at = Some(
                stats
                    .oldest_created_at
                    .map_or(memory.created_at, |o| o.min(memory.created_at)),
            );
            stats.newest_created_at = Some(
                stats
                    .newest_created_at
                    .map_or(memory.created_at, |n| n.max(memory.created_at)),
            );
        }

        if stats.total > 0 {
            stats.avg_importance = importance_sum / stats.total as f32;
        }

        Ok(stats)
    }

    async fn bulk_insert(&self, rows: Vec<NewMemory>) -> Result<Vec<Memory>, StorageError> {
        let mut inserted = Vec::with_capacity(rows.len());
        let mut state = self.state.write().await;
        for row in rows {
            if row.headline.trim().is_empty() && row.summary.trim().is_empty() {
                return Err(StorageError::InvalidInput(
                    "headline and summary cannot both be empty".to_string(),
                ));
            }
            let now = now_ms();
            let memory = Memory {
                id: uuid::Uuid::new_v4().to_string(),
                headline: row.headline,
                summary: row.summary,
                content: row.content,
                category: row.category,
                scope: row.scope,
                importance: row.importance.clamp(0.0, 1.0),
                tags: row.tags,
                metadata: row.metadata,
                created_at: now,
                updated_at: now,
                last_accessed_at: now,
                access_count: 0,
                vector: Some(row.vector),
            };
            state.memories.push(memory.clone());
            inserted.push(memory);
        }
        self.persist(&state.memories).await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::MemoryCategory;
    use std::collections::HashMap;

    fn sample(headline: &str, vector: Vec<f32>) -> NewMemory {
        NewMemory {
            headline: headline.to_string(),
            summary: format!("{headline} summary"),
            content: format!("{headline} content body"),
            category: MemoryCategory::Profile,
            scope: Scope::global(),
            importance: 0.6,
            tags: vec!["test".to_string()],
            metadata: HashMap::new(),
            vector,
        }
    }

    #[tokio::test]
    async fn insert_get_delete_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let backend = LocalJsonBackend::open(&path).await.expect("open");

        let inserted = backend
            .insert(sample("alpha preference", vec![1.0, 0.0, 0.0]))
            .await
            .expect("insert");
        assert_eq!(inserted.access_count, 0);

        let fetched = backend
            .get_by_id(&inserted.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.headline, "alpha preference");

        let deleted = backend.delete(&inserted.id).await.expect("delete");
        assert!(deleted);
        assert!(backend.get_by_id(&inserted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vector_search_orders_by_ascending_distance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalJsonBackend::open(dir.path().join("store.json"))
            .await
            .expect("open");

        backend
            .insert(sample("matches query", vec![1.0, 0.0]))
            .await
            .expect("insert a");
        backend
            .insert(sample("orthogonal", vec![0.0, 1.0]))
            .await
            .expect("insert b");

        let hits = backend
            .vector_search(&[1.0, 0.0], 10, None, &[], None)
            .await
            .expect("search");
        assert_eq!(hits[0].memory.headline, "matches query");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn full_text_search_is_empty_for_blank_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalJsonBackend::open(dir.path().join("store.json"))
            .await
            .expect("open");
        backend
            .insert(sample("alpha", vec![1.0]))
            .await
            .expect("insert");

        let hits = backend
            .full_text_search("   ", 10, None, &[])
            .await
            .expect("search");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_scope_removes_only_matching_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalJsonBackend::open(dir.path().join("store.json"))
            .await
            .expect("open");

        let mut global = sample("global row", vec![1.0]);
        global.scope = Scope::global();
        backend.insert(global).await.expect("insert global");

        let mut scoped = sample("project row", vec![1.0]);
        scoped.scope = Scope::parse("project:alpha").unwrap();
        backend.insert(scoped).await.expect("insert scoped");

        let removed = backend
            .delete_by_scope(&Scope::parse("project:alpha").unwrap())
            .await
            .expect("delete by scope");
        assert_eq!(removed, 1);

        let stats = backend.get_stats().await.expect("stats");
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected_before_any_row_is_touched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalJsonBackend::open(dir.path().join("store.json"))
            .await
            .expect("open");
        backend
            .insert(sample("alpha", vec![1.0]))
            .await
            .expect("insert");

        let injection = "'; DROP TABLE memories; --";
        assert!(backend.get_by_id(injection).await.is_err());
        assert!(backend.delete(injection).await.is_err());
        assert!(backend
            .delete_many(&[injection.to_string()])
            .await
            .is_err());

        let stats = backend.get_stats().await.expect("stats");
        assert_eq!(stats.total, 1);
    }
}
