use async_trait::async_trait;
use memoria_core::{Memory, MemoryCategory, MemoryStats, NewMemory, Scope};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    CreatedAt,
    UpdatedAt,
    LastAccessedAt,
    Importance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub scope: Option<Scope>,
    pub categories: Vec<MemoryCategory>,
}

/// A vector-search hit. `distance` is cosine distance (lower is closer);
/// callers convert to `vectorScore = 1 - distance` per spec.md §4.4.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub memory: Memory,
    pub distance: f32,
}

/// A full-text hit. `score` is provider-defined and not pre-normalised,
/// per spec.md §4.1.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub memory: Memory,
    pub score: f32,
}

/// The Store (spec.md §4.1): a persistent columnar+vector table of memory
/// records with ANN and full-text indices. Every mutating method here is
/// expected to be atomic from the caller's perspective; ordering between
/// concurrent mutations is the Write Serialiser's job (`crate::serializer`),
/// not the backend's.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn insert(&self, row: NewMemory) -> Result<Memory, StorageError>;

    /// Inserts a fully-formed row, preserving its id and timestamps rather
    /// than assigning fresh ones. Used only by the Write Serialiser's
    /// delete-then-insert pairs (update, access-count bump, rollback) —
    /// ordinary ingestion goes through `insert`.
    async fn reinsert(&self, row: Memory) -> Result<Memory, StorageError>;

    async fn delete(&self, id: &str) -> Result<bool, StorageError>;
    async fn delete_many(&self, ids: &[String]) -> Result<usize, StorageError>;
    async fn delete_by_scope(&self, scope: &Scope) -> Result<usize, StorageError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Memory>, StorageError>;

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: Option<&Scope>,
        categories: &[MemoryCategory],
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>, StorageError>;

    async fn full_text_search(
        &self,
        query: &str,
        limit: usize,
        scope: Option<&Scope>,
        categories: &[MemoryCategory],
    ) -> Result<Vec<LexicalHit>, StorageError>;

    async fn list(
        &self,
        filter: &ListFilter,
        order_by: OrderBy,
        order_dir: OrderDir,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, StorageError>;

    /// Bucketed counts, oldest/newest `created_at`, mean importance.
    /// MUST NOT load the `vector` column (spec.md §4.1).
    async fn get_stats(&self) -> Result<MemoryStats, StorageError>;

    /// Ordered append of several rows as a single critical section.
    async fn bulk_insert(&self, rows: Vec<NewMemory>) -> Result<Vec<Memory>, StorageError>;
}
