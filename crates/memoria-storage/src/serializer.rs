use std::sync::Arc;

use memoria_core::{now_ms, Memory, MemoryDelta, NewMemory, Scope};
use tokio::sync::Mutex;
use tracing::warn;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Funnels every mutating Store entry point through a FIFO chain (spec.md
/// §4.3): each write awaits the completion of the previous one before it
/// begins. `tokio::sync::Mutex` grants its waiters in acquire order, which
/// is exactly the fairness this component promises — there is no
/// multi-writer optimistic concurrency anywhere in memoria.
pub struct WriteSerializer {
    backend: Arc<dyn StorageBackend>,
    chain: Mutex<()>,
}

impl WriteSerializer {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            chain: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub async fn insert(&self, row: NewMemory) -> Result<Memory, StorageError> {
        let _guard = self.chain.lock().await;
        self.backend.insert(row).await
    }

    pub async fn bulk_insert(&self, rows: Vec<NewMemory>) -> Result<Vec<Memory>, StorageError> {
        let _guard = self.chain.lock().await;
        self.backend.bulk_insert(rows).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.chain.lock().await;
        self.backend.delete(id).await
    }

    pub async fn delete_many(&self, ids: &[String]) -> Result<usize, StorageError> {
        let _guard = self.chain.lock().await;
        self.backend.delete_many(ids).await
    }

    pub async fn delete_by_scope(&self, scope: &Scope) -> Result<usize, StorageError> {
        let _guard = self.chain.lock().await;
        self.backend.delete_by_scope(scope).await
    }

    /// Read-modify-write. Materialises the original row as a rollback image,
    /// deletes it, then re-inserts the merged row. On insert failure the
    /// rollback image is re-inserted and the original error is surfaced
    /// (spec.md §4.3). Returns `Ok(None)` if `id` does not exist.
    pub async fn update(
        &self,
        id: &str,
        delta: &MemoryDelta,
    ) -> Result<Option<Memory>, StorageError> {
        let _guard = self.chain.lock().await;

        let Some(original) = self.backend.get_by_id(id).await? else {
            return Ok(None);
        };
        let updated = original.apply_delta(delta, now_ms());

        self.backend.delete(id).await?;

        match self.backend.reinsert(updated).await {
            Ok(row) => Ok(Some(row)),
            Err(err) => {
                warn!(memory_id = %id, "update insert failed, restoring rollback image");
                self.backend.reinsert(original).await?;
                Err(err)
            }
        }
    }

    /// Best-effort atomic bump; the caller (the Retriever) does not depend
    /// on the outcome and swallows failures itself, but the rollback
    /// discipline inside the chain still applies.
    pub async fn increment_access_count(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.chain.lock().await;

        let Some(original) = self.backend.get_by_id(id).await? else {
            return Ok(false);
        };
        let mut bumped = original.clone();
        bumped.access_count += 1;
        bumped.last_accessed_at = now_ms();

        self.backend.delete(id).await?;
        if let Err(err) = self.backend.reinsert(bumped).await {
            warn!(memory_id = %id, "access-count bump failed, restoring rollback image");
            self.backend.reinsert(original).await?;
            return Err(err);
        }
        Ok(true)
    }
}
