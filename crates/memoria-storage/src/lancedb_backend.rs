use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, Table};
use memoria_core::{
    now_ms, Memory, MemoryCategory, MemoryStats, NewMemory, PredicateBuilder, Scope,
    RESERVED_SENTINEL_ID,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{ListFilter, LexicalHit, OrderBy, OrderDir, StorageBackend, VectorHit};
use crate::error::StorageError;
use crate::lexical::{bm25_like, tokenize};

const TABLE_NAME: &str = "memories";
const OVER_FETCH_FACTOR: usize = 3;

/// Natively-async `StorageBackend` over a LanceDB table. Unlike the
/// synchronous wrapper this crate's teacher used (an internal
/// `tokio::runtime::Runtime` driven with `block_on`, needed because its
/// caller was a blocking JSON-RPC server), memoria's engine is async end to
/// end, so this backend talks to `lancedb`'s own async API directly and
/// lets the caller supply the runtime.
pub struct LanceDbBackend {
    uri: String,
    dimensions: usize,
    table: RwLock<Table>,
}

impl LanceDbBackend {
    pub async fn open(uri: impl Into<String>, dimensions: usize) -> Result<Self, StorageError> {
        let uri = uri.into();
        let db = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb connect failed: {e}")))?;

        let table = match db.open_table(TABLE_NAME).execute().await {
            Ok(t) => t,
            Err(_) => Self::create_table(&db, dimensions).await?,
        };

        Ok(Self {
            uri,
            dimensions,
            table: RwLock::new(table),
        })
    }

    async fn create_table(db: &Connection, dimensions: usize) -> Result<Table, StorageError> {
        let schema = schema_ref(dimensions);
        let table = db
            .create_empty_table(TABLE_NAME, schema.clone())
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb create table failed: {e}")))?;

        // A fixed-size vector column can't be created truly empty on every
        // engine, and an FTS index built over zero rows misbehaves on some
        // versions (spec.md §4.1): seed one sentinel row, build the vector
        // index, then delete the sentinel before any caller sees the table.
        let sentinel = sentinel_row(dimensions);
        let batch = memory_to_batch(&sentinel, &schema)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb sentinel insert failed: {e}")))?;

        table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb index creation failed: {e}")))?;

        table
            .delete(&format!("id = '{RESERVED_SENTINEL_ID}'"))
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb sentinel cleanup failed: {e}")))?;

        debug!(dimensions, "lancedb table initialised");
        Ok(table)
    }

    async fn execute_predicate(
        &self,
        predicate: Option<String>,
        limit: usize,
    ) -> Result<Vec<Memory>, StorageError> {
        let table = self.table.read().await;
        let mut query = table.query().limit(limit.max(1));
        if let Some(predicate) = predicate {
            query = query.only_if(predicate);
        }
        let stream = query
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb query failed: {e}")))?;
        let batches = stream
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb stream collect failed: {e}")))?;
        Ok(batches_to_memories(&batches))
    }
}

#[async_trait]
impl StorageBackend for LanceDbBackend {
    async fn insert(&self, row: NewMemory) -> Result<Memory, StorageError> {
        if row.vector.len() != self.dimensions {
            return Err(StorageError::InvalidInput(format!(
                "vector has {} dimensions, table expects {}",
                row.vector.len(),
                self.dimensions
            )));
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
        self.reinsert(memory).await
    }

    async fn reinsert(&self, row: Memory) -> Result<Memory, StorageError> {
        let schema = schema_ref(self.dimensions);
        let batch = memory_to_batch(&row, &schema)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        let table = self.table.read().await;
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb add failed: {e}")))?;
        Ok(row)
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let predicate = PredicateBuilder::new()
            .id_eq(id)
            .map_err(StorageError::from)?
            .build()
            .ok_or_else(|| StorageError::Backend("id_eq produced no predicate clause".to_string()))?;

        let table = self.table.read().await;
        let before = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb count failed: {e}")))?;
        if before == 0 {
            return Ok(false);
        }
        table
            .delete(&predicate)
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb delete failed: {e}")))?;
        Ok(true)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let predicate = PredicateBuilder::new()
            .ids_in(ids)
            .map_err(StorageError::from)?
            .build()
            .ok_or_else(|| StorageError::Backend("ids_in produced no predicate clause".to_string()))?;

        let table = self.table.read().await;
        let before = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb count failed: {e}")))?;
        if before == 0 {
            return Ok(0);
        }
        table
            .delete(&predicate)
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb delete failed: {e}")))?;
        Ok(before as usize)
    }

    async fn delete_by_scope(&self, scope: &Scope) -> Result<usize, StorageError> {
        let table = self.table.read().await;
        let predicate = PredicateBuilder::new()
            .scope_eq(scope.as_str())
            .map_err(StorageError::from)?
            .build()
            .ok_or_else(|| StorageError::Backend("scope_eq produced no predicate clause".to_string()))?;
        let before = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb count failed: {e}")))?;
        if before == 0 {
            return Ok(0);
        }
        table
            .delete(&predicate)
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb delete failed: {e}")))?;
        Ok(before as usize)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Memory>, StorageError> {
        let predicate = PredicateBuilder::new()
            .id_eq(id)
            .map_err(StorageError::from)?
            .build()
            .ok_or_else(|| StorageError::Backend("id_eq produced no predicate clause".to_string()))?;
        let mut rows = self.execute_predicate(Some(predicate), 1).await?;
        Ok(rows.pop())
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: Option<&Scope>,
        categories: &[MemoryCategory],
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>, StorageError> {
        if vector.len() != self.dimensions {
            return Err(StorageError::InvalidInput(format!(
                "query vector has {} dimensions, table expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        let mut builder = PredicateBuilder::new();
        if let Some(scope) = scope {
            builder = builder.scope_eq(scope.as_str()).map_err(StorageError::from)?;
        }
        if !categories.is_empty() {
            let cats: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
            builder = builder.category_in(&cats).map_err(StorageError::from)?;
        }

        let table = self.table.read().await;
        let over_fetch = (limit * OVER_FETCH_FACTOR).max(limit).max(1);
        let mut query = table
            .query()
            .nearest_to(vector)
            .map_err(|e| StorageError::Backend(format!("lancedb vector query failed: {e}")))?
            .limit(over_fetch);
        if let Some(predicate) = builder.build() {
            query = query.only_if(predicate);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb vector search failed: {e}")))?;
        let batches = stream
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb stream collect failed: {e}")))?;

        let mut hits = batches_to_hits(&batches, vector);
        if let Some(min_score) = min_score {
            hits.retain(|hit| 1.0 - hit.distance >= min_score);
        }
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

        let mut builder = PredicateBuilder::new();
        if let Some(scope) = scope {
            builder = builder.scope_eq(scope.as_str()).map_err(StorageError::from)?;
        }
        if !categories.is_empty() {
            let cats: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
            builder = builder.category_in(&cats).map_err(StorageError::from)?;
        }

        let rows = self.execute_predicate(builder.build(), 20_000).await?;
        let mut hits: Vec<LexicalHit> = rows
            .into_iter()
            .filter_map(|memory| {
                let haystack = format!(
                    "{} {} {} {}",
                    memory.headline.to_lowercase(),
                    memory.summary.to_lowercase(),
                    memory.content.to_lowercase(),
                    memory.tags.join(" ").to_lowercase()
                );
                let doc_len = (haystack.len() as f32 / 5.0).max(1.0);
                let score = bm25_like(&haystack, doc_len, &terms);
                if score <= 0.0 {
                    return None;
                }
                Some(LexicalHit { memory, score })
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
        let mut builder = PredicateBuilder::new();
        if let Some(scope) = &filter.scope {
            builder = builder.scope_eq(scope.as_str()).map_err(StorageError::from)?;
        }
        if !filter.categories.is_empty() {
            let cats: Vec<String> = filter.categories.iter().map(|c| c.as_str().to_string()).collect();
            builder = builder.category_in(&cats).map_err(StorageError::from)?;
        }

        let mut rows = self.execute_predicate(builder.build(), offset + limit + 1).await?;
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
        let table = self.table.read().await;
        let query = table.query().select(Select::Columns(vec![
            "category".to_string(),
            "scope".to_string(),
            "importance".to_string(),
            "created_at".to_string(),
        ]));
        let stream = query
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb stats query failed: {e}")))?;
        let batches = stream
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| StorageError::Backend(format!("lancedb stream collect failed: {e}")))?;

        let mut stats = MemoryStats::empty();
        let mut importance_sum = 0.0_f32;
        for batch in &batches {
            let categories = as_string(batch, "category");
            let scopes = as_string(batch, "scope");
            let importances = as_f32(batch, "importance");
            let created = as_i64(batch, "created_at");
            for i in 0..batch.num_rows() {
                stats.total += 1;
                if let Some(c) = categories.map(|a| a.value(i).to_string()) {
                    *stats.by_category.entry(c).or_insert(0) += 1;
                }
                if let Some(s) = scopes.map(|a| a.value(i).to_string()) {
                    *stats.by_scope.entry(s).or_insert(0) += 1;
                }
                if let Some(imp) = importances.map(|a| a.value(i)) {
                    importance_sum += imp;
                }
                if let Some(created_at) = created.map(|a| a.value(i)) {
                    stats.oldest_created_at =
                        Some(stats.oldest_created_at.map_or(created_at, |o| o.min(created_at)));
                    stats.newest_created_at =
                        Some(stats.newest_created_at.map_or(created_at, |n| n.max(created_at)));
                }
            }
        }
        if stats.total > 0 {
            stats.avg_importance = importance_sum / stats.total as f32;
        }
        Ok(stats)
    }

    async fn bulk_insert(&self, rows: Vec<NewMemory>) -> Result<Vec<Memory>, StorageError> {
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            inserted.push(self.insert(row).await?);
        }
        Ok(inserted)
    }
}

fn schema_ref(dimensions: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("headline", DataType::Utf8, false),
        Field::new("summary", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("scope", DataType::Utf8, false),
        Field::new("importance", DataType::Float32, false),
        Field::new("tags_json", DataType::Utf8, false),
        Field::new("metadata_json", DataType::Utf8, false),
        Field::new("created_at", DataType::Int64, false),
        Field::new("updated_at", DataType::Int64, false),
        Field::new("last_accessed_at", DataType::Int64, false),
        Field::new("access_count", DataType::UInt64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimensions as i32),
            false,
        ),
    ]))
}

fn sentinel_row(dimensions: usize) -> Memory {
    Memory {
        id: RESERVED_SENTINEL_ID.to_string(),
        headline: "sentinel".to_string(),
        summary: "sentinel".to_string(),
        content: "sentinel".to_string(),
        category: MemoryCategory::Patterns,
        scope: Scope::global(),
        importance: 0.0,
        tags: Vec::new(),
        metadata: HashMap::new(),
        created_at: 0,
        updated_at: 0,
        last_accessed_at: 0,
        access_count: 0,
        vector: Some(vec![0.0_f32; dimensions]),
    }
}

fn memory_to_batch(memory: &Memory, schema: &SchemaRef) -> Result<RecordBatch, StorageError> {
    let tags_json = serde_json::to_string(&memory.tags)?;
    let metadata_json = serde_json::to_string(&memory.metadata)?;
    let vector = memory.vector.clone().unwrap_or_default();
    let dimensions = vector.len();

    let vector_values: Vec<Option<f32>> = vector.into_iter().map(Some).collect();
    let vector_array = arrow_array::FixedSizeListArray::from_iter_primitive::<
        arrow_array::types::Float32Type,
        _,
        _,
    >(std::iter::once(Some(vector_values)), dimensions as i32);

    RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![memory.id.clone()])),
            Arc::new(StringArray::from(vec![memory.headline.clone()])),
            Arc::new(StringArray::from(vec![memory.summary.clone()])),
            Arc::new(StringArray::from(vec![memory.content.clone()])),
            Arc::new(StringArray::from(vec![memory.category.as_str().to_string()])),
            Arc::new(StringArray::from(vec![memory.scope.as_str().to_string()])),
            Arc::new(Float32Array::from(vec![memory.importance])),
            Arc::new(StringArray::from(vec![tags_json])),
            Arc::new(StringArray::from(vec![metadata_json])),
            Arc::new(Int64Array::from(vec![memory.created_at])),
            Arc::new(Int64Array::from(vec![memory.updated_at])),
            Arc::new(Int64Array::from(vec![memory.last_accessed_at])),
            Arc::new(UInt64Array::from(vec![memory.access_count])),
            Arc::new(vector_array),
        ],
    )
    .map_err(|e| StorageError::Backend(format!("record batch build failed: {e}")))
}

fn batches_to_memories(batches: &[RecordBatch]) -> Vec<Memory> {
    let mut out = Vec::new();
    for batch in batches {
        let ids = as_string(batch, "id");
        let headlines = as_string(batch, "headline");
        let summaries = as_string(batch, "summary");
        let contents = as_string(batch, "content");
        let categories = as_string(batch, "category");
        let scopes = as_string(batch, "scope");
        let importances = as_f32(batch, "importance");
        let tags = as_string(batch, "tags_json");
        let metadata = as_string(batch, "metadata_json");
        let created = as_i64(batch, "created_at");
        let updated = as_i64(batch, "updated_at");
        let accessed = as_i64(batch, "last_accessed_at");
        let access_count = as_u64(batch, "access_count");
        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

        for i in 0..batch.num_rows() {
            let id = match ids.map(|a| a.value(i).to_string()) {
                Some(id) if id != RESERVED_SENTINEL_ID => id,
                _ => continue,
            };
            let category = categories
                .map(|a| a.value(i))
                .and_then(|s| s.parse::<MemoryCategory>().ok())
                .unwrap_or(MemoryCategory::Patterns);
            let scope = scopes
                .map(|a| a.value(i))
                .and_then(|s| Scope::parse(s).ok())
                .unwrap_or_else(Scope::global);
            let tags_vec = tags
                .map(|a| a.value(i))
                .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
                .unwrap_or_default();
            let metadata_map = metadata
                .map(|a| a.value(i))
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            let vector = vectors.and_then(|v| {
                if v.is_null(i) {
                    return None;
                }
                v.value(i)
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|a| a.iter().map(|x| x.unwrap_or(0.0)).collect())
            });

            out.push(Memory {
                id,
                headline: headlines.map(|a| a.value(i).to_string()).unwrap_or_default(),
                summary: summaries.map(|a| a.value(i).to_string()).unwrap_or_default(),
                content: contents.map(|a| a.value(i).to_string()).unwrap_or_default(),
                category,
                scope,
                importance: importances.map(|a| a.value(i)).unwrap_or(0.0),
                tags: tags_vec,
                metadata: metadata_map,
                created_at: created.map(|a| a.value(i)).unwrap_or(0),
                updated_at: updated.map(|a| a.value(i)).unwrap_or(0),
                last_accessed_at: accessed.map(|a| a.value(i)).unwrap_or(0),
                access_count: access_count.map(|a| a.value(i)).unwrap_or(0),
                vector,
            });
        }
    }
    out
}

fn batches_to_hits(batches: &[RecordBatch], query_vector: &[f32]) -> Vec<VectorHit> {
    batches_to_memories(batches)
        .into_iter()
        .filter_map(|memory| {
            let similarity = crate::lexical::cosine_similarity(query_vector, memory.vector.as_deref()?)?;
            let distance = 1.0 - similarity;
            Some(VectorHit { memory, distance })
        })
        .collect()
}

fn as_string<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn as_f32<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float32Array> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Float32Array>())
}

fn as_i64<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int64Array> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int64Array>())
}

fn as_u64<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a UInt64Array> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
}
