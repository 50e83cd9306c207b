use std::collections::HashMap;
use std::sync::Arc;

use memoria_core::{MemoryCategory, MemoryDelta, NewMemory, Scope};
use memoria_storage::{LocalJsonBackend, StorageBackend, WriteSerializer};

fn sample() -> NewMemory {
    NewMemory {
        headline: "likes dark mode".to_string(),
        summary: "user prefers dark mode in every tool".to_string(),
        content: "explicitly stated a preference for dark mode UIs".to_string(),
        category: MemoryCategory::Preferences,
        scope: Scope::global(),
        importance: 0.5,
        tags: vec!["ui".to_string()],
        metadata: HashMap::new(),
        vector: vec![0.1, 0.2, 0.3],
    }
}

async fn serializer() -> WriteSerializer {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = LocalJsonBackend::open(dir.path().join("store.json"))
        .await
        .expect("open");
    std::mem::forget(dir);
    WriteSerializer::new(Arc::new(backend))
}

#[tokio::test]
async fn update_preserves_id_and_bumps_updated_at() {
    let serializer = serializer().await;
    let row = serializer.insert(sample()).await.expect("insert");

    let delta = MemoryDelta {
        importance: Some(0.9),
        ..Default::default()
    };
    let updated = serializer
        .update(&row.id, &delta)
        .await
        .expect("update")
        .expect("row exists");

    assert_eq!(updated.id, row.id);
    assert_eq!(updated.headline, row.headline);
    assert!((updated.importance - 0.9).abs() < 1e-6);
    assert!(updated.updated_at >= row.updated_at);
}

#[tokio::test]
async fn update_on_missing_id_returns_none() {
    let serializer = serializer().await;
    let result = serializer
        .update("00000000-0000-0000-0000-000000000000", &MemoryDelta::default())
        .await
        .expect("update call succeeds");
    assert!(result.is_none());
}

#[tokio::test]
async fn increment_access_count_bumps_count_and_last_accessed() {
    let serializer = serializer().await;
    let row = serializer.insert(sample()).await.expect("insert");
    assert_eq!(row.access_count, 0);

    let bumped = serializer
        .increment_access_count(&row.id)
        .await
        .expect("bump");
    assert!(bumped);

    let fetched = serializer
        .backend()
        .get_by_id(&row.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(fetched.access_count, 1);
    assert!(fetched.last_accessed_at >= row.last_accessed_at);
}

#[tokio::test]
async fn delete_by_scope_removes_only_matching_rows_through_the_serializer() {
    let serializer = serializer().await;
    let mut scoped = sample();
    scoped.scope = Scope::parse("project:alpha").unwrap();
    serializer.insert(scoped).await.expect("insert scoped");
    serializer.insert(sample()).await.expect("insert global");

    let removed = serializer
        .delete_by_scope(&Scope::parse("project:alpha").unwrap())
        .await
        .expect("delete by scope");
    assert_eq!(removed, 1);

    let stats = serializer.backend().get_stats().await.expect("stats");
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn one_hundred_concurrent_inserts_all_land_with_distinct_ids() {
    let serializer = Arc::new(serializer().await);

    let mut handles = Vec::with_capacity(100);
    for i in 0..100 {
        let serializer = Arc::clone(&serializer);
        handles.push(tokio::spawn(async move {
            let mut row = sample();
            row.headline = format!("memory {i}");
            serializer.insert(row).await.expect("insert")
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let row = handle.await.expect("task panicked");
        ids.insert(row.id);
    }

    assert_eq!(ids.len(), 100, "every concurrent insert must get a distinct id");

    let stats = serializer.backend().get_stats().await.expect("stats");
    assert_eq!(stats.total, 100);
}
