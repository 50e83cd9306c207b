use std::collections::HashMap;
use std::time::Instant;

use memoria_core::{MemoryCategory, NewMemory, Scope};
use memoria_storage::{LocalJsonBackend, StorageBackend};

fn make_rows(n: usize) -> Vec<NewMemory> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let provider = if i % 3 == 0 {
            "jina"
        } else if i % 3 == 1 {
            "gemini"
        } else {
            "openai"
        };
        out.push(NewMemory {
            headline: format!("memory {i}"),
            summary: format!("uses {provider} embeddings for retrieval"),
            content: format!(
                "memory {i}: use {provider} embeddings for retrieval query ranking and recall"
            ),
            category: MemoryCategory::Patterns,
            scope: if i % 2 == 0 {
                Scope::global()
            } else {
                Scope::parse("project:alpha").unwrap()
            },
            importance: ((i % 10) as f32) / 10.0,
            tags: vec![provider.to_string(), "retrieval".to_string()],
            metadata: HashMap::new(),
            vector: vec![(i % 7) as f32 / 7.0, 1.0 - (i % 7) as f32 / 7.0],
        });
    }
    out
}

fn percentile(sorted_ms: &[f64], p: f64) -> f64 {
    let idx = ((sorted_ms.len().saturating_sub(1)) as f64 * p).round() as usize;
    sorted_ms[idx]
}

#[tokio::test]
#[ignore]
async fn full_text_search_p95_under_threshold_on_100k() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = LocalJsonBackend::open(dir.path().join("store.json"))
        .await
        .expect("open");
    backend
        .bulk_insert(make_rows(100_000))
        .await
        .expect("bulk insert");

    let mut samples_ms = Vec::new();
    for i in 0..60 {
        let query = if i % 2 == 0 {
            "jina retrieval query"
        } else {
            "gemini recall ranking"
        };
        let started = Instant::now();
        let _ = backend
            .full_text_search(query, 8, None, &[])
            .await
            .expect("search");
        samples_ms.push(started.elapsed().as_secs_f64() * 1000.0);
    }

    samples_ms.sort_by(|a, b| a.total_cmp(b));
    let p95 = percentile(&samples_ms, 0.95);
    eprintln!("full_text_search p95(ms) on 100k entries: {:.3}", p95);

    assert!(p95 < 300.0, "p95 too high: {:.3}ms", p95);
}
