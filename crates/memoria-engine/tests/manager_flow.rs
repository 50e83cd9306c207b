use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{DeduplicationStrategy, MemoriaConfig, MemoryCategory};
use memoria_embed::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, ProviderError as EmbedError};
use memoria_engine::{Manager, ManagerDeps, RecallOptions, StoreOptions};
use memoria_llm::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError as LlmError};
use memoria_storage::LocalJsonBackend;
use tokio::sync::Mutex;

/// A one-hot embedding over a small fixed vocabulary of topic keywords.
/// Two texts sharing a keyword embed identically (cosine similarity 1.0);
/// texts with no shared keyword are orthogonal (similarity 0.0). Good
/// enough to drive the dedup vector pre-filter without a real model.
struct KeywordEmbeddingProvider;

const KEYWORDS: &[&str] = &["dark mode", "coffee", "rust programming"];

fn embed_text(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let matched = KEYWORDS.iter().position(|kw| lower.contains(kw));
    let target = matched.unwrap_or(KEYWORDS.len());
    (0..=KEYWORDS.len())
        .map(|i| if i == target { 1.0 } else { 0.0 })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddingProvider {
    fn name(&self) -> &'static str {
        "keyword-stub"
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, EmbedError> {
        let vectors = request.inputs.iter().map(|text| embed_text(text)).collect();
        Ok(EmbeddingResponse {
            provider: "keyword-stub".to_string(),
            model: "keyword-stub-v1".to_string(),
            vectors,
            usage_tokens: None,
        })
    }
}

/// Replays a fixed queue of LLM completions, one per call. Once the queue
/// is drained, returns an empty JSON array so later unscripted calls don't
/// block the test — matching the extractor's own "empty on failure" bias.
struct ScriptedLlmProvider {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlmProvider {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    fn name(&self) -> &'static str {
        "scripted-stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut queue = self.responses.lock().await;
        let content = queue.pop_front().unwrap_or_else(|| "[]".to_string());
        Ok(CompletionResponse {
            provider: "scripted-stub".to_string(),
            model: "scripted-stub-v1".to_string(),
            content,
            usage_tokens: None,
        })
    }
}

fn extraction_json(headline: &str, summary: &str, content: &str) -> String {
    format!(
        r#"[{{"headline":"{headline}","summary":"{summary}","content":"{content}","category":"preferences","importance":0.6,"tags":["test"]}}]"#
    )
}

async fn manager_with(strategy: DeduplicationStrategy, llm_responses: Vec<&str>) -> Manager {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = LocalJsonBackend::open(dir.path().join("store.json"))
        .await
        .expect("open backend");
    std::mem::forget(dir);

    let mut config = MemoriaConfig::default();
    config.deduplication.strategy = strategy;
    config.deduplication.similarity_threshold = 0.8;
    config.deduplication.llm_threshold = 0.95;
    config.retrieval.min_score = 0.0;

    let deps = ManagerDeps {
        storage: Arc::new(backend),
        embedding: Arc::new(KeywordEmbeddingProvider),
        llm: Arc::new(ScriptedLlmProvider::new(llm_responses)),
        rerank: None,
    };
    Manager::open(config, deps)
}

#[tokio::test]
async fn store_then_recall_round_trips_a_memory() {
    let manager = manager_with(DeduplicationStrategy::Vector, vec![]).await;

    let stored = manager
        .store(
            "User prefers dark mode across every tool.",
            MemoryCategory::Preferences,
            StoreOptions {
                skip_extraction: true,
                ..Default::default()
            },
        )
        .await
        .expect("store");
    assert_eq!(stored.len(), 1);

    let result = manager
        .recall("dark mode", RecallOptions::default())
        .await
        .expect("recall");
    assert_eq!(result.memories.len(), 1);
    let hit = result.memories.first().expect("one hit");
    let expected = stored.first().expect("one stored memory");
    assert_eq!(hit.memory.id, expected.id);
}

#[tokio::test]
async fn append_only_category_always_creates_a_new_row() {
    let script = extraction_json(
        "Met with Alice",
        "User had a meeting with Alice about the roadmap.",
        "On Tuesday, the user met with Alice to discuss the product roadmap.",
    );
    let manager = manager_with(
        DeduplicationStrategy::Vector,
        vec![script.as_str(), script.as_str()],
    )
    .await;

    for _ in 0..2 {
        manager
            .store(
                "Met with Alice about the roadmap again.",
                MemoryCategory::Events,
                StoreOptions::default(),
            )
            .await
            .expect("store");
    }

    let stats = manager.get_stats().await.expect("stats");
    assert_eq!(stats.total, 2, "events never merge, even when near-identical");
}

#[tokio::test]
async fn vector_strategy_auto_merges_same_topic_candidates() {
    let first = extraction_json(
        "Likes dark mode",
        "User really loves dark mode in editors.",
        "The user stated a strong preference for dark mode in every editor they use.",
    );
    let second = extraction_json(
        "Reiterated dark mode",
        "User reiterated that dark mode is preferred everywhere.",
        "Later in the conversation the user again said dark mode should be the default.",
    );
    let manager = manager_with(
        DeduplicationStrategy::Vector,
        vec![first.as_str(), second.as_str()],
    )
    .await;

    manager
        .store("first mention", MemoryCategory::Preferences, StoreOptions::default())
        .await
        .expect("store first");
    manager
        .store("second mention", MemoryCategory::Preferences, StoreOptions::default())
        .await
        .expect("store second");

    let stats = manager.get_stats().await.expect("stats");
    assert_eq!(stats.total, 1, "same-topic preferences merge under the vector strategy");

    let memories = manager
        .list(
            memoria_storage::ListFilter::default(),
            memoria_storage::OrderBy::CreatedAt,
            memoria_storage::OrderDir::Asc,
            10,
            0,
        )
        .await
        .expect("list");
    assert_eq!(memories.len(), 1);
    let merged = memories.first().expect("one merged memory");
    assert!(merged.content.contains("every editor"));
    assert!(merged.content.contains("should be the default"));
}

#[tokio::test]
async fn llm_strategy_creates_for_entirely_unrelated_topics() {
    let dark_mode = extraction_json(
        "Likes dark mode",
        "User loves dark mode.",
        "The user stated a preference for dark mode.",
    );
    let coffee = extraction_json(
        "Drinks coffee",
        "User drinks black coffee every morning.",
        "The user mentioned drinking black coffee every single morning before work.",
    );
    let manager = manager_with(
        DeduplicationStrategy::Llm,
        vec![dark_mode.as_str(), coffee.as_str()],
    )
    .await;

    manager
        .store("dark mode turn", MemoryCategory::Preferences, StoreOptions::default())
        .await
        .expect("store dark mode");
    manager
        .store("coffee turn", MemoryCategory::Preferences, StoreOptions::default())
        .await
        .expect("store coffee");

    let stats = manager.get_stats().await.expect("stats");
    assert_eq!(
        stats.total, 2,
        "unrelated topics fall below the vector pre-filter and are never sent to the LLM judge"
    );
}
