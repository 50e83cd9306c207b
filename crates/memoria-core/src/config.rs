//! `MemoriaConfig` models every field of spec.md §6.5. Reading it from a
//! TOML file or an environment-variable overlay is the config-reader's job
//! (out of scope per spec.md §1); this type is what that reader must
//! populate before handing it to `Manager::open`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoriaConfig {
    pub db_path: String,
    pub default_scope: String,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub scoring: ScoringConfig,
    pub deduplication: DeduplicationConfig,
    pub capture: CaptureConfig,
    pub auto_recall: bool,
    pub recall_limit: usize,
    pub recall_min_score: f32,
    pub debug: bool,
}

impl Default for MemoriaConfig {
    fn default() -> Self {
        Self {
            db_path: "./memoria-data".to_string(),
            default_scope: "global".to_string(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            scoring: ScoringConfig::default(),
            deduplication: DeduplicationConfig::default(),
            capture: CaptureConfig::default(),
            auto_recall: true,
            recall_limit: 6,
            recall_min_score: 0.3,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compatible".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: String::new(),
            base_url: None,
            dimensions: 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerChoice {
    None,
    Jina,
    Cohere,
    Pinecone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub limit: usize,
    pub min_score: f32,
    pub hybrid: bool,
    pub candidate_multiplier: usize,
    pub reranker: Option<RerankerChoice>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 6,
            min_score: 0.3,
            hybrid: true,
            candidate_multiplier: 3,
            reranker: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub vector_weight: f32,
    pub bm25_weight: f32,
    pub reranker_weight: f32,
    pub recency_boost_days: f32,
    pub recency_boost_factor: f32,
    pub importance_weight: f32,
    pub time_penalty_days: f32,
    pub time_penalty_factor: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.55,
            bm25_weight: 0.25,
            reranker_weight: 0.20,
            recency_boost_days: 14.0,
            recency_boost_factor: 0.12,
            importance_weight: 0.10,
            time_penalty_days: 180.0,
            time_penalty_factor: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeduplicationStrategy {
    Llm,
    Vector,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    pub strategy: DeduplicationStrategy,
    pub similarity_threshold: f32,
    pub llm_threshold: f32,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            strategy: DeduplicationStrategy::Both,
            similarity_threshold: 0.85,
            llm_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub auto: bool,
    pub session_summary: bool,
    pub noise_filter: bool,
    pub min_content_length: usize,
    pub skip_patterns: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            auto: true,
            session_summary: true,
            noise_filter: true,
            min_content_length: 12,
            skip_patterns: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = MemoriaConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: MemoriaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.db_path, config.db_path);
        assert_eq!(back.scoring.vector_weight, config.scoring.vector_weight);
    }
}
