//! The Deduplicator (spec.md §4.7): decides `CREATE` / `MERGE` / `SKIP` for
//! each extracted candidate using a category rule, a vector pre-filter,
//! and — for the `llm`/`both` strategies — an LLM call.

use std::sync::Arc;

use memoria_core::{DeduplicationConfig, DeduplicationStrategy, Memory, MemoryCategory, Scope};
use memoria_llm::{ChatMessage, LlmProvider};
use memoria_storage::WriteSerializer;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::extractor::ExtractedMemory;

/// A candidate's post-merge text, used both to build the row for a `MERGE`
/// decision and to re-embed it.
#[derive(Debug, Clone)]
pub struct MergedText {
    pub headline: String,
    pub summary: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum DedupDecision {
    Create,
    Merge {
        target_id: String,
        merged: MergedText,
    },
    Skip,
}

pub struct Deduplicator {
    storage: Arc<WriteSerializer>,
    llm: Arc<dyn LlmProvider>,
}

const MAX_SIMILAR_CANDIDATES: usize = 5;

impl Deduplicator {
    pub fn new(storage: Arc<WriteSerializer>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { storage, llm }
    }

    pub async fn decide(
        &self,
        candidate: &ExtractedMemory,
        vector: &[f32],
        scope: &Scope,
        cfg: &DeduplicationConfig,
    ) -> DedupDecision {
        if candidate.category.is_append_only() {
            return DedupDecision::Create;
        }

        let backend = self.storage.backend();
        let loose_threshold = (cfg.similarity_threshold - 0.1).max(0.0);
        let hits = match backend
            .vector_search(
                vector,
                MAX_SIMILAR_CANDIDATES,
                Some(scope),
                &[candidate.category],
                Some(loose_threshold),
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(error = %err, "dedup vector pre-filter failed, defaulting to CREATE");
                return DedupDecision::Create;
            }
        };

        let similar: Vec<(Memory, f32)> = hits
            .into_iter()
            .map(|h| (h.memory, 1.0 - h.distance))
            .filter(|(_, similarity)| *similarity >= loose_threshold)
            .collect();

        let high_confidence: Vec<&(Memory, f32)> = similar
            .iter()
            .filter(|(_, similarity)| *similarity >= cfg.similarity_threshold)
            .collect();

        let Some(top) = high_confidence.first() else {
            return DedupDecision::Create;
        };

        match cfg.strategy {
            DeduplicationStrategy::Vector => self.auto_merge(candidate, top),
            DeduplicationStrategy::Both => {
                let top_similarity = high_confidence
                    .iter()
                    .map(|(_, s)| *s)
                    .fold(f32::MIN, f32::max);
                if top_similarity >= cfg.llm_threshold {
                    DedupDecision::Skip
                } else {
                    self.llm_decide(candidate, &similar).await
                }
            }
            DeduplicationStrategy::Llm => self.llm_decide(candidate, &similar).await,
        }
    }

    /// Keeps the new headline, appends summary/content, unions tags in
    /// stable order (new entries appended). No LLM call.
    fn auto_merge(&self, candidate: &ExtractedMemory, top: &(Memory, f32)) -> DedupDecision {
        let (target, _similarity) = top;
        let merged = MergedText {
            headline: candidate.headline.clone(),
            summary: format!("{}\n{}", target.summary, candidate.summary),
            content: format!("{}\n{}", target.content, candidate.content),
            tags: union_tags(&target.tags, &candidate.tags),
        };
        DedupDecision::Merge {
            target_id: target.id.clone(),
            merged,
        }
    }

    /// Always calls the LLM with the candidate and up to 5 similar
    /// existing memories; any LLM or parse error falls back to `CREATE`
    /// (bias: never silently lose information).
    async fn llm_decide(&self, candidate: &ExtractedMemory, similar: &[(Memory, f32)]) -> DedupDecision {
        let prompt = build_dedup_prompt(candidate, similar);
        let messages = vec![
            ChatMessage::system(DEDUP_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let completion = match self
            .llm
            .complete(memoria_llm::CompletionRequest::new(messages).json())
            .await
        {
            Ok(response) => response.content,
            Err(err) => {
                warn!(error = %err, "dedup LLM call failed, defaulting to CREATE");
                return DedupDecision::Create;
            }
        };

        match parse_dedup_decision(&completion, similar) {
            Some(decision) => decision,
            None => {
                debug!("dedup LLM output unparseable, defaulting to CREATE");
                DedupDecision::Create
            }
        }
    }
}

/// Stable-order union: every tag already on `existing`, then every tag
/// from `incoming` not already present.
pub fn union_tags(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut out = existing.to_vec();
    for tag in incoming {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}

const DEDUP_SYSTEM_PROMPT: &str = "You are a memory deduplication judge. You are given a new \
candidate memory and up to five existing memories of the same category and scope. Decide \
whether the candidate should be CREATE (a genuinely new memory), MERGE (the same fact as an \
existing memory, refined or extended), or SKIP (an exact or near-exact duplicate with nothing \
new to add). Respond with a JSON object: {\"decision\": \"CREATE\"|\"MERGE\"|\"SKIP\", \
\"target_id\": string (required for MERGE), \"headline\": string, \"summary\": string, \
\"content\": string, \"tags\": string[] (the latter four required for MERGE, the merged \
text/tags to write back).";

fn build_dedup_prompt(candidate: &ExtractedMemory, similar: &[(Memory, f32)]) -> String {
    let mut prompt = format!(
        "Candidate:\nheadline: {}\nsummary: {}\ncontent: {}\ntags: {:?}\n\nExisting memories:\n",
        candidate.headline, candidate.summary, candidate.content, candidate.tags
    );
    for (memory, similarity) in similar.iter().take(MAX_SIMILAR_CANDIDATES) {
        prompt.push_str(&format!(
            "- id: {}\n  similarity: {:.3}\n  headline: {}\n  summary: {}\n",
            memory.id, similarity, memory.headline, memory.summary
        ));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct RawDedupDecision {
    decision: Option<String>,
    target_id: Option<String>,
    headline: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

fn parse_dedup_decision(raw: &str, similar: &[(Memory, f32)]) -> Option<DedupDecision> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let raw: RawDedupDecision = serde_json::from_value(value).ok()?;
    match raw.decision?.to_uppercase().as_str() {
        "CREATE" => Some(DedupDecision::Create),
        "SKIP" => Some(DedupDecision::Skip),
        "MERGE" => {
            let target_id = raw.target_id?;
            // the LLM must name one of the candidates it was actually shown
            similar.iter().find(|(m, _)| m.id == target_id)?;
            Some(DedupDecision::Merge {
                target_id,
                merged: MergedText {
                    headline: raw.headline?,
                    summary: raw.summary?,
                    content: raw.content?,
                    tags: raw.tags.unwrap_or_default(),
                },
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_tags_preserves_order_and_appends_new() {
        let existing = vec!["dark-mode".to_string(), "editor".to_string()];
        let incoming = vec!["editor".to_string(), "themes".to_string()];
        assert_eq!(
            union_tags(&existing, &incoming),
            vec![
                "dark-mode".to_string(),
                "editor".to_string(),
                "themes".to_string()
            ]
        );
    }

    #[test]
    fn parse_dedup_decision_accepts_create_and_skip() {
        assert!(matches!(
            parse_dedup_decision(r#"{"decision":"CREATE"}"#, &[]),
            Some(DedupDecision::Create)
        ));
        assert!(matches!(
            parse_dedup_decision(r#"{"decision":"skip"}"#, &[]),
            Some(DedupDecision::Skip)
        ));
    }

    #[test]
    fn parse_dedup_decision_rejects_merge_to_unlisted_target() {
        let raw = r#"{"decision":"MERGE","target_id":"nope","headline":"h","summary":"s","content":"c","tags":[]}"#;
        assert!(parse_dedup_decision(raw, &[]).is_none());
    }

    #[test]
    fn parse_dedup_decision_returns_none_on_malformed_json() {
        assert!(parse_dedup_decision("not json", &[]).is_none());
    }
}
