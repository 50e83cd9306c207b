//! The Extractor (spec.md §4.6): produces candidate `ExtractedMemory`
//! records from a turn, a session history, or free text, via a single LLM
//! call with a fixed system prompt. Transport or parse failures yield an
//! empty extraction list — the caller proceeds regardless.

use std::sync::Arc;

use memoria_core::{CaptureConfig, MemoryCategory};
use memoria_llm::{ChatMessage, LlmProvider};
use serde::Deserialize;
use tracing::{debug, warn};

/// One LLM-produced candidate, prior to embedding or deduplication.
#[derive(Debug, Clone)]
pub struct ExtractedMemory {
    pub headline: String,
    pub summary: String,
    pub content: String,
    pub category: MemoryCategory,
    pub importance: f32,
    pub tags: Vec<String>,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

/// A single dialogue turn, as `processTurn` receives it.
#[derive(Debug, Clone)]
pub struct Turn {
    pub user_message: String,
    pub assistant_response: String,
}

const SYSTEM_PROMPT: &str = "You are a memory extraction engine for a conversational assistant. \
Given a piece of dialogue or text, extract zero or more durable memories worth retaining \
long-term. Each memory must be categorised as exactly one of: profile, preferences, entities, \
events, cases, patterns. For each memory, produce three abstraction levels: a headline \
(<=15 words), a 2-4 sentence summary, and a full narrative content. Assign an importance score \
in [0, 1] and a short list of lowercase tags. Respond with a JSON array of objects, each with \
the keys: headline, summary, content, category, importance, tags, metadata. Do not invent facts \
not present in the input. If nothing is worth retaining, respond with an empty array.";

/// The noise gate's greeting/acknowledgement patterns (per-turn only). This
/// mirrors the Retriever's adaptive filter list since both exist to strip
/// the same class of content-free utterances.
const NOISE_MESSAGES: &[&str] = &[
    "hi", "hello", "hey", "ok", "okay", "thanks", "thank you", "yes", "no", "yep", "nope", "bye",
];

pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Per-turn noise gate: skip if the user message is a bare
    /// greeting/acknowledgement, if the combined length falls below twice
    /// `min_content_length`, or if any (validly-compiled) skip pattern
    /// matches. Malformed user-supplied regexes are silently ignored.
    fn should_skip_turn(turn: &Turn, capture: &CaptureConfig) -> bool {
        if !capture.noise_filter {
            return Self::fails_length_or_patterns(turn, capture);
        }
        let normalized = turn.user_message.trim().to_lowercase();
        let normalized = normalized.trim_end_matches(['.', '!', '?']);
        if NOISE_MESSAGES.iter().any(|p| *p == normalized) {
            return true;
        }
        Self::fails_length_or_patterns(turn, capture)
    }

    fn fails_length_or_patterns(turn: &Turn, capture: &CaptureConfig) -> bool {
        let combined_len = turn.user_message.len() + turn.assistant_response.len();
        if combined_len < 2 * capture.min_content_length {
            return true;
        }
        for pattern in &capture.skip_patterns {
            match regex::Regex::new(pattern) {
                Ok(re) => {
                    if re.is_match(&turn.user_message) {
                        return true;
                    }
                }
                Err(_) => {
                    debug!(pattern, "skip pattern failed to compile, ignoring");
                }
            }
        }
        false
    }

    /// Extracts candidates from a single turn. Applies the noise gate
    /// first; on a gate hit, or on any LLM/parse failure, returns an empty
    /// list rather than propagating an error (spec.md §4.6 failure
    /// policy).
    pub async fn extract_from_turn(
        &self,
        turn: &Turn,
        capture: &CaptureConfig,
        existing_context: Option<&str>,
    ) -> Vec<ExtractedMemory> {
        if Self::should_skip_turn(turn, capture) {
            debug!("noise gate: skipping turn extraction");
            return Vec::new();
        }

        let user_prompt = build_turn_prompt(turn, existing_context);
        self.run(&user_prompt).await
    }

    /// Extracts candidates from an entire session history. No per-turn
    /// noise gate applies (spec.md §4.6: "per-turn only").
    pub async fn extract_from_session(&self, history: &[Turn]) -> Vec<ExtractedMemory> {
        let user_prompt = build_session_prompt(history);
        self.run(&user_prompt).await
    }

    /// Extracts candidates from a free-text blob.
    pub async fn extract_from_text(&self, text: &str) -> Vec<ExtractedMemory> {
        self.run(text).await
    }

    async fn run(&self, user_prompt: &str) -> Vec<ExtractedMemory> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];

        let completion = match self
            .llm
            .complete(memoria_llm::CompletionRequest::new(messages).json())
            .await
        {
            Ok(response) => response.content,
            Err(err) => {
                warn!(error = %err, "extraction LLM call failed, returning empty extraction");
                return Vec::new();
            }
        };

        parse_extraction_output(&completion)
    }
}

fn build_turn_prompt(turn: &Turn, existing_context: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(context) = existing_context {
        prompt.push_str("Existing known context (avoid re-emitting these facts):\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "User: {}\nAssistant: {}\n",
        turn.user_message, turn.assistant_response
    ));
    prompt
}

fn build_session_prompt(history: &[Turn]) -> String {
    let mut prompt = String::from("Conversation history:\n");
    for turn in history {
        prompt.push_str(&format!(
            "User: {}\nAssistant: {}\n",
            turn.user_message, turn.assistant_response
        ));
    }
    prompt
}

/// Trims the last six turns of a session into a compact "existing context"
/// block for the per-turn prompt, per spec.md §4.6.
pub fn trailing_context(history: &[Turn], max_turns: usize) -> String {
    let start = history.len().saturating_sub(max_turns);
    history
        .get(start..)
        .unwrap_or_default()
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.user_message, t.assistant_response))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Deserialize)]
struct RawExtractedMemory {
    headline: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    category: Option<String>,
    #[serde(default)]
    importance: Option<f32>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<std::collections::HashMap<String, serde_json::Value>>,
}

/// Defensively parses the LLM's output text: strips fenced code-block
/// markers if present, accepts either a top-level array or an object
/// containing one under any key, and silently drops items missing any of
/// `headline`/`summary`/`content` or carrying an unknown category.
/// `importance` is clamped to `[0, 1]`; missing tags/metadata become empty.
pub fn parse_extraction_output(raw: &str) -> Vec<ExtractedMemory> {
    let stripped = strip_code_fence(raw);

    let value: serde_json::Value = match serde_json::from_str(stripped.trim()) {
        Ok(v) => v,
        Err(err) => {
            debug!(error = %err, "extraction output failed to parse as JSON");
            return Vec::new();
        }
    };

    let array = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map
            .into_values()
            .find_map(|v| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    array
        .into_iter()
        .filter_map(|item| {
            let raw: RawExtractedMemory = serde_json::from_value(item).ok()?;
            let headline = raw.headline?;
            let summary = raw.summary?;
            let content = raw.content?;
            let category: MemoryCategory = raw.category?.parse().ok()?;
            if headline.trim().is_empty() || summary.trim().is_empty() || content.trim().is_empty() {
                return None;
            }
            Some(ExtractedMemory {
                headline,
                summary,
                content,
                category,
                importance: raw.importance.unwrap_or(0.5).clamp(0.0, 1.0),
                tags: raw.tags.unwrap_or_default(),
                metadata: raw.metadata.unwrap_or_default(),
            })
        })
        .collect()
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches('\n');
    after_open.strip_suffix("```").unwrap_or(after_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> CaptureConfig {
        CaptureConfig {
            auto: true,
            session_summary: true,
            noise_filter: true,
            min_content_length: 12,
            skip_patterns: Vec::new(),
        }
    }

    #[test]
    fn noise_gate_skips_bare_greetings() {
        let turn = Turn {
            user_message: "hi".to_string(),
            assistant_response: "hello there, how can I help you today?".to_string(),
        };
        assert!(Extractor::should_skip_turn(&turn, &capture()));
    }

    #[test]
    fn noise_gate_skips_short_combined_content() {
        let turn = Turn {
            user_message: "ok".to_string(),
            assistant_response: "k".to_string(),
        };
        assert!(Extractor::should_skip_turn(&turn, &capture()));
    }

    #[test]
    fn noise_gate_allows_substantive_turns() {
        let turn = Turn {
            user_message: "I'm a senior TypeScript developer with 5 years of experience"
                .to_string(),
            assistant_response: "Got it, I'll remember that.".to_string(),
        };
        assert!(!Extractor::should_skip_turn(&turn, &capture()));
    }

    #[test]
    fn noise_gate_respects_skip_patterns() {
        let mut cfg = capture();
        cfg.skip_patterns = vec![r"^/debug".to_string()];
        let turn = Turn {
            user_message: "/debug dump the session state please".to_string(),
            assistant_response: "here is the dump of the full session state".to_string(),
        };
        assert!(Extractor::should_skip_turn(&turn, &cfg));
    }

    #[test]
    fn noise_gate_ignores_malformed_skip_patterns() {
        let mut cfg = capture();
        cfg.skip_patterns = vec!["(unclosed".to_string()];
        let turn = Turn {
            user_message: "I prefer dark mode everywhere across my tools".to_string(),
            assistant_response: "Noted, I will keep that preference in mind.".to_string(),
        };
        assert!(!Extractor::should_skip_turn(&turn, &cfg));
    }

    #[test]
    fn parse_extraction_output_strips_fenced_json() {
        let raw = "```json\n[{\"headline\":\"h\",\"summary\":\"s\",\"content\":\"c\",\"category\":\"profile\",\"importance\":1.4,\"tags\":[\"a\"]}]\n```";
        let out = parse_extraction_output(raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].importance, 1.0);
        assert_eq!(out[0].category, MemoryCategory::Profile);
    }

    #[test]
    fn parse_extraction_output_drops_items_missing_required_fields() {
        let raw = r#"[{"headline":"h","summary":"s"}]"#;
        assert!(parse_extraction_output(raw).is_empty());
    }

    #[test]
    fn parse_extraction_output_drops_unknown_category() {
        let raw = r#"[{"headline":"h","summary":"s","content":"c","category":"bogus"}]"#;
        assert!(parse_extraction_output(raw).is_empty());
    }

    #[test]
    fn parse_extraction_output_accepts_object_wrapping_array() {
        let raw = r#"{"memories":[{"headline":"h","summary":"s","content":"c","category":"events"}]}"#;
        let out = parse_extraction_output(raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tags, Vec::<String>::new());
    }

    #[test]
    fn parse_extraction_output_returns_empty_on_malformed_json() {
        assert!(parse_extraction_output("not json at all").is_empty());
    }

    #[test]
    fn trailing_context_keeps_only_the_last_n_turns() {
        let history: Vec<Turn> = (0..10)
            .map(|i| Turn {
                user_message: format!("msg {i}"),
                assistant_response: format!("reply {i}"),
            })
            .collect();
        let context = trailing_context(&history, 6);
        assert!(context.contains("msg 4"));
        assert!(!context.contains("msg 3"));
    }
}
