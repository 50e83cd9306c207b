use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MemoriaError;

/// The nil UUID, reserved for the Store's table-init sentinel-row dance
/// (spec.md §4.1) and never assigned to a real memory.
pub const RESERVED_SENTINEL_ID: &str = "00000000-0000-0000-0000-000000000000";

/// The closed set of memory categories. Append-only categories
/// (`Events`, `Cases`) never merge — every candidate becomes a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Profile,
    Preferences,
    Entities,
    Events,
    Cases,
    Patterns,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 6] = [
        MemoryCategory::Profile,
        MemoryCategory::Preferences,
        MemoryCategory::Entities,
        MemoryCategory::Events,
        MemoryCategory::Cases,
        MemoryCategory::Patterns,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryCategory::Profile => "profile",
            MemoryCategory::Preferences => "preferences",
            MemoryCategory::Entities => "entities",
            MemoryCategory::Events => "events",
            MemoryCategory::Cases => "cases",
            MemoryCategory::Patterns => "patterns",
        }
    }

    /// Append-only categories never merge; the deduplicator short-circuits
    /// to `CREATE` for these before ever touching the Store.
    pub fn is_append_only(self) -> bool {
        matches!(self, MemoryCategory::Events | MemoryCategory::Cases)
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = MemoriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(MemoryCategory::Profile),
            "preferences" => Ok(MemoryCategory::Preferences),
            "entities" => Ok(MemoryCategory::Entities),
            "events" => Ok(MemoryCategory::Events),
            "cases" => Ok(MemoryCategory::Cases),
            "patterns" => Ok(MemoryCategory::Patterns),
            other => Err(MemoriaError::invalid_argument(format!(
                "unknown category: {other}"
            ))),
        }
    }
}

/// A logical partition key. The grammar is `global | (agent|project|user|custom):<id>`
/// with `<id>` restricted to `[A-Za-z0-9_.-]+`. The only way to obtain a
/// `Scope` is through `Scope::parse`, so a `Scope` in hand is always valid —
/// this makes spec.md invariant 2's scope grammar unrepresentable-when-wrong
/// rather than merely checked at each call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    pub fn global() -> Self {
        Scope("global".to_string())
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self, MemoriaError> {
        let raw = raw.into();
        if raw == "global" {
            return Ok(Scope(raw));
        }
        let Some((prefix, id)) = raw.split_once(':') else {
            return Err(MemoriaError::invalid_argument(format!(
                "invalid scope: {raw}"
            )));
        };
        let prefix_ok = matches!(prefix, "agent" | "project" | "user" | "custom");
        let id_ok = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if prefix_ok && id_ok {
            Ok(Scope(raw))
        } else {
            Err(MemoriaError::invalid_argument(format!(
                "invalid scope: {raw}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Scope {
    type Error = MemoriaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Scope::parse(value)
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.0
    }
}

/// One of the three abstraction levels a memory can be projected at:
/// headline (L0), summary (L1, the default context level), or full
/// narrative content (L2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionLevel {
    Headline,
    Summary,
    Content,
}

impl Default for AbstractionLevel {
    fn default() -> Self {
        Self::Summary
    }
}

/// A persistent, addressable unit of recall (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub headline: String,
    pub summary: String,
    pub content: String,
    pub category: MemoryCategory,
    pub scope: Scope,
    pub importance: f32,
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_accessed_at: i64,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Memory {
    /// The `headline || "\n" || summary || "\n" || content` concatenation
    /// that every re-embed (ingest, merge, reembed) runs through the
    /// embedding capability, per spec.md invariant 3 of §8.
    pub fn embeddable_text(&self) -> String {
        format!("{}\n{}\n{}", self.headline, self.summary, self.content)
    }

    /// Projects this memory's text at the requested abstraction level.
    pub fn text_at(&self, level: AbstractionLevel) -> &str {
        match level {
            AbstractionLevel::Headline => &self.headline,
            AbstractionLevel::Summary => &self.summary,
            AbstractionLevel::Content => &self.content,
        }
    }

    /// Applies a partial update in place, bumping `updated_at`. Fields left
    /// `None` in the delta are untouched — this is the read-modify part of
    /// the Store's read-modify-write `update` contract (spec.md §4.1).
    pub fn apply_delta(&self, delta: &MemoryDelta, now_ms: i64) -> Memory {
        let mut next = self.clone();
        if let Some(headline) = &delta.headline {
            next.headline = headline.clone();
        }
        if let Some(summary) = &delta.summary {
            next.summary = summary.clone();
        }
        if let Some(content) = &delta.content {
            next.content = content.clone();
        }
        if let Some(importance) = delta.importance {
            next.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(tags) = &delta.tags {
            next.tags = tags.clone();
        }
        if let Some(metadata) = &delta.metadata {
            next.metadata = metadata.clone();
        }
        if let Some(vector) = &delta.vector {
            next.vector = Some(vector.clone());
        }
        next.updated_at = now_ms;
        next
    }
}

/// Fields supplied by the caller when inserting a brand-new memory; server
/// assigned fields (`id`, timestamps, `access_count`) are filled in by the
/// Store.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub headline: String,
    pub summary: String,
    pub content: String,
    pub category: MemoryCategory,
    pub scope: Scope,
    pub importance: f32,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub vector: Vec<f32>,
}

/// A partial update: `None` fields are left untouched by `Store::update`.
#[derive(Debug, Clone, Default)]
pub struct MemoryDelta {
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub importance: Option<f32>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub vector: Option<Vec<f32>>,
}

impl MemoryDelta {
    /// Whether any of the three abstraction-level text fields changed —
    /// the Manager re-embeds iff this is true (spec.md §4.8).
    pub fn touches_text(&self) -> bool {
        self.headline.is_some() || self.summary.is_some() || self.content.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_accepts_global_and_prefixed_forms() {
        assert!(Scope::parse("global").is_ok());
        assert!(Scope::parse("agent:abc-123").is_ok());
        assert!(Scope::parse("project:p_1.2").is_ok());
        assert!(Scope::parse("user:u1").is_ok());
        assert!(Scope::parse("custom:my-name").is_ok());
    }

    #[test]
    fn scope_rejects_malformed_input() {
        assert!(Scope::parse("").is_err());
        assert!(Scope::parse("agent:").is_err());
        assert!(Scope::parse("bogus:x").is_err());
        assert!(Scope::parse("agent:has space").is_err());
        assert!(Scope::parse("'; DROP TABLE memories; --").is_err());
    }

    #[test]
    fn category_round_trips_through_display_and_from_str() {
        for cat in MemoryCategory::ALL {
            let s = cat.to_string();
            assert_eq!(s.parse::<MemoryCategory>().unwrap(), cat);
        }
    }

    #[test]
    fn append_only_categories_are_events_and_cases() {
        assert!(MemoryCategory::Events.is_append_only());
        assert!(MemoryCategory::Cases.is_append_only());
        assert!(!MemoryCategory::Profile.is_append_only());
    }
}
