use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `getStats()`'s return shape (spec.md §4.1, referenced in prose only).
/// Embedded verbatim in the export payload (spec.md §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub by_category: HashMap<String, usize>,
    pub by_scope: HashMap<String, usize>,
    pub oldest_created_at: Option<i64>,
    pub newest_created_at: Option<i64>,
    pub avg_importance: f32,
}

impl MemoryStats {
    /// The boundary behaviour spec.md §8 pins for an empty table: `total =
    /// 0`, all-zero category counts, empty scope map, `avgImportance = 0`,
    /// `oldest/newest = undefined`.
    pub fn empty() -> Self {
        let by_category = crate::model::MemoryCategory::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        Self {
            total: 0,
            by_category,
            by_scope: HashMap::new(),
            oldest_created_at: None,
            newest_created_at: None,
            avg_importance: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_has_zeroed_category_counts_and_no_bounds() {
        let stats = MemoryStats::empty();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_category.len(), 6);
        assert!(stats.by_category.values().all(|&c| c == 0));
        assert!(stats.by_scope.is_empty());
        assert_eq!(stats.oldest_created_at, None);
        assert_eq!(stats.newest_created_at, None);
        assert_eq!(stats.avg_importance, 0.0);
    }
}
