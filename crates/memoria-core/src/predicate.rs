//! Converts structured filter sets into predicate strings safe to hand to
//! the backing engine (spec.md §4.2). Defence in depth: every scope,
//! category, and identifier is validated against a grammar before it is
//! ever interpolated, and escaping is applied unconditionally even though
//! the validated inputs can't currently contain a quote — a future
//! widening of a grammar must not silently create an injection path.

use crate::error::MemoriaError;
use crate::model::{MemoryCategory, Scope};

/// Canonical 8-4-4-4-12 hex UUID grammar, case-insensitive.
pub fn validate_id(id: &str) -> Result<(), MemoriaError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| MemoriaError::invalid_argument(format!("invalid id: {id}")))
}

pub fn validate_category(category: &str) -> Result<MemoryCategory, MemoriaError> {
    category.parse()
}

pub fn validate_scope(scope: &str) -> Result<Scope, MemoriaError> {
    Scope::parse(scope)
}

/// Doubles every quote character inside a literal. Literals are always
/// surrounded by single quotes by the caller.
pub fn escape_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}

fn quoted(raw: &str) -> String {
    format!("'{}'", escape_literal(raw))
}

/// Builds an AND-of-ORs predicate string. Each dimension added via
/// `eq`/`one_of` becomes one OR-joined, parenthesised group; distinct
/// dimensions are AND-joined. Every value is validated through the
/// grammar checks above before it reaches `quoted`.
#[derive(Debug, Default, Clone)]
pub struct PredicateBuilder {
    clauses: Vec<String>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_eq(mut self, id: &str) -> Result<Self, MemoriaError> {
        validate_id(id)?;
        self.clauses.push(format!("id = {}", quoted(id)));
        Ok(self)
    }

    pub fn scope_eq(mut self, scope: &str) -> Result<Self, MemoriaError> {
        let scope = validate_scope(scope)?;
        self.clauses
            .push(format!("scope = {}", quoted(scope.as_str())));
        Ok(self)
    }

    pub fn scope_in(mut self, scopes: &[String]) -> Result<Self, MemoriaError> {
        if scopes.is_empty() {
            return Ok(self);
        }
        let mut parts = Vec::with_capacity(scopes.len());
        for raw in scopes {
            let scope = validate_scope(raw)?;
            parts.push(format!("scope = {}", quoted(scope.as_str())));
        }
        self.clauses.push(format!("({})", parts.join(" OR ")));
        Ok(self)
    }

    pub fn category_in(mut self, categories: &[String]) -> Result<Self, MemoriaError> {
        if categories.is_empty() {
            return Ok(self);
        }
        let mut parts = Vec::with_capacity(categories.len());
        for raw in categories {
            let cat = validate_category(raw)?;
            parts.push(format!("category = {}", quoted(cat.as_str())));
        }
        self.clauses.push(format!("({})", parts.join(" OR ")));
        Ok(self)
    }

    pub fn ids_in(mut self, ids: &[String]) -> Result<Self, MemoriaError> {
        if ids.is_empty() {
            return Ok(self);
        }
        let mut parts = Vec::with_capacity(ids.len());
        for id in ids {
            validate_id(id)?;
            parts.push(format!("id = {}", quoted(id)));
        }
        self.clauses.push(format!("({})", parts.join(" OR ")));
        Ok(self)
    }

    /// Renders the composed predicate, or `None` if no clause was added
    /// (meaning "match everything").
    pub fn build(self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" AND "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_doubles_single_quotes() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_literal("a''b"), "a''''b");
    }

    #[test]
    fn invalid_scope_aborts_before_any_clause_is_built() {
        let err = PredicateBuilder::new()
            .scope_eq("'; DROP TABLE memories; --")
            .unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidArgument(_)));
    }

    #[test]
    fn invalid_category_is_rejected() {
        let err = PredicateBuilder::new()
            .category_in(&["not-a-category".to_string()])
            .unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidArgument(_)));
    }

    #[test]
    fn invalid_id_is_rejected() {
        let err = PredicateBuilder::new()
            .id_eq("'; DROP TABLE memories; --")
            .unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidArgument(_)));
    }

    #[test]
    fn composed_predicate_is_and_of_or_groups_with_quoted_literals() {
        let predicate = PredicateBuilder::new()
            .scope_eq("global")
            .unwrap()
            .category_in(&["profile".to_string(), "events".to_string()])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            predicate,
            "scope = 'global' AND (category = 'profile' OR category = 'events')"
        );
    }

    #[test]
    fn empty_builder_matches_everything() {
        assert_eq!(PredicateBuilder::new().build(), None);
    }

    #[test]
    fn scope_ids_containing_a_quote_are_rejected_by_the_grammar() {
        // The scope grammar restricts ids to [A-Za-z0-9_.-]+, so a quote
        // character is rejected before escaping is ever reached.
        let err = PredicateBuilder::new().scope_eq("custom:o'brien").unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidArgument(_)));
    }
}
