//! Term selection criteria for batch operations.
//!
//! Selection is a tagged variant resolved exactly once at operation
//! creation into a concrete, ordered `(term_id, section)` list; later code
//! never re-evaluates a live filter.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{TermId, Timestamp};

// ---------------------------------------------------------------------------
// Content filters
// ---------------------------------------------------------------------------

/// Optional predicates over a term's existing content.
///
/// All present fields must match (conjunction).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentFilters {
    /// The term already has content for the target section.
    pub has_content: Option<bool>,
    /// The existing content was AI-generated.
    pub ai_generated: Option<bool>,
    /// The existing content passed human verification.
    pub verified: Option<bool>,
    pub updated_before: Option<Timestamp>,
    pub updated_after: Option<Timestamp>,
}

impl ContentFilters {
    /// True when no predicate is set (matches everything).
    pub fn is_empty(&self) -> bool {
        self.has_content.is_none()
            && self.ai_generated.is_none()
            && self.verified.is_none()
            && self.updated_before.is_none()
            && self.updated_after.is_none()
    }
}

// ---------------------------------------------------------------------------
// Selection criteria
// ---------------------------------------------------------------------------

/// How the terms of an operation are chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionCriteria {
    /// An explicit, ordered list of term ids.
    ExplicitIds { term_ids: Vec<TermId> },
    /// Every term in a named category.
    Category { category: String },
    /// Every term matching a set of content predicates.
    Filter { filters: ContentFilters },
}

impl SelectionCriteria {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::ExplicitIds { term_ids } => {
                if term_ids.is_empty() {
                    return Err(CoreError::Validation(
                        "term_ids must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Category { category } => {
                if category.is_empty() {
                    return Err(CoreError::Validation(
                        "category must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            // An empty filter set is valid: it selects every term.
            Self::Filter { .. } => Ok(()),
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExplicitIds { .. } => "explicit_ids",
            Self::Category { .. } => "category",
            Self::Filter { .. } => "filter",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ids_must_not_be_empty() {
        let sel = SelectionCriteria::ExplicitIds { term_ids: vec![] };
        assert!(sel.validate().is_err());
    }

    #[test]
    fn explicit_ids_valid() {
        let sel = SelectionCriteria::ExplicitIds {
            term_ids: vec![1, 2],
        };
        assert!(sel.validate().is_ok());
    }

    #[test]
    fn empty_category_rejected() {
        let sel = SelectionCriteria::Category {
            category: String::new(),
        };
        assert!(sel.validate().is_err());
    }

    #[test]
    fn empty_filter_selects_everything() {
        let sel = SelectionCriteria::Filter {
            filters: ContentFilters::default(),
        };
        assert!(sel.validate().is_ok());
    }

    #[test]
    fn filters_is_empty_detects_set_fields() {
        let mut filters = ContentFilters::default();
        assert!(filters.is_empty());
        filters.has_content = Some(false);
        assert!(!filters.is_empty());
    }

    #[test]
    fn selection_serde_tagging() {
        let sel = SelectionCriteria::Category {
            category: "machine-learning".to_string(),
        };
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(json["kind"], "category");
        assert_eq!(json["category"], "machine-learning");
    }
}
