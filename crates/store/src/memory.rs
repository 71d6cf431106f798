//! In-memory [`TermStore`] used by tests and local development.

use std::collections::BTreeMap;
use std::sync::Mutex;

use lexigen_core::selection::{ContentFilters, SelectionCriteria};
use lexigen_core::types::TermId;

use crate::error::StoreError;
use crate::models::{GeneratedContent, SectionContent, TermRecord};
use crate::TermStore;

/// Thread-safe in-memory term store.
///
/// Terms are keyed in a `BTreeMap` so category/filter selections resolve in
/// ascending id order without an explicit sort.
#[derive(Default)]
pub struct InMemoryTermStore {
    terms: Mutex<BTreeMap<TermId, TermRecord>>,
    written: Mutex<Vec<GeneratedContent>>,
}

impl InMemoryTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a term record.
    pub fn insert_term(&self, term: TermRecord) {
        self.terms.lock().unwrap().insert(term.id, term);
    }

    /// Seed `count` bare terms (ids 1..=count) in one category.
    /// Convenience for tests and local development.
    pub fn seed_terms(&self, count: usize, category: &str) {
        let now = chrono::Utc::now();
        let mut terms = self.terms.lock().unwrap();
        for id in 1..=count as TermId {
            terms.insert(
                id,
                TermRecord {
                    id,
                    name: format!("term-{id}"),
                    category: Some(category.to_string()),
                    sections: Vec::new(),
                    updated_at: now,
                },
            );
        }
    }

    /// Everything written via [`TermStore::write_content`], in write order.
    pub fn written(&self) -> Vec<GeneratedContent> {
        self.written.lock().unwrap().clone()
    }

    fn matches_filters(term: &TermRecord, section: &str, filters: &ContentFilters) -> bool {
        let existing = term.section(section);

        if let Some(want) = filters.has_content {
            if existing.is_some() != want {
                return false;
            }
        }
        if let Some(want) = filters.ai_generated {
            let actual = existing.map(|s| s.ai_generated).unwrap_or(false);
            if actual != want {
                return false;
            }
        }
        if let Some(want) = filters.verified {
            let actual = existing.map(|s| s.verified).unwrap_or(false);
            if actual != want {
                return false;
            }
        }

        let updated_at = existing.map(|s| s.updated_at).unwrap_or(term.updated_at);
        if let Some(before) = filters.updated_before {
            if updated_at >= before {
                return false;
            }
        }
        if let Some(after) = filters.updated_after {
            if updated_at <= after {
                return false;
            }
        }

        true
    }
}

#[async_trait::async_trait]
impl TermStore for InMemoryTermStore {
    async fn resolve_selection(
        &self,
        section: &str,
        criteria: &SelectionCriteria,
        regenerate_existing: bool,
    ) -> Result<Vec<TermId>, StoreError> {
        let terms = self.terms.lock().unwrap();

        let selected: Vec<TermId> = match criteria {
            SelectionCriteria::ExplicitIds { term_ids } => {
                // Request order is preserved; unknown ids are an error so a
                // typo does not silently shrink the operation.
                for id in term_ids {
                    if !terms.contains_key(id) {
                        return Err(StoreError::TermNotFound(*id));
                    }
                }
                term_ids.clone()
            }
            SelectionCriteria::Category { category } => terms
                .values()
                .filter(|t| t.category.as_deref() == Some(category.as_str()))
                .map(|t| t.id)
                .collect(),
            SelectionCriteria::Filter { filters } => terms
                .values()
                .filter(|t| Self::matches_filters(t, section, filters))
                .map(|t| t.id)
                .collect(),
        };

        let resolved = if regenerate_existing {
            selected
        } else {
            selected
                .into_iter()
                .filter(|id| {
                    terms
                        .get(id)
                        .map(|t| t.section(section).is_none())
                        .unwrap_or(false)
                })
                .collect()
        };

        Ok(resolved)
    }

    async fn get_term(&self, term_id: TermId) -> Result<TermRecord, StoreError> {
        self.terms
            .lock()
            .unwrap()
            .get(&term_id)
            .cloned()
            .ok_or(StoreError::TermNotFound(term_id))
    }

    async fn write_content(&self, content: GeneratedContent) -> Result<(), StoreError> {
        let mut terms = self.terms.lock().unwrap();
        let term = terms
            .get_mut(&content.term_id)
            .ok_or(StoreError::TermNotFound(content.term_id))?;

        let entry = SectionContent {
            section: content.section.clone(),
            ai_generated: true,
            verified: false,
            updated_at: chrono::Utc::now(),
        };
        match term
            .sections
            .iter_mut()
            .find(|s| s.section == content.section)
        {
            Some(existing) => *existing = entry,
            None => term.sections.push(entry),
        }
        drop(terms);

        self.written.lock().unwrap().push(content);
        Ok(())
    }

    async fn term_count(&self) -> Result<usize, StoreError> {
        Ok(self.terms.lock().unwrap().len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
