//! Term/content persistence boundary.
//!
//! The durable storage backend is an external collaborator; this crate
//! specifies its interface ([`TermStore`]) and ships an in-memory
//! implementation used by tests and local development.

pub mod error;
pub mod memory;
pub mod models;

use lexigen_core::selection::SelectionCriteria;
use lexigen_core::types::TermId;

use crate::error::StoreError;
use crate::models::{GeneratedContent, TermRecord};

/// Read selection criteria and write generated content.
///
/// Selection resolution returns term ids in a stable order (request order
/// for explicit ids, ascending id otherwise) so an operation's work list is
/// deterministic for a given store state.
#[async_trait::async_trait]
pub trait TermStore: Send + Sync {
    /// Resolve selection criteria into an ordered term-id list for a section.
    ///
    /// When `regenerate_existing` is false, terms that already have content
    /// for the section are excluded.
    async fn resolve_selection(
        &self,
        section: &str,
        criteria: &SelectionCriteria,
        regenerate_existing: bool,
    ) -> Result<Vec<TermId>, StoreError>;

    /// Fetch a term record by id.
    async fn get_term(&self, term_id: TermId) -> Result<TermRecord, StoreError>;

    /// Persist generated content for a `(term, section)` pair, replacing any
    /// previous content for that pair.
    async fn write_content(&self, content: GeneratedContent) -> Result<(), StoreError>;

    /// Count of terms currently known to the store.
    async fn term_count(&self) -> Result<usize, StoreError>;
}
