//! Record types exchanged across the store boundary.

use serde::Serialize;

use lexigen_core::types::{TermId, Timestamp};

/// A glossary term as the store sees it.
#[derive(Debug, Clone, Serialize)]
pub struct TermRecord {
    pub id: TermId,
    pub name: String,
    pub category: Option<String>,
    /// Sections that currently have content, with per-section metadata.
    pub sections: Vec<SectionContent>,
    pub updated_at: Timestamp,
}

impl TermRecord {
    /// The content entry for a section, if any.
    pub fn section(&self, section: &str) -> Option<&SectionContent> {
        self.sections.iter().find(|s| s.section == section)
    }
}

/// Existing content state for one section of a term.
#[derive(Debug, Clone, Serialize)]
pub struct SectionContent {
    pub section: String,
    pub ai_generated: bool,
    pub verified: bool,
    pub updated_at: Timestamp,
}

/// Generated content to be written back for a `(term, section)` pair.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub term_id: TermId,
    pub section: String,
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
