use lexigen_core::types::TermId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Term not found: {0}")]
    TermNotFound(TermId),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
