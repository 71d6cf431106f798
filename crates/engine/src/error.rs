use lexigen_core::error::CoreError;
use lexigen_store::error::StoreError;
use uuid::Uuid;

/// Errors surfaced by the orchestration engine.
///
/// Admission denials and invalid lifecycle transitions are *not* errors;
/// they are structured negative results on the respective calls.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error (validation, conflict).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The term store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The referenced operation does not exist.
    #[error("Operation not found: {0}")]
    OperationNotFound(Uuid),

    /// Unrecoverable orchestration error; the operation is marked failed
    /// and requires manual intervention.
    #[error("Orchestration fault: {0}")]
    Fault(String),
}
