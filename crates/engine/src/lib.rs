//! The lexigen orchestration control plane.
//!
//! Five components composed top-down:
//!
//! - [`ledger::CostLedger`] — spend against budgets, independent of
//!   scheduling.
//! - [`progress::ProgressTracker`] — append-only progress snapshots and
//!   derived health per operation.
//! - [`safety::SafetyMonitor`] — system-wide metrics, the emergency stop,
//!   and the concurrency gate.
//! - [`admission::AdmissionController`] — the allow/deny policy gate in
//!   front of `start`.
//! - [`orchestrator::Orchestrator`] — the top-level state machine driving
//!   bounded-concurrency item processing.
//!
//! All components are plain owned values behind `Arc`, injected by
//! reference; tests construct a fresh set per case.

pub mod admission;
pub mod alerts;
pub mod error;
pub mod estimate;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod safety;

pub use admission::{AdmissionController, AdmissionDecision, AdmissionRequest, RateLimitPolicy};
pub use alerts::AlertRegistry;
pub use error::EngineError;
pub use estimate::{EstimateJob, EstimateJobStatus, EstimateRequest, EstimateService};
pub use ledger::{AnalyticsFilter, CostLedger};
pub use orchestrator::{
    CalibrationDefaults, Orchestrator, OrchestratorConfig, ResumePolicy, StartOutcome,
};
pub use progress::ProgressTracker;
pub use registry::{OperationRegistry, OperationRuntime};
pub use safety::SafetyMonitor;
