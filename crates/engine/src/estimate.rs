//! Asynchronous cost/time estimation jobs.
//!
//! `POST /batch/estimate` submits a job and returns immediately with an
//! id; the estimate resolves the selection and computes projections in the
//! background, and `GET /batch/estimate/{id}` polls for the result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lexigen_core::cost::PriceTable;
use lexigen_core::estimation::{
    estimate_operation, estimate_term, validate_estimate_count, OperationEstimate,
};
use lexigen_core::selection::SelectionCriteria;
use lexigen_core::types::Timestamp;
use lexigen_store::TermStore;
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::orchestrator::CalibrationDefaults;

// ---------------------------------------------------------------------------
// Job types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateJobStatus {
    Pending,
    Completed,
    Failed,
}

/// One estimation job's lifecycle record.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateJob {
    pub id: Uuid,
    pub status: EstimateJobStatus,
    pub submitted_at: Timestamp,
    pub result: Option<OperationEstimate>,
    pub error: Option<String>,
}

/// What to estimate.
#[derive(Debug, Clone)]
pub struct EstimateRequest {
    pub section: String,
    pub selection: SelectionCriteria,
    pub regenerate_existing: bool,
    pub model: String,
    pub worker_count: u32,
}

// ---------------------------------------------------------------------------
// EstimateService
// ---------------------------------------------------------------------------

/// Background estimation job runner.
pub struct EstimateService {
    jobs: Arc<Mutex<HashMap<Uuid, EstimateJob>>>,
    store: Arc<dyn TermStore>,
    prices: PriceTable,
    calibration: CalibrationDefaults,
}

impl EstimateService {
    pub fn new(
        store: Arc<dyn TermStore>,
        prices: PriceTable,
        calibration: CalibrationDefaults,
    ) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            store,
            prices,
            calibration,
        }
    }

    /// Submit an estimation job. Validates the selection synchronously and
    /// returns the job id; the estimate itself resolves in the background.
    pub fn submit(&self, request: EstimateRequest) -> Result<Uuid, EngineError> {
        request.selection.validate()?;

        let job_id = Uuid::now_v7();
        self.jobs.lock().unwrap().insert(
            job_id,
            EstimateJob {
                id: job_id,
                status: EstimateJobStatus::Pending,
                submitted_at: Utc::now(),
                result: None,
                error: None,
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let store = Arc::clone(&self.store);
        let prices = self.prices.clone();
        let calibration = self.calibration;
        tokio::spawn(async move {
            let outcome = Self::compute(store, prices, calibration, request).await;
            let mut jobs = jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(&job_id) else {
                return;
            };
            match outcome {
                Ok(estimate) => {
                    job.status = EstimateJobStatus::Completed;
                    job.result = Some(estimate);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Estimate job failed");
                    job.status = EstimateJobStatus::Failed;
                    job.error = Some(e.to_string());
                }
            }
        });

        Ok(job_id)
    }

    /// Poll a job by id.
    pub fn get(&self, job_id: Uuid) -> Option<EstimateJob> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }

    async fn compute(
        store: Arc<dyn TermStore>,
        prices: PriceTable,
        calibration: CalibrationDefaults,
        request: EstimateRequest,
    ) -> Result<OperationEstimate, EngineError> {
        let term_ids = store
            .resolve_selection(
                &request.section,
                &request.selection,
                request.regenerate_existing,
            )
            .await?;
        validate_estimate_count(term_ids.len())?;

        let price = prices.price_for(&request.model);
        let per_term = estimate_term(
            calibration.avg_input_tokens,
            calibration.avg_output_tokens,
            price,
            calibration.avg_generation_secs,
            calibration.sample_count,
        );
        let terms = vec![per_term; term_ids.len()];
        Ok(estimate_operation(&terms, request.worker_count))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
