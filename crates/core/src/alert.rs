//! Alert types raised by the cost ledger and safety monitor on budget and
//! threshold breaches. Lifecycle is create, then optionally acknowledge;
//! alerts are never deleted.

use serde::Serialize;
use uuid::Uuid;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Severity and kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// What triggered the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A budget crossed its warning threshold.
    CostWarning,
    /// An operation breached a hard cost ceiling and was paused.
    CostExceeded,
    /// An operation's rolling failure rate breached the ceiling.
    FailureRate,
    /// The emergency stop was activated.
    EmergencyStop,
    /// An unrecoverable orchestration error.
    OperationFault,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CostWarning => "cost_warning",
            Self::CostExceeded => "cost_exceeded",
            Self::FailureRate => "failure_rate",
            Self::EmergencyStop => "emergency_stop",
            Self::OperationFault => "operation_fault",
        }
    }

    /// The default severity for this kind of alert.
    pub fn default_severity(self) -> AlertSeverity {
        match self {
            Self::CostWarning => AlertSeverity::Warning,
            Self::CostExceeded => AlertSeverity::Critical,
            Self::FailureRate => AlertSeverity::Warning,
            Self::EmergencyStop => AlertSeverity::Critical,
            Self::OperationFault => AlertSeverity::Critical,
        }
    }
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    /// The operation the alert concerns, when there is one.
    pub operation_id: Option<Uuid>,
    pub created_at: Timestamp,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<Timestamp>,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            operation_id: None,
            created_at: chrono::Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    /// Attach the concerned operation.
    pub fn for_operation(mut self, operation_id: Uuid) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_by.is_some()
    }

    /// Acknowledge the alert. Returns false if it was already acknowledged
    /// (first acknowledger wins; the record is not overwritten).
    pub fn acknowledge(&mut self, actor: impl Into<String>) -> bool {
        if self.is_acknowledged() {
            return false;
        }
        self.acknowledged_by = Some(actor.into());
        self.acknowledged_at = Some(chrono::Utc::now());
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
