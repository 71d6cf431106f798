//! In-memory alert registry.
//!
//! Alerts are raised by the cost ledger and safety monitor, listed and
//! acknowledged through the API, and never deleted.

use std::sync::{Arc, Mutex};

use lexigen_core::alert::{Alert, AlertKind};
use lexigen_events::{event_types, DomainEvent, EventBus};
use uuid::Uuid;

/// Registry of every alert raised since process start.
pub struct AlertRegistry {
    alerts: Mutex<Vec<Alert>>,
    bus: Arc<EventBus>,
}

impl AlertRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            bus,
        }
    }

    /// Record an alert and publish an `alert.raised` event.
    pub fn raise(&self, alert: Alert) -> Uuid {
        tracing::warn!(
            alert_id = %alert.id,
            kind = alert.kind.as_str(),
            operation_id = ?alert.operation_id,
            "{}",
            alert.message,
        );

        let event = DomainEvent::new(event_types::ALERT_RAISED).with_payload(serde_json::json!({
            "alert_id": alert.id,
            "kind": alert.kind.as_str(),
            "message": alert.message,
            "operation_id": alert.operation_id,
        }));
        let id = alert.id;

        self.alerts.lock().unwrap().push(alert);
        self.bus.publish(event);
        id
    }

    /// Convenience: build and raise an alert for an operation.
    pub fn raise_for_operation(
        &self,
        operation_id: Uuid,
        kind: AlertKind,
        message: impl Into<String>,
    ) -> Uuid {
        self.raise(Alert::new(kind, message).for_operation(operation_id))
    }

    /// All alerts, optionally filtered by acknowledgement state.
    pub fn list(&self, acknowledged: Option<bool>) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| acknowledged.is_none_or(|want| a.is_acknowledged() == want))
            .cloned()
            .collect()
    }

    /// Acknowledge an alert. Returns false when the alert does not exist or
    /// was already acknowledged.
    pub fn acknowledge(&self, alert_id: Uuid, actor: &str) -> bool {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => alert.acknowledge(actor),
            None => false,
        }
    }

    /// Count of unacknowledged alerts (dashboard).
    pub fn open_count(&self) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !a.is_acknowledged())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
