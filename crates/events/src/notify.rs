//! Notification router: pushes domain events to external channels.
//!
//! Delivery targets ride in the event payload (`webhook_url`,
//! `notify_email`), set by the orchestrator from the operation's
//! notification config, so the router itself stays stateless.

use tokio::sync::broadcast;

use crate::bus::DomainEvent;
use crate::delivery::email::{EmailConfig, EmailDelivery};
use crate::delivery::webhook::WebhookDelivery;

/// Background service that consumes the event bus and delivers events to
/// configured external channels.
pub struct NotificationRouter {
    webhook: WebhookDelivery,
    email: Option<EmailDelivery>,
}

impl NotificationRouter {
    /// Build a router. Email delivery is only enabled when SMTP is
    /// configured in the environment.
    pub fn new() -> Self {
        let email = EmailConfig::from_env().map(EmailDelivery::new);
        if email.is_none() {
            tracing::info!("SMTP not configured; email notifications disabled");
        }
        Self {
            webhook: WebhookDelivery::new(),
            email,
        }
    }

    /// Consume events until the bus is closed.
    pub async fn run(self, mut rx: broadcast::Receiver<DomainEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.route(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification router lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed; notification router stopping");
                    break;
                }
            }
        }
    }

    async fn route(&self, event: &DomainEvent) {
        if let Some(url) = event.payload.get("webhook_url").and_then(|v| v.as_str()) {
            if let Err(e) = self.webhook.deliver(url, event).await {
                tracing::error!(
                    url,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook notification failed",
                );
            }
        }

        if let Some(to) = event.payload.get("notify_email").and_then(|v| v.as_str()) {
            match &self.email {
                Some(mailer) => {
                    if let Err(e) = mailer.deliver(to, event).await {
                        tracing::error!(
                            to,
                            event_type = %event.event_type,
                            error = %e,
                            "Email notification failed",
                        );
                    }
                }
                None => {
                    tracing::debug!(to, "Email notification skipped; SMTP not configured");
                }
            }
        }
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
