//! Lexigen event bus and notification infrastructure.
//!
//! Building blocks for the system-wide event stream:
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DomainEvent`] — the canonical event envelope.
//! - [`delivery`] — external delivery channels (webhook, email).
//! - [`NotificationRouter`] — background service that pushes operation
//!   lifecycle events to the initiator's configured channels.

pub mod bus;
pub mod delivery;
pub mod notify;

pub use bus::{event_types, DomainEvent, EventBus};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::webhook::WebhookDelivery;
pub use notify::NotificationRouter;
