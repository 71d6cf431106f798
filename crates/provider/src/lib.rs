//! Generation provider boundary.
//!
//! The metered external text-generation service is a collaborator; this
//! crate specifies its interface ([`GenerationProvider`]), ships the HTTP
//! client used in production, and a scriptable mock for tests.

pub mod error;
pub mod http;
pub mod mock;
pub mod types;

use crate::error::ProviderError;
use crate::types::{GenerationOutput, GenerationRequest};

/// One metered generation call.
///
/// The provider enforces its own per-call timeout; callers never abort an
/// in-flight call from outside.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationOutput, ProviderError>;
}
