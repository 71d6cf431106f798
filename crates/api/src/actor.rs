//! Caller identity extraction.
//!
//! Authentication is owned by an external identity layer; this surface
//! only needs the caller's identity for audit fields, carried in the
//! `x-actor-id` header it injects.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

/// Identity used when the header is absent (local development).
const DEFAULT_ACTOR: &str = "anonymous";

/// The caller's identity, from the `x-actor-id` request header.
#[derive(Debug, Clone)]
pub struct ActorId(pub String);

impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ACTOR)
            .to_string();
        Ok(ActorId(actor))
    }
}
