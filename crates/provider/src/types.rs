//! Request/response types crossing the provider boundary.

use serde::{Deserialize, Serialize};

/// Input to one generation call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// What a successful generation call returns: the content plus the token
/// counts the cost accounting is derived from.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationOutput {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
