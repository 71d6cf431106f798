/// Errors that can occur on a generation call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request failed (network, DNS, timeout, etc.).
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The provider responded but the payload was unusable (empty content,
    /// malformed body).
    #[error("Unusable provider output: {0}")]
    UnusableOutput(String),
}

impl ProviderError {
    /// Rate-limit responses are worth a longer backoff than other failures.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 429, .. })
    }
}
