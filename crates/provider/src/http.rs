//! HTTP client for the generation provider's completion endpoint.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ProviderError;
use crate::types::{GenerationOutput, GenerationRequest};
use crate::GenerationProvider;

/// Default per-call timeout. Generation calls are slow; this bounds the
/// worker suspension, not the typical case.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the HTTP provider client.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Base URL of the provider API, e.g. `https://api.provider.example`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    pub request_timeout: Duration,
}

impl HttpProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Wire shape of the provider's completion response.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
    input_tokens: u64,
    output_tokens: u64,
}

/// Production [`GenerationProvider`] backed by the provider's HTTP API.
pub struct HttpProvider {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HttpProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, ProviderError> {
        let url = format!("{}/v1/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                model = %request.model,
                "Provider call failed",
            );
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::UnusableOutput(e.to_string()))?;

        if body.content.trim().is_empty() {
            return Err(ProviderError::UnusableOutput(
                "provider returned empty content".to_string(),
            ));
        }

        Ok(GenerationOutput {
            content: body.content,
            input_tokens: body.input_tokens,
            output_tokens: body.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_carries_default_timeout() {
        let config = HttpProviderConfig::new("https://api.example", "key");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn client_builds() {
        let provider = HttpProvider::new(HttpProviderConfig::new("https://api.example", "key"));
        assert!(provider.is_ok());
    }
}
