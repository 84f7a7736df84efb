//! Shared HTTP client for the Gemini API

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Authenticated Gemini API client, shared by the embedder and the generator
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a new client. Fails if no API key is configured.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::config("GEMINI_API_KEY not set"));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint URL for a model method, e.g. `embedContent`
    pub fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    /// POST a JSON body; non-success statuses are classified into errors
    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        Ok(response)
    }

    /// Lightweight reachability check
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1beta/models", self.base_url);
        match self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

/// Map a failed HTTP exchange to the error taxonomy. Rate limiting and quota
/// exhaustion are transient; everything else is surfaced as-is.
pub fn classify_failure(status: StatusCode, body: &str) -> Error {
    let lower = body.to_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RESOURCE_EXHAUSTED")
        || lower.contains("quota")
    {
        return Error::Transient(format!("HTTP {}: {}", status.as_u16(), body));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::upstream(format!(
            "authentication failed (HTTP {}): {}",
            status.as_u16(),
            body
        ));
    }

    Error::upstream(format!("HTTP {}: {}", status.as_u16(), body))
}
