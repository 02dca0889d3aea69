//! REST client for the simulation job API.
//!
//! Wraps the HTTP endpoints (job creation, result retrieval, option
//! catalog) using [`reqwest`]. Performs no retries: failures are
//! surfaced to the caller, which decides how to react.

use std::collections::HashMap;

use async_trait::async_trait;
use choices_core::projector::SimulationTally;
use choices_core::ranking::RankingOption;
use choices_core::types::OptionId;

use crate::messages::CreateJobResponse;

/// Errors from the job API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body did not match the expected schema.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The request was rejected before being sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Request/response boundary to the remote simulation service.
///
/// A trait so the controller can be driven by a fake in tests.
#[async_trait]
pub trait SimulationApi: Send + Sync {
    /// Submit a ranked id sequence for simulation. Returns the
    /// server-assigned job id.
    async fn create_job(&self, ranked_ids: &[OptionId], runs: u32) -> Result<String, ApiError>;

    /// Fetch the final tally of a completed job.
    async fn fetch_results(&self, job_id: &str) -> Result<SimulationTally, ApiError>;
}

/// HTTP client for the simulation service.
pub struct JobClient {
    client: reqwest::Client,
    api_url: String,
}

impl JobClient {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:5000`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Fetch the option catalog in its natural server order.
    ///
    /// Sends a `GET /api/options` request.
    pub async fn fetch_options(&self) -> Result<Vec<RankingOption>, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/options", self.api_url))
            .send()
            .await?;

        Self::parse_body(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] carrying
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful response body against the expected schema.
    /// A body that fails to deserialize is a protocol error, not a
    /// transport error.
    async fn parse_body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl SimulationApi for JobClient {
    async fn create_job(&self, ranked_ids: &[OptionId], runs: u32) -> Result<String, ApiError> {
        if runs == 0 {
            return Err(ApiError::InvalidRequest("runs must be positive".into()));
        }

        let body = serde_json::json!({
            "user_ranking": ranked_ids,
            "runs": runs,
        });

        let response = self
            .client
            .post(format!("{}/api/job", self.api_url))
            .json(&body)
            .send()
            .await?;

        let created: CreateJobResponse = Self::parse_body(response).await?;

        tracing::info!(job_id = %created.job_id, runs, "Simulation job created");
        Ok(created.job_id)
    }

    async fn fetch_results(&self, job_id: &str) -> Result<SimulationTally, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/job/{}", self.api_url, job_id))
            .send()
            .await?;

        // Tally keys arrive string-encoded; they are original option
        // ids, not rank positions (see messages.rs).
        let raw: HashMap<String, u64> = Self::parse_body(response).await?;

        let mut tally = SimulationTally::with_capacity(raw.len());
        for (key, wins) in raw {
            let id: OptionId = key
                .parse()
                .map_err(|_| ApiError::Protocol(format!("Non-integer tally key: {key:?}")))?;
            tally.insert(id, wins);
        }

        tracing::debug!(job_id = %job_id, options = tally.len(), "Fetched simulation tally");
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_job_rejects_zero_runs() {
        let client = JobClient::new("http://localhost:0".into());
        let err = client.create_job(&[1, 2, 3], 0).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}
