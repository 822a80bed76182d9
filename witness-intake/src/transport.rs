//! Network submission of sealed payloads

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TransmissionError;
use crate::types::SubmissionPayload;

/// Sends one payload to one endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the payload; a 2xx response with a JSON body is the only success
    async fn send(
        &self,
        endpoint: &str,
        payload: &SubmissionPayload,
    ) -> Result<serde_json::Value, TransmissionError>;
}

/// JSON-over-HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Client with an overall request timeout
    pub fn new(timeout: Duration) -> Result<Self, TransmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransmissionError::Http(format!("Failed to build client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: &SubmissionPayload,
    ) -> Result<serde_json::Value, TransmissionError> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| TransmissionError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransmissionError::Http(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            let snippet = String::from_utf8_lossy(&body[..body.len().min(200)]).to_string();
            warn!("Submission rejected with status {}", status);
            return Err(TransmissionError::Status {
                status: status.as_u16(),
                snippet,
            });
        }

        let json: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            let snippet = String::from_utf8_lossy(&body[..body.len().min(200)]);
            TransmissionError::InvalidResponse(format!("{} (body: {})", e, snippet))
        })?;

        debug!("Submission accepted with status {}", status);
        Ok(json)
    }
}
