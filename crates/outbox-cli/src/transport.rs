//! HTTP transport for the remote submission endpoint.
//!
//! Posts one operation per request and classifies the response: transport
//! errors, 408/429, and 5xx are retryable; any other non-success status is a
//! permanent rejection.

use async_trait::async_trait;
use reqwest::StatusCode;

use outbox_core::{QueueItem, SubmitError, Transport};

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, item: &QueueItem) -> Result<(), SubmitError> {
        let body = serde_json::json!({
            "id": item.id.to_string_repr(),
            "operation_type": item.operation_type,
            "payload": item.payload,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", &item.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmitError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let message = if detail.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, detail)
        };

        if is_retryable_status(status) {
            Err(SubmitError::Retryable(message))
        } else {
            Err(SubmitError::Permanent(message))
        }
    }
}
