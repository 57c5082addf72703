//! changedetection.io API client

use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::GatewayError;
use crate::validate::ValidatedParams;

/// How many bytes of an upstream error body are kept for diagnostics
const ERROR_BODY_LIMIT: usize = 512;

/// Failure reported by the backend call, before taxonomy classification
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout { timeout_secs } => GatewayError::UpstreamTimeout { timeout_secs },
            BackendError::Connection(message) => GatewayError::Upstream { message },
            BackendError::HttpStatus { status: 401, body } => GatewayError::Auth {
                message: if body.is_empty() {
                    "backend returned HTTP 401".to_string()
                } else {
                    body
                },
            },
            BackendError::HttpStatus { status: 404, body: _ } => GatewayError::NotFound {
                message: "backend returned HTTP 404".to_string(),
            },
            BackendError::HttpStatus { status, body } => GatewayError::Upstream {
                message: format!("backend returned HTTP {status}: {body}"),
            },
            BackendError::UnexpectedResponse(message) => GatewayError::Upstream { message },
        }
    }
}

/// Client for the changedetection.io REST API
pub struct ChangeDetectionClient {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl ChangeDetectionClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Forward one validated operation to the backend
    pub async fn invoke(&self, params: &ValidatedParams) -> Result<Value, BackendError> {
        match params {
            ValidatedParams::ListWatches => self.request(Method::GET, "/api/v1/watch", None).await,
            ValidatedParams::GetWatch { watch_id } => {
                self.request(Method::GET, &format!("/api/v1/watch/{watch_id}"), None)
                    .await
            }
            ValidatedParams::CreateWatch { url, tag, paused } => {
                let mut body = json!({ "url": url });
                if let Some(tag) = tag {
                    body["tag"] = json!(tag);
                }
                if let Some(paused) = paused {
                    body["paused"] = json!(paused);
                }
                self.request(Method::POST, "/api/v1/watch", Some(body)).await
            }
            ValidatedParams::DeleteWatch { watch_id } => {
                self.request(Method::DELETE, &format!("/api/v1/watch/{watch_id}"), None)
                    .await
            }
            ValidatedParams::TriggerCheck { watch_id } => {
                self.request(
                    Method::GET,
                    &format!("/api/v1/watch/{watch_id}/trigger"),
                    None,
                )
                .await
            }
            ValidatedParams::GetHistory { watch_id, limit } => {
                let path = match limit {
                    Some(limit) => format!("/api/v1/watch/{watch_id}/history?limit={limit}"),
                    None => format!("/api/v1/watch/{watch_id}/history"),
                };
                self.request(Method::GET, &path, None).await
            }
            ValidatedParams::SystemInfo => {
                self.request(Method::GET, "/api/v1/systeminfo", None).await
            }
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("backend request: {method} {url}");

        let mut request = self.client.request(method, &url);
        if !self.api_key.is_empty() {
            request = request.header("x-api-key", &self.api_key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::UnexpectedResponse(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }

        // Some endpoints reply with an empty body on success
        if text.trim().is_empty() {
            return Ok(json!({}));
        }

        serde_json::from_str(&text)
            .map_err(|e| BackendError::UnexpectedResponse(format!("invalid JSON from backend: {e}")))
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            // Connect failures and any other transport fault: the backend
            // was not reached or the exchange broke mid-flight
            BackendError::Connection(err.to_string())
        }
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_BODY_LIMIT {
        trimmed.to_string()
    } else {
        let mut end = ERROR_BODY_LIMIT;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    }
}
