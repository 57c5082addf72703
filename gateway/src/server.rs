//! HTTP surface — accepts tool invocations and reporting requests
//!
//! Protocol concerns live here: body framing, caller identity extraction,
//! status codes and CORS. Everything past this module only sees the typed
//! pipeline boundary.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, warn};

use crate::config::GatewayConfig;
use crate::dispatch::{self, GatewayContext};
use crate::error::{ErrorEnvelope, ErrorKind};

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    operation: String,
    #[serde(default)]
    params: Value,
}

/// Build the gateway router
pub fn router(ctx: Arc<GatewayContext>, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/api/invoke", post(invoke))
        .route("/api/metrics", get(metrics))
        .route("/api/health", get(health))
        .layer(cors_layer(&config.cors.allowed_origin))
        .with_state(ctx)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        match allowed_origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!("Invalid cors.allowed_origin {allowed_origin:?}, allowing any origin");
                AllowOrigin::any()
            }
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn invoke(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = headers
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    let request: InvokeRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            // Framing problem, not an invocation: there is no operation to
            // attribute it to, so it bypasses the pipeline's accounting
            return error_response(ErrorEnvelope {
                success: false,
                error: ErrorKind::Validation,
                status: ErrorKind::Validation.status(),
                message: format!("invalid JSON body: {e}"),
                retry_after_seconds: None,
                detail: None,
            });
        }
    };

    let started = Instant::now();
    let started_at = Utc::now();

    // Run the pipeline in its own task so that even a panic inside it is
    // caught and classified instead of tearing down the connection
    let task_ctx = Arc::clone(&ctx);
    let operation = request.operation.clone();
    let params = request.params.clone();
    let task_caller = caller.clone();
    let joined = tokio::spawn(async move {
        dispatch::handle(&task_ctx, &operation, &params, &task_caller).await
    })
    .await;

    match joined {
        Ok(Ok(success)) => (StatusCode::OK, Json(success)).into_response(),
        Ok(Err(envelope)) => error_response(envelope),
        Err(join_err) => {
            error!("Invocation task failed: {join_err}");
            // The pipeline never reached a terminal state, so account for
            // the invocation here, exactly once
            error_response(dispatch::internal_failure(
                &ctx,
                &request.operation,
                &caller,
                &request.params,
                started,
                started_at,
                "invocation task failed unexpectedly".to_string(),
            ))
        }
    }
}

async fn metrics(State(ctx): State<Arc<GatewayContext>>) -> Json<Value> {
    Json(json!({
        "invocations": ctx.metrics.snapshot(),
        "rate_limiter": {
            "burst_capacity": ctx.limiter.configured_burst(),
            "per_minute": ctx.limiter.configured_per_minute(),
            "buckets": ctx.limiter.snapshot(),
        },
    }))
}

async fn health(State(ctx): State<Arc<GatewayContext>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend_url": ctx.backend.base_url(),
        "api_key_configured": ctx.backend.is_configured(),
    }))
}

fn error_response(envelope: ErrorEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let retry_after = envelope.retry_after_seconds;
    let mut response = (status, Json(envelope)).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    /// Serve the router on an ephemeral port; the backend address points at
    /// a closed port so backend calls fail fast with an upstream error
    async fn spawn_gateway(burst: u32) -> (String, Arc<GatewayContext>) {
        let mut config = GatewayConfig {
            rate_limit: RateLimitConfig {
                burst_capacity: burst,
                per_minute: 0.5,
                ..RateLimitConfig::default()
            },
            ..GatewayConfig::default()
        };
        config.backend.base_url = "http://127.0.0.1:9".to_string();
        config.backend.timeout_secs = 1;

        let ctx = Arc::new(GatewayContext::new(&config).unwrap());
        let app = router(Arc::clone(&ctx), &config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), ctx)
    }

    #[tokio::test]
    async fn test_malformed_body_yields_validation_envelope() {
        let (base, ctx) = spawn_gateway(10).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/invoke"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "validation");

        // Framing errors are not invocations and are not recorded
        assert_eq!(ctx.metrics.snapshot().total, 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_recorded_and_enveloped() {
        let (base, ctx) = spawn_gateway(10).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/invoke"))
            .json(&json!({ "operation": "reboot" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["detail"][0]["field"], "operation");

        assert_eq!(ctx.metrics.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after_header() {
        let (base, _ctx) = spawn_gateway(1).await;
        let client = reqwest::Client::new();

        // First call consumes the only token (and fails upstream, which is
        // irrelevant here); the second is denied at admission
        for expected in [502u16, 429] {
            let response = client
                .post(format!("{base}/api/invoke"))
                .header("x-caller-id", "agent-a")
                .json(&json!({ "operation": "list_watches" }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), expected);
            if expected == 429 {
                let retry = response
                    .headers()
                    .get("retry-after")
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .to_owned();
                let body: Value = response.json().await.unwrap();
                assert_eq!(retry, body["retry_after_seconds"].to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_callers_separated_by_header() {
        let (base, _ctx) = spawn_gateway(1).await;
        let client = reqwest::Client::new();

        for caller in ["agent-a", "agent-b"] {
            let response = client
                .post(format!("{base}/api/invoke"))
                .header("x-caller-id", caller)
                .json(&json!({ "operation": "list_watches" }))
                .send()
                .await
                .unwrap();
            // Each caller has its own full bucket, so neither is denied
            assert_eq!(response.status().as_u16(), 502, "caller {caller}");
        }
    }

    #[tokio::test]
    async fn test_metrics_endpoint_read_only() {
        let (base, _ctx) = spawn_gateway(10).await;
        let client = reqwest::Client::new();

        let first: Value = client
            .get(format!("{base}/api/metrics"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let second: Value = client
            .get(format!("{base}/api/metrics"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        // No invocations in between: identical snapshots
        assert_eq!(first, second);
        assert_eq!(first["invocations"]["total"], 0);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (base, _ctx) = spawn_gateway(10).await;

        let body: Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["api_key_configured"], false);
        assert_eq!(body["backend_url"], "http://127.0.0.1:9");
    }
}
