//! Invocation pipeline: validate → admit → execute → account
//!
//! Every invocation ends in exactly one terminal state, and every terminal
//! state records metrics and emits one structured event, with duration
//! measured from receipt. A validation failure never reaches the rate
//! limiter, so malformed requests cannot drain a caller's token budget.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

use crate::backend::ChangeDetectionClient;
use crate::config::GatewayConfig;
use crate::error::{ErrorEnvelope, GatewayError};
use crate::event_log::EventLog;
use crate::limiter::{Admission, RateLimiter};
use crate::metrics::{MetricsCollector, Outcome};
use crate::validate::Validator;

/// Everything one invocation needs, constructed once at startup and shared.
/// Registries start empty; there is no teardown beyond process exit.
pub struct GatewayContext {
    pub validator: Validator,
    pub limiter: RateLimiter,
    pub metrics: MetricsCollector,
    pub events: EventLog,
    pub backend: ChangeDetectionClient,
}

impl GatewayContext {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            validator: Validator::new(&config.validation),
            limiter: RateLimiter::new(&config.rate_limit),
            metrics: MetricsCollector::new(),
            events: EventLog::new(&config.logging),
            backend: ChangeDetectionClient::new(&config.backend)?,
        })
    }
}

/// Ephemeral record of one invocation, consumed by metrics and the event log
pub struct InvocationRecord {
    pub request_id: String,
    pub operation: String,
    pub caller: String,
    pub started_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub params: Value,
}

/// Returned for every invocation that reaches a clean result
#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    /// Always true; mirrors the error envelope
    pub success: bool,
    pub result: Value,
    pub request_id: String,
    pub duration_ms: u64,
}

/// Run one invocation through the full pipeline
pub async fn handle(
    ctx: &GatewayContext,
    operation: &str,
    raw_params: &Value,
    caller: &str,
) -> Result<SuccessEnvelope, ErrorEnvelope> {
    let started = Instant::now();
    let started_at = Utc::now();
    let request_id = Uuid::new_v4().to_string();

    let validated = match ctx.validator.validate(operation, raw_params) {
        Ok(v) => v,
        Err(violations) => {
            return Err(fail(
                ctx,
                request_id,
                operation,
                caller,
                raw_params,
                started,
                started_at,
                GatewayError::Validation { violations },
            ));
        }
    };
    // Canonical name from the typed params for everything past validation
    let operation = validated.operation();

    if let Admission::Denied {
        retry_after_seconds,
    } = ctx.limiter.try_acquire(caller, 1.0)
    {
        return Err(fail(
            ctx,
            request_id,
            operation,
            caller,
            raw_params,
            started,
            started_at,
            GatewayError::RateLimited {
                retry_after_seconds,
            },
        ));
    }

    match ctx.backend.invoke(&validated).await {
        Ok(result) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            finish(
                ctx,
                InvocationRecord {
                    request_id: request_id.clone(),
                    operation: operation.to_string(),
                    caller: caller.to_string(),
                    started_at,
                    outcome: Outcome::Success,
                    duration_ms,
                    params: raw_params.clone(),
                },
            );
            Ok(SuccessEnvelope {
                success: true,
                result,
                request_id,
                duration_ms,
            })
        }
        Err(backend_err) => Err(fail(
            ctx,
            request_id,
            operation,
            caller,
            raw_params,
            started,
            started_at,
            backend_err.into(),
        )),
    }
}

/// Account for a fault that escaped the pipeline itself (e.g. a panic in a
/// spawned invocation task). The regular paths never reach this; it exists
/// so that even an unexpected fault produces a classified envelope and a
/// metrics record.
pub fn internal_failure(
    ctx: &GatewayContext,
    operation: &str,
    caller: &str,
    raw_params: &Value,
    started: Instant,
    started_at: DateTime<Utc>,
    message: String,
) -> ErrorEnvelope {
    fail(
        ctx,
        Uuid::new_v4().to_string(),
        operation,
        caller,
        raw_params,
        started,
        started_at,
        GatewayError::Internal { message },
    )
}

#[allow(clippy::too_many_arguments)]
fn fail(
    ctx: &GatewayContext,
    request_id: String,
    operation: &str,
    caller: &str,
    raw_params: &Value,
    started: Instant,
    started_at: DateTime<Utc>,
    error: GatewayError,
) -> ErrorEnvelope {
    let outcome = match &error {
        GatewayError::Validation { .. } => Outcome::ValidationError,
        GatewayError::RateLimited { .. } => Outcome::RateLimited,
        GatewayError::Internal { .. } => Outcome::InternalError,
        GatewayError::Auth { .. }
        | GatewayError::NotFound { .. }
        | GatewayError::UpstreamTimeout { .. }
        | GatewayError::Upstream { .. } => Outcome::UpstreamError,
    };
    finish(
        ctx,
        InvocationRecord {
            request_id,
            operation: operation.to_string(),
            caller: caller.to_string(),
            started_at,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            params: raw_params.clone(),
        },
    );
    error.into_envelope()
}

fn finish(ctx: &GatewayContext, record: InvocationRecord) {
    ctx.metrics
        .record(&record.operation, record.outcome, record.duration_ms);
    ctx.events.emit(&record);
}
