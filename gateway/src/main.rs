//! watchgate gateway — admission-controlled access to changedetection.io
//!
//! Accepts tool-style invocations over HTTP and forwards them to the
//! changedetection.io API with:
//! - Parameter validation and sanitization
//! - Per-caller token-bucket rate limiting
//! - Failure classification into a stable error envelope
//! - Metrics and one structured log event per invocation

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod backend;
mod config;
mod dispatch;
mod error;
mod event_log;
mod limiter;
mod metrics;
mod server;
mod validate;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    info!("watchgate gateway starting...");

    let config = config::load()?;
    if config.backend.api_key.is_empty() {
        warn!("CHANGEDETECTION_API_KEY not set — authenticated backend operations will fail");
    }
    info!(
        "Backend: {} (timeout {}s), rate limit: burst {} / {} per minute",
        config.backend.base_url,
        config.backend.timeout_secs,
        config.rate_limit.burst_capacity,
        config.rate_limit.per_minute,
    );

    let ctx = Arc::new(dispatch::GatewayContext::new(&config)?);
    let cancel = CancellationToken::new();

    // Periodic sweep of idle rate-limit buckets
    let sweep_ctx = Arc::clone(&ctx);
    let sweep_cancel = cancel.clone();
    let sweep_interval = Duration::from_secs(config.rate_limit.idle_eviction_secs.max(1));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sweep_cancel.cancelled() => {
                    debug!("Bucket sweeper shutting down");
                    break;
                }
                _ = tokio::time::sleep(sweep_interval) => {
                    let evicted = sweep_ctx.limiter.evict_idle();
                    if evicted > 0 {
                        debug!("Evicted {evicted} idle rate-limit buckets");
                    }
                }
            }
        }
    });

    let app = server::router(Arc::clone(&ctx), &config);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Gateway listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            cancel.cancel();
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
