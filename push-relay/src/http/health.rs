//! `GET /health`: liveness plus a subscription count.

use crate::server::PushBridge;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Record process start for `uptime_seconds`. Later calls are no-ops.
pub fn init_start_time() {
    STARTED.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    STARTED.get().map_or(0, |t| t.elapsed().as_secs())
}

/// Body of the health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Seconds since [`init_start_time`].
    pub uptime_seconds: u64,
    /// Live subscriptions in the store, 0 if the store could not be read.
    pub subscriptions: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(bridge): Extension<Arc<PushBridge>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime_secs(),
        subscriptions: bridge.subscription_count().await,
    })
}
