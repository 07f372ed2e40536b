//! Web Push delivery endpoint.

use crate::error::{BridgeError, Result};
use crate::pipeline::PushHeaders;
use crate::server::PushBridge;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{header::CONTENT_ENCODING, HeaderMap};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub(super) struct WebhookResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct NotifyQuery {
    id: Option<String>,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn consume(
    bridge: &PushBridge,
    id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookResponse>> {
    let push_headers = PushHeaders {
        crypto_key: header(headers, "crypto-key"),
        encryption: header(headers, "encryption"),
        content_encoding: headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()),
    };

    let outcome = bridge.handle_webhook(id, &push_headers, body).await?;
    tracing::debug!(subscription_id = %id, ?outcome, "Webhook consumed");

    Ok(Json(WebhookResponse { success: true }))
}

/// `POST /subscriptions/:id`
pub(super) async fn webhook_handler(
    Extension(bridge): Extension<Arc<PushBridge>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    consume(&bridge, &id, &headers, &body).await
}

/// `POST /api/notify?id=...`
pub(super) async fn legacy_webhook_handler(
    Extension(bridge): Extension<Arc<PushBridge>>,
    Query(query): Query<NotifyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BridgeError::Validation("id query parameter is required".into()))?;
    consume(&bridge, &id, &headers, &body).await
}
