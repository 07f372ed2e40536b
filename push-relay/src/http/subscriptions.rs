//! Subscription create and delete endpoints.

use crate::error::{BridgeError, Result};
use crate::server::PushBridge;
use axum::body::Bytes;
use axum::http::{header::HOST, HeaderMap};
use axum::{Extension, Json};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// Body of a create request. Legacy field names are accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateRequest {
    #[serde(alias = "fcmToken")]
    device_token: String,
    #[serde(alias = "mastodonToken")]
    instance_token: String,
    #[serde(alias = "mastodonInstance")]
    instance_origin: String,
}

/// Body of a delete request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeleteRequest {
    subscription_id: String,
    #[serde(alias = "mastodonToken")]
    instance_token: String,
    #[serde(alias = "mastodonInstance")]
    instance_origin: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateResponse {
    message: &'static str,
    subscription_id: String,
    reused: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct DeleteResponse {
    message: &'static str,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| BridgeError::Validation(format!("invalid JSON body: {e}")))
}

/// Base URL the instance will post deliveries to.
fn endpoint_base(bridge: &PushBridge, headers: &HeaderMap) -> Result<String> {
    if let Some(url) = &bridge.config().server.public_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| BridgeError::MalformedRequest("missing Host header".into()))?;
    Ok(format!("https://{host}"))
}

/// `POST /subscriptions`
pub(super) async fn create_handler(
    Extension(bridge): Extension<Arc<PushBridge>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateResponse>> {
    let request: CreateRequest = parse_body(&body)?;
    let base = endpoint_base(&bridge, &headers)?;

    let subscribed = bridge
        .subscribe(
            &request.device_token,
            &request.instance_token,
            &request.instance_origin,
            &base,
        )
        .await?;

    Ok(Json(CreateResponse {
        message: "Subscription created successfully.",
        subscription_id: subscribed.id.to_string(),
        reused: subscribed.reused,
    }))
}

/// `POST /subscriptions/delete` and `DELETE /subscriptions`
pub(super) async fn delete_handler(
    Extension(bridge): Extension<Arc<PushBridge>>,
    body: Bytes,
) -> Result<Json<DeleteResponse>> {
    let request: DeleteRequest = parse_body(&body)?;
    if request.subscription_id.trim().is_empty() {
        return Err(BridgeError::Validation("subscriptionId is required".into()));
    }

    bridge
        .unsubscribe(
            request.subscription_id.trim(),
            &request.instance_token,
            &request.instance_origin,
        )
        .await?;

    Ok(Json(DeleteResponse {
        message: "Unsubscribed successfully.",
    }))
}
