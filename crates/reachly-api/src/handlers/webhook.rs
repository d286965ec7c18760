//! Webhook ingestion handlers
//!
//! Two server-facing entry points translate provider notifications into
//! engagement events. Unlike the recipient-facing pixel/redirect pair,
//! these are allowed to surface structured errors: the callers are
//! integrations that can read a status code.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reachly_common::types::{MessageId, ReplyContent};
use reachly_core::ReplyOutcome;
use reachly_storage::EventOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Header carrying the provider shared secret
const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Acknowledgement body for webhook callers
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookAck {
    fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
        })
    }

    fn with_message(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
        })
    }
}

/// Body of the token-addressed reply webhook
#[derive(Debug, Deserialize)]
pub struct ReplyWebhookRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub headers: serde_json::Value,
}

impl ReplyWebhookRequest {
    fn into_reply(self) -> ReplyContent {
        ReplyContent {
            subject: self.subject,
            body: self.body,
            from: self.from,
            headers: self.headers,
        }
    }
}

/// Token-addressed reply ingestion
///
/// POST /webhook/reply/:token
///
/// A valid token records the reply and synthesizes the threaded inbound
/// message. An unknown message id is a silent no-op success: the caller
/// holds a dangling token it cannot fix.
pub async fn reply_webhook(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(input): Json<ReplyWebhookRequest>,
) -> Response {
    let Some(payload) = state.verify_token(&token) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_token", "Invalid tracking token")),
        )
            .into_response();
    };

    match state
        .tracker
        .record_reply(payload.message_id, &input.into_reply())
        .await
    {
        Ok(_) => (StatusCode::OK, WebhookAck::ok()).into_response(),
        Err(e) => {
            error!("Reply webhook failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", e.to_string())),
            )
                .into_response()
        }
    }
}

/// Body of the provider webhook
#[derive(Debug, Deserialize)]
pub struct ProviderWebhookRequest {
    /// Event type: "reply", "delivery", or "bounce"
    pub event: String,
    /// Tracking token echoed from the outbound X-Tracking-ID header
    pub tracking_id: Option<String>,
    /// Raw message id, accepted as a fallback correlation
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub headers: serde_json::Value,
}

/// Provider-to-server event ingestion
///
/// POST /webhook
///
/// The shared secret header is checked before the body is even parsed;
/// nothing the payload contains can precede authentication.
pub async fn provider_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(ref expected) = state.webhook_secret else {
        warn!("Provider webhook called but no webhook secret is configured");
        return unauthorized();
    };

    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected.as_str()) {
        warn!("Provider webhook secret mismatch");
        return unauthorized();
    }

    let input: ProviderWebhookRequest = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "invalid_payload",
                    format!("Malformed webhook body: {}", e),
                )),
            )
                .into_response();
        }
    };

    let Some(message_id) = correlate(&state, &input) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "missing_correlation",
                "Neither a valid tracking_id nor a message_id was provided",
            )),
        )
            .into_response();
    };

    match input.event.as_str() {
        "reply" => {
            let reply = ReplyContent {
                subject: input.subject,
                body: input.body,
                from: input.from,
                headers: input.headers,
            };
            match state.tracker.record_reply(message_id, &reply).await {
                Ok(ReplyOutcome::Applied { .. }) => {
                    (StatusCode::OK, WebhookAck::with_message("reply recorded")).into_response()
                }
                Ok(ReplyOutcome::UnknownMessage) => not_found(message_id),
                Err(e) => internal_error(e),
            }
        }
        "delivery" => match state.tracker.record_delivery(message_id).await {
            Ok(EventOutcome::UnknownMessage) => not_found(message_id),
            Ok(_) => {
                (StatusCode::OK, WebhookAck::with_message("delivery recorded")).into_response()
            }
            Err(e) => internal_error(e),
        },
        "bounce" => match state.tracker.record_bounce(message_id).await {
            Ok(EventOutcome::UnknownMessage) => not_found(message_id),
            Ok(_) => (StatusCode::OK, WebhookAck::with_message("bounce recorded")).into_response(),
            Err(e) => internal_error(e),
        },
        other => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "unknown_event",
                format!("Unsupported event type: {}", other),
            )),
        )
            .into_response(),
    }
}

/// Resolve the message a provider event refers to. The echoed tracking
/// token is preferred; a raw message id is accepted as a fallback.
fn correlate(state: &AppState, input: &ProviderWebhookRequest) -> Option<MessageId> {
    if let Some(ref tracking_id) = input.tracking_id {
        if let Some(payload) = state.verify_token(tracking_id) {
            return Some(payload.message_id);
        }
        warn!("Provider webhook carried an unverifiable tracking_id");
    }

    input.message_id
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized", "Invalid webhook secret")),
    )
        .into_response()
}

fn not_found(message_id: MessageId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "not_found",
            format!("No message with id {}", message_id),
        )),
    )
        .into_response()
}

fn internal_error(e: reachly_common::Error) -> Response {
    error!("Provider webhook failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", e.to_string())),
    )
        .into_response()
}
