//! Send handler
//!
//! The head of the tracking control flow: instruments a draft message's
//! HTML, delivers it through the SMTP relay with the tracking token in
//! X-Tracking-ID, and marks the message sent. The sent mark is a
//! compare-and-set from `draft`, so two racing sends cannot both claim a
//! message.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use reachly_core::OutboundEmail;
use reachly_storage::EventOutcome;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Response after a successful send
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub status: String,
    pub tracking_id: String,
}

/// Send a draft message
///
/// POST /api/v1/messages/:id/send
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SendMessageResponse>), (StatusCode, Json<ErrorResponse>)> {
    let Some(ref mailer) = state.mailer else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "no_transport",
                "No SMTP relay is configured",
            )),
        ));
    };

    let message = state
        .store
        .get(id)
        .await
        .map_err(|e| {
            error!("Failed to load message {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", "Failed to load message")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    "not_found",
                    format!("No message with id {}", id),
                )),
            )
        })?;

    if message.status != "draft" {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "not_draft",
                format!("Message is {}, only drafts can be sent", message.status),
            )),
        ));
    }

    let (Some(from), Some(to)) = (message.from_address.clone(), message.to_address.clone()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "validation_error",
                "Message needs both a sender and a recipient address",
            )),
        ));
    };

    let token = state
        .codec
        .issue(message.id, message.contact_id, message.account_id);
    let instrumented = state
        .instrumenter
        .instrument(message.body_html.as_deref().unwrap_or_default(), &token);

    let email = OutboundEmail {
        from,
        to,
        subject: message.subject.clone().unwrap_or_default(),
        html: instrumented.clone(),
        text: message.body_text.clone(),
        tracking_id: token.clone(),
    };

    if let Err(e) = mailer.deliver(&email).await {
        error!("Delivery failed for message {}: {}", id, e);
        if let Err(mark_err) = state.store.mark_failed(id).await {
            error!("Failed to mark message {} failed: {}", id, mark_err);
        }
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new("mail_error", e.to_string())),
        ));
    }

    match state.store.mark_sent(id, Some(&instrumented), Utc::now()).await {
        Ok(EventOutcome::Applied) => {}
        Ok(outcome) => {
            warn!(
                "Message {} delivered but sent mark was not applied ({:?})",
                id, outcome
            );
        }
        Err(e) => {
            error!("Failed to mark message {} sent: {}", id, e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "internal_error",
                    "Delivered but failed to record the send",
                )),
            ));
        }
    }

    Ok((
        StatusCode::OK,
        Json(SendMessageResponse {
            message_id: id,
            status: "sent".to_string(),
            tracking_id: token,
        }),
    ))
}
