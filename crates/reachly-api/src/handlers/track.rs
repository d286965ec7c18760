//! Recipient-facing tracking handlers: open pixel and click redirect
//!
//! These endpoints are hit by mail clients and link-followers with
//! whatever a forwarded, cached, or forged URL contains. They are
//! error-opaque: a broken tracking pipeline must never break email
//! rendering or link navigation, so internal failures are logged and the
//! canonical response (pixel bytes, redirect) is returned anyway. The
//! status-update step runs under a short timeout for the same reason; a
//! timed-out update is dropped, not retried.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use reachly_storage::EventOutcome;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// 1x1 transparent GIF returned by the pixel endpoint
pub const TRACKING_PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, // 1x1, 2-color palette
    0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, // palette: black, white
    0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, // transparency
    0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // image descriptor
    0x02, 0x02, 0x44, 0x01, 0x00, // image data
    0x3B, // trailer
];

/// Query parameters for the click redirect
#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub url: Option<String>,
}

/// Open tracking pixel
///
/// GET /pixel/:token
///
/// Always returns the pixel bytes: invalid tokens, unknown messages, and
/// store failures are indistinguishable to the caller.
pub async fn open_pixel(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.verify_token(&token) {
        Some(payload) => {
            let tracker = state.tracker.clone();
            apply_bounded(&state, "open", async move {
                tracker.record_open(payload.message_id).await
            })
            .await;
        }
        None => {
            debug!("Pixel hit with invalid token");
        }
    }

    pixel_response()
}

/// Click tracking redirect
///
/// GET /redirect/:token?url=<encoded>
///
/// Missing or invalid parameters are a caller bug and safe to surface as
/// 400. Once the parameters check out, the tracking step itself is
/// error-opaque and the redirect is always issued.
pub async fn click_redirect(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> Response {
    let Some(target) = query.url.filter(|u| !u.is_empty()) else {
        return bad_request("Missing url parameter");
    };

    let parsed = match url::Url::parse(&target) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
        _ => return bad_request("Invalid redirect target"),
    };

    let Some(payload) = state.verify_token(&token) else {
        return bad_request("Invalid tracking token");
    };

    let tracker = state.tracker.clone();
    let url = parsed.to_string();
    let click_url = url.clone();
    apply_bounded(&state, "click", async move {
        tracker.record_click(payload.message_id, &click_url).await
    })
    .await;

    Redirect::to(&url).into_response()
}

/// Run a status update under the configured budget, swallowing every
/// failure mode
async fn apply_bounded<F>(state: &AppState, event: &str, fut: F)
where
    F: Future<Output = reachly_common::Result<EventOutcome>>,
{
    match tokio::time::timeout(state.update_timeout, fut).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            warn!(event, "Engagement update failed: {}", e);
        }
        Err(_) => {
            warn!(event, "Engagement update timed out, dropping");
        }
    }
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        TRACKING_PIXEL_GIF,
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("bad_request", message)),
    )
        .into_response()
}
