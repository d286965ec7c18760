//! Rate-limit middleware
//!
//! Fronts route groups with a named policy. Reserves a slot before the
//! handler runs and settles it once the response status is known, so
//! policies can skip counting successes (auth) or failures. Standard
//! X-RateLimit-* headers are emitted on every response that passed
//! through the middleware, 429 included.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use reachly_core::{Decision, RateLimiter, RatePolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Middleware state: the shared limiter plus this route group's policy
#[derive(Clone)]
pub struct RateLimitContext {
    pub limiter: Arc<RateLimiter>,
    pub policy: RatePolicy,
    /// Policy scope; keeps bucket keys distinct across route groups that
    /// share one limiter
    pub scope: &'static str,
    pub enabled: bool,
}

/// Rate-limit middleware
pub async fn rate_limit_middleware(
    State(ctx): State<RateLimitContext>,
    request: Request,
    next: Next,
) -> Response {
    if !ctx.enabled {
        return next.run(request).await;
    }

    let identity = client_identity(&request);
    let key = format!("{}:{}", ctx.scope, identity);
    let (decision, reservation) = ctx.limiter.check(&key, &ctx.policy);

    if !decision.allowed {
        warn!(%identity, "Rate limit exceeded");
        // Denied attempts stay counted; the reservation is simply kept
        ctx.limiter.commit(reservation, true);

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "Too many requests, retry later",
            })),
        )
            .into_response();
        apply_headers(&mut response, &decision);
        return response;
    }

    let mut response = next.run(request).await;

    let status = response.status();
    let should_count = !(ctx.policy.skip_successful && status.is_success())
        && !(ctx.policy.skip_failed && (status.is_client_error() || status.is_server_error()));
    ctx.limiter.commit(reservation, should_count);

    apply_headers(&mut response, &decision);
    response
}

/// Extract the client identity a bucket is keyed by.
///
/// Prefers the first X-Forwarded-For hop (the service runs behind a
/// proxy), falling back to the socket peer address.
fn client_identity(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));

    let reset_at = chrono::Utc::now().timestamp() + decision.reset_after.as_secs() as i64;
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
}
