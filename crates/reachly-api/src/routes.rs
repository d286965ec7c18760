//! API routes

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, send, track, webhook};
use crate::ratelimit::{rate_limit_middleware, RateLimitContext};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let tracking_limit = RateLimitContext {
        limiter: state.limiter.clone(),
        policy: state.default_policy.clone(),
        scope: "default",
        enabled: state.rate_limit_enabled,
    };
    let send_limit = RateLimitContext {
        limiter: state.limiter.clone(),
        policy: state.send_policy.clone(),
        scope: "send",
        enabled: state.rate_limit_enabled,
    };

    // Health check routes (no rate limiting)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Public tracking surface: pixel, redirect, webhooks
    let tracking_routes = Router::new()
        .route("/pixel/:token", get(track::open_pixel))
        .route("/redirect/:token", get(track::click_redirect))
        .route("/webhook/reply/:token", post(webhook::reply_webhook))
        .route("/webhook", post(webhook::provider_webhook))
        .layer(middleware::from_fn_with_state(
            tracking_limit,
            rate_limit_middleware,
        ))
        .with_state(state.clone());

    // Send routes
    let api_v1 = Router::new()
        .route("/messages/:id/send", post(send::send_message))
        .layer(middleware::from_fn_with_state(
            send_limit,
            rate_limit_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .merge(tracking_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::track::TRACKING_PIXEL_GIF;
    use async_trait::async_trait;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use reachly_common::types::MessageId;
    use reachly_common::{Error, Result};
    use reachly_core::{
        EngagementTracker, LinkInstrumenter, MailTransport, OutboundEmail, RateLimiter,
        RatePolicy, TokenCodec,
    };
    use reachly_storage::{EventOutcome, MemoryMessageStore, Message, MessageStore};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    /// Store whose every method errors, for the never-fail-visibly tests
    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn get(&self, _id: MessageId) -> Result<Option<Message>> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn insert(&self, _message: &Message) -> Result<()> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn mark_sent(
            &self,
            _id: MessageId,
            _instrumented_html: Option<&str>,
            _now: DateTime<Utc>,
        ) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn mark_failed(&self, _id: MessageId) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn record_open(&self, _id: MessageId, _now: DateTime<Utc>) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn record_click(
            &self,
            _id: MessageId,
            _url: &str,
            _now: DateTime<Utc>,
        ) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn record_delivery(
            &self,
            _id: MessageId,
            _now: DateTime<Utc>,
        ) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn record_bounce(&self, _id: MessageId, _now: DateTime<Utc>) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
        async fn record_reply(&self, _id: MessageId, _now: DateTime<Utc>) -> Result<EventOutcome> {
            Err(Error::Database("store is down".to_string()))
        }
    }

    /// Transport that records instead of delivering
    #[derive(Default)]
    struct RecordingMailer {
        sent: tokio::sync::Mutex<Vec<OutboundEmail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingMailer {
        async fn deliver(&self, email: &OutboundEmail) -> Result<()> {
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    struct TestApp {
        server: TestServer,
        state: Arc<AppState>,
        mailer: Arc<RecordingMailer>,
    }

    fn build_app(store: Arc<dyn MessageStore>, rate_limited: Option<RatePolicy>) -> TestApp {
        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AppState {
            store: store.clone(),
            codec: TokenCodec::new("test-signing-secret").unwrap(),
            instrumenter: LinkInstrumenter::new("https://track.example.com"),
            tracker: EngagementTracker::new(store),
            limiter: Arc::new(RateLimiter::in_memory()),
            mailer: Some(mailer.clone()),
            db_pool: None,
            webhook_secret: Some("hook-secret".to_string()),
            update_timeout: Duration::from_millis(500),
            token_max_age: None,
            rate_limit_enabled: rate_limited.is_some(),
            default_policy: rate_limited.clone().unwrap_or_else(RatePolicy::api),
            send_policy: rate_limited.unwrap_or_else(RatePolicy::send),
        });

        TestApp {
            server: TestServer::new(create_router(state.clone())).unwrap(),
            state,
            mailer,
        }
    }

    async fn seed_message(store: &MemoryMessageStore, status: &str) -> Message {
        let mut message = Message::new_draft(
            Some(Uuid::new_v4()),
            Some(Uuid::new_v4()),
            Some("Quick question".to_string()),
            Some(r#"<body><a href="https://example.com/pricing">Pricing</a></body>"#.to_string()),
        );
        message.status = status.to_string();
        message.from_address = Some("rep@ourcrm.example".to_string());
        message.to_address = Some("prospect@example.com".to_string());
        store.insert(&message).await.unwrap();
        message
    }

    fn secret_header() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-webhook-secret"),
            HeaderValue::from_static("hook-secret"),
        )
    }

    #[tokio::test]
    async fn test_pixel_counts_open_and_returns_gif() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "sent").await;
        let app = build_app(store.clone(), None);

        let token = app.state.codec.issue(message.id, None, None);
        let response = app.server.get(&format!("/pixel/{}", token)).await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/gif");
        assert_eq!(response.headers()["cache-control"], "no-store");
        assert_eq!(response.as_bytes().as_ref(), TRACKING_PIXEL_GIF);

        let stored = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(stored.open_count, 1);
        assert_eq!(stored.status, "opened");
    }

    #[tokio::test]
    async fn test_pixel_returns_gif_for_garbage_token() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let response = app.server.get("/pixel/not-a-real-token").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/gif");
        assert!(!response.as_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_pixel_never_fails_visibly() {
        let app = build_app(Arc::new(FailingStore), None);

        let token = app.state.codec.issue(Uuid::new_v4(), None, None);
        let response = app.server.get(&format!("/pixel/{}", token)).await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/gif");
        assert_eq!(response.as_bytes().as_ref(), TRACKING_PIXEL_GIF);
    }

    #[tokio::test]
    async fn test_redirect_records_click() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "sent").await;
        let app = build_app(store.clone(), None);

        let token = app.state.codec.issue(message.id, None, None);
        let response = app
            .server
            .get(&format!("/redirect/{}", token))
            .add_query_param("url", "https://example.com/pricing")
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "https://example.com/pricing"
        );

        let stored = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(stored.click_count, 1);
        assert_eq!(stored.status, "sent");
        assert_eq!(stored.clicks_vec()[0].url, "https://example.com/pricing");
    }

    #[tokio::test]
    async fn test_redirect_missing_url_is_400() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let token = app.state.codec.issue(Uuid::new_v4(), None, None);
        let response = app.server.get(&format!("/redirect/{}", token)).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_redirect_rejects_forged_token() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let response = app
            .server
            .get("/redirect/forged-token")
            .add_query_param("url", "https://example.com")
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_redirect_rejects_non_http_target() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let token = app.state.codec.issue(Uuid::new_v4(), None, None);
        let response = app
            .server
            .get(&format!("/redirect/{}", token))
            .add_query_param("url", "javascript:alert(1)")
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_redirect_survives_store_failure() {
        let app = build_app(Arc::new(FailingStore), None);

        let token = app.state.codec.issue(Uuid::new_v4(), None, None);
        let response = app
            .server
            .get(&format!("/redirect/{}", token))
            .add_query_param("url", "https://example.com/pricing")
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "https://example.com/pricing"
        );
    }

    #[tokio::test]
    async fn test_reply_webhook_marks_replied() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "opened").await;
        let app = build_app(store.clone(), None);

        let token = app.state.codec.issue(message.id, None, None);
        let response = app
            .server
            .post(&format!("/webhook/reply/{}", token))
            .json(&serde_json::json!({
                "subject": "Re: Quick question",
                "body": "Tell me more",
                "from": "prospect@example.com",
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["success"], true);

        let stored = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "replied");
        assert_eq!(stored.reply_count, 1);
    }

    #[tokio::test]
    async fn test_reply_webhook_unknown_message_is_silent_success() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let token = app.state.codec.issue(Uuid::new_v4(), None, None);
        let response = app
            .server
            .post(&format!("/webhook/reply/{}", token))
            .json(&serde_json::json!({"body": "hello"}))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_reply_webhook_invalid_token_is_400() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let response = app
            .server
            .post("/webhook/reply/garbage")
            .json(&serde_json::json!({"body": "hello"}))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_webhook_rejects_bad_secret() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let response = app
            .server
            .post("/webhook")
            .add_header(
                HeaderName::from_static("x-webhook-secret"),
                HeaderValue::from_static("wrong"),
            )
            .json(&serde_json::json!({"event": "delivery"}))
            .await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_provider_webhook_authenticates_before_parsing() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        // Malformed body with a bad secret must still be a 401, not a 400
        let response = app
            .server
            .post("/webhook")
            .add_header(
                HeaderName::from_static("x-webhook-secret"),
                HeaderValue::from_static("wrong"),
            )
            .text("{not json")
            .await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_provider_webhook_unknown_message_is_404() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let (name, value) = secret_header();
        let response = app
            .server
            .post("/webhook")
            .add_header(name, value)
            .json(&serde_json::json!({
                "event": "delivery",
                "message_id": Uuid::new_v4(),
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_webhook_delivery_by_tracking_id() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "sent").await;
        let app = build_app(store.clone(), None);

        let token = app.state.codec.issue(message.id, None, None);
        let (name, value) = secret_header();
        let response = app
            .server
            .post("/webhook")
            .add_header(name, value)
            .json(&serde_json::json!({
                "event": "delivery",
                "tracking_id": token,
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["success"], true);

        let stored = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "delivered");
        assert!(stored.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_provider_webhook_bounce() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "sent").await;
        let app = build_app(store.clone(), None);

        let (name, value) = secret_header();
        let response = app
            .server
            .post("/webhook")
            .add_header(name, value)
            .json(&serde_json::json!({
                "event": "bounce",
                "message_id": message.id,
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let stored = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "bounced");
    }

    #[tokio::test]
    async fn test_send_instruments_and_marks_sent() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "draft").await;
        let app = build_app(store.clone(), None);

        let response = app
            .server
            .post(&format!("/api/v1/messages/{}/send", message.id))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "sent");
        let tracking_id = body["tracking_id"].as_str().unwrap().to_string();

        // Transport saw one instrumented email with the token attached
        let sent = app.mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tracking_id, tracking_id);
        assert!(sent[0].html.contains("/pixel/"));
        assert!(sent[0].html.contains("/redirect/"));

        // The token the mail carries verifies back to this message
        let payload = app.state.codec.verify(&tracking_id).unwrap();
        assert_eq!(payload.message_id, message.id);

        let stored = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "sent");
        assert!(stored.sent_at.is_some());
        assert!(stored.body_html.unwrap().contains("/pixel/"));
    }

    #[tokio::test]
    async fn test_send_conflict_when_not_draft() {
        let store = Arc::new(MemoryMessageStore::new());
        let message = seed_message(&store, "sent").await;
        let app = build_app(store.clone(), None);

        let response = app
            .server
            .post(&format!("/api/v1/messages/{}/send", message.id))
            .await;

        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_send_unknown_message_is_404() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        let response = app
            .server
            .post(&format!("/api/v1/messages/{}/send", Uuid::new_v4()))
            .await;

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit_denies_and_reports() {
        let policy = RatePolicy {
            window: Duration::from_secs(60),
            max: 2,
            skip_successful: false,
            skip_failed: false,
        };
        let app = build_app(Arc::new(MemoryMessageStore::new()), Some(policy));

        let first = app.server.get("/pixel/anything").await;
        assert_eq!(first.status_code(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-limit"], "2");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

        let second = app.server.get("/pixel/anything").await;
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let third = app.server.get("/pixel/anything").await;
        assert_eq!(third.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.headers()["x-ratelimit-remaining"], "0");
        assert!(third.headers().contains_key("x-ratelimit-reset"));
    }

    #[tokio::test]
    async fn test_skip_failed_policy_releases_failed_requests() {
        let policy = RatePolicy {
            window: Duration::from_secs(60),
            max: 1,
            skip_successful: false,
            skip_failed: true,
        };
        let app = build_app(Arc::new(MemoryMessageStore::new()), Some(policy));

        // Missing url -> 400, which this policy does not count
        for _ in 0..5 {
            let response = app.server.get("/redirect/sometoken").await;
            assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        }

        // The window is still open for a real request
        let response = app.server.get("/pixel/sometoken").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = build_app(Arc::new(MemoryMessageStore::new()), None);

        assert_eq!(app.server.get("/health").await.status_code(), StatusCode::OK);
        assert_eq!(
            app.server.get("/health/live").await.status_code(),
            StatusCode::OK
        );
        assert_eq!(
            app.server.get("/health/ready").await.status_code(),
            StatusCode::OK
        );
    }
}
