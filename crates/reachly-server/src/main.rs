//! Reachly - Engagement tracking server entry point

use anyhow::Result;
use reachly_api::AppState;
use reachly_common::config::Config;
use reachly_core::{
    EngagementTracker, LinkInstrumenter, MailTransport, RateLimiter, RatePolicy, SmtpMailer,
    TokenCodec,
};
use reachly_storage::{DatabasePool, DbMessageStore, MessageStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Reachly engagement tracking server...");

    // Load configuration; validation fails fast on a missing signing secret
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    // Token codec refuses an empty secret, independently of config validation
    let codec = TokenCodec::new(&config.tracking.signing_secret)?;
    let instrumenter = LinkInstrumenter::new(&config.tracking.public_base_url);

    let store: Arc<dyn MessageStore> = Arc::new(DbMessageStore::new(db_pool.clone()));
    let tracker = EngagementTracker::new(store.clone());
    let limiter = Arc::new(RateLimiter::in_memory());

    // Outbound transport is optional; the send endpoint reports 503 without it
    let mailer: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp) => {
            info!(relay = %smtp.host, "Outbound SMTP relay configured");
            Some(Arc::new(SmtpMailer::new(smtp)?))
        }
        None => {
            info!("No SMTP relay configured, send endpoint disabled");
            None
        }
    };

    let state = Arc::new(AppState {
        store,
        codec,
        instrumenter,
        tracker,
        limiter,
        mailer,
        db_pool: Some(db_pool),
        webhook_secret: config.tracking.webhook_secret.clone(),
        update_timeout: Duration::from_millis(config.tracking.update_timeout_ms),
        token_max_age: config.tracking.token_max_age_secs.map(Duration::from_secs),
        rate_limit_enabled: config.rate_limit.enabled,
        default_policy: RatePolicy::from_config(&config.rate_limit.default),
        send_policy: RatePolicy::from_config(&config.rate_limit.send),
    });

    let app = reachly_api::create_router(state);

    let bind = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on {}", bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Reachly server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reachly=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
