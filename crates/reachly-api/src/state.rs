//! Shared application state

use reachly_core::{
    EngagementTracker, LinkInstrumenter, MailTransport, RateLimiter, RatePolicy, TokenCodec,
};
use reachly_storage::{DatabasePool, MessageStore};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers
pub struct AppState {
    /// Message persistence collaborator
    pub store: Arc<dyn MessageStore>,
    /// Token signing/verification
    pub codec: TokenCodec,
    /// Outbound HTML instrumentation
    pub instrumenter: LinkInstrumenter,
    /// Engagement event application
    pub tracker: EngagementTracker,
    /// Rate limiter shared by all policies
    pub limiter: Arc<RateLimiter>,
    /// Outbound mail transport; absent when no relay is configured
    pub mailer: Option<Arc<dyn MailTransport>>,
    /// Database pool for readiness checks; absent with a memory store
    pub db_pool: Option<DatabasePool>,
    /// Shared secret for the provider webhook; absent disables it
    pub webhook_secret: Option<String>,
    /// Budget for the pixel/redirect status-update step
    pub update_timeout: Duration,
    /// Optional replay window for token verification
    pub token_max_age: Option<Duration>,
    /// Whether rate limiting is enabled
    pub rate_limit_enabled: bool,
    /// Broad policy for the public tracking surface
    pub default_policy: RatePolicy,
    /// Policy for outbound send actions
    pub send_policy: RatePolicy,
}

impl AppState {
    /// Verify a token under the configured expiry policy
    pub fn verify_token(&self, token: &str) -> Option<reachly_core::TokenPayload> {
        match self.token_max_age {
            Some(max_age) => self.codec.verify_with_max_age(token, max_age),
            None => self.codec.verify(token),
        }
    }
}
