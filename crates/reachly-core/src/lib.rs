//! Reachly Core - Engagement tracking pipeline
//!
//! This crate provides the core engagement machinery for Reachly:
//! tracking token issuance/verification, outbound HTML instrumentation,
//! rate limiting, engagement event application, and outbound mail.

pub mod engagement;
pub mod mailer;
pub mod ratelimit;
pub mod tracking;

pub use engagement::{EngagementTracker, ReplyOutcome};
pub use mailer::{MailTransport, OutboundEmail, SmtpMailer};
pub use ratelimit::{BucketStore, Decision, MemoryBucketStore, RateLimiter, RatePolicy, Reservation};
pub use tracking::{LinkInstrumenter, TokenCodec, TokenPayload};
