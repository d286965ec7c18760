//! Reachly API - HTTP surface
//!
//! This crate provides the HTTP surface for Reachly: the public
//! webhook-ingestion endpoints (pixel, redirect, reply), the
//! provider-to-server webhook, the outbound send endpoint, and the
//! rate-limit middleware fronting them.

pub mod handlers;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
