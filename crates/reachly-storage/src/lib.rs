//! Reachly Storage - Database abstraction
//!
//! This crate provides the persistence collaborator for Reachly: the
//! PostgreSQL pool, the message model, and the `MessageStore` seam the
//! engagement pipeline writes through.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
