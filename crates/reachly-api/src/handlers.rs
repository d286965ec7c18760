//! API request handlers

pub mod health;
pub mod send;
pub mod track;
pub mod webhook;

use serde::Serialize;

/// Error body shared by the JSON endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}
