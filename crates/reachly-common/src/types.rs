//! Common types for Reachly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for accounts (companies being prospected)
pub type AccountId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for messages
pub type MessageId = Uuid;

/// Unique identifier for threads
pub type ThreadId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Lifecycle status of an outreach message
///
/// The ordering is meaningful: a message never moves back to an earlier
/// stage once a later one is recorded. `Replied` branches off the main
/// line and absorbs later opens; `Bounced` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Draft,
    Sent,
    Delivered,
    Opened,
    Replied,
    Bounced,
    Failed,
}

impl MessageStatus {
    /// Position in the main lifecycle line, used for monotonicity checks
    pub fn rank(&self) -> u8 {
        match self {
            MessageStatus::Draft => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Opened => 3,
            MessageStatus::Replied => 4,
            MessageStatus::Bounced => 5,
            MessageStatus::Failed => 5,
        }
    }

    /// Parse a status from its stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(MessageStatus::Draft),
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "opened" => Some(MessageStatus::Opened),
            "replied" => Some(MessageStatus::Replied),
            "bounced" => Some(MessageStatus::Bounced),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Draft => "draft",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Opened => "opened",
            MessageStatus::Replied => "replied",
            MessageStatus::Bounced => "bounced",
            MessageStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Outbound => write!(f, "outbound"),
            Direction::Inbound => write!(f, "inbound"),
        }
    }
}

/// An engagement event applied against a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngagementEvent {
    /// Recipient rendered the email (tracking pixel loaded)
    Open,
    /// Recipient followed a wrapped link
    Click { url: String },
    /// Delivery confirmation from the mail provider
    Delivery,
    /// Inbound reply notification
    Reply,
    /// Hard bounce reported by the mail provider
    Bounce,
}

impl EngagementEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            EngagementEvent::Open => "open",
            EngagementEvent::Click { .. } => "click",
            EngagementEvent::Delivery => "delivery",
            EngagementEvent::Reply => "reply",
            EngagementEvent::Bounce => "bounce",
        }
    }
}

/// A recorded click against a wrapped link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub url: String,
    pub timestamp: Timestamp,
}

/// Content of an inbound reply, as posted by the mail provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyContent {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub headers: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            MessageStatus::Draft,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Opened,
            MessageStatus::Replied,
            MessageStatus::Bounced,
            MessageStatus::Failed,
        ] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MessageStatus::parse("unknown"), None);
    }

    #[test]
    fn test_status_ordering() {
        assert!(MessageStatus::Draft.rank() < MessageStatus::Sent.rank());
        assert!(MessageStatus::Sent.rank() < MessageStatus::Delivered.rank());
        assert!(MessageStatus::Delivered.rank() < MessageStatus::Opened.rank());
        assert!(MessageStatus::Opened.rank() < MessageStatus::Replied.rank());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EngagementEvent::Open.name(), "open");
        assert_eq!(
            EngagementEvent::Click {
                url: "https://example.com".to_string()
            }
            .name(),
            "click"
        );
    }
}
