//! Database models

use chrono::{DateTime, Utc};
use reachly_common::types::{
    AccountId, ClickEvent, ContactId, Direction, MessageId, MessageStatus, ReplyContent, ThreadId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Outreach message model
///
/// The lifecycle subset (`status`, first-writer-wins timestamps, counters)
/// is owned by the engagement pipeline once the message leaves `draft`;
/// everything else is written by the CRUD layer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub account_id: Option<AccountId>,
    pub contact_id: Option<ContactId>,
    pub thread_id: Option<ThreadId>,
    pub parent_message_id: Option<MessageId>,
    pub direction: String,
    pub status: String,
    pub subject: Option<String>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub open_count: i32,
    pub click_count: i32,
    pub reply_count: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub last_replied_at: Option<DateTime<Utc>>,
    /// Click history: array of `{url, timestamp}` objects
    pub clicks: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Get the lifecycle status enum; unknown stored values read as `Draft`
    pub fn status_enum(&self) -> MessageStatus {
        MessageStatus::parse(&self.status).unwrap_or(MessageStatus::Draft)
    }

    /// Get the click history as a vector
    pub fn clicks_vec(&self) -> Vec<ClickEvent> {
        serde_json::from_value(self.clicks.clone()).unwrap_or_default()
    }

    /// Build a new draft message. Used by tests and the inbound path;
    /// CRUD creation of drafts is the host application's concern.
    pub fn new_draft(
        contact_id: Option<ContactId>,
        account_id: Option<AccountId>,
        subject: Option<String>,
        body_html: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            account_id,
            contact_id,
            thread_id: None,
            parent_message_id: None,
            direction: Direction::Outbound.to_string(),
            status: MessageStatus::Draft.as_str().to_string(),
            subject,
            body_html,
            body_text: None,
            from_address: None,
            to_address: None,
            open_count: 0,
            click_count: 0,
            reply_count: 0,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            replied_at: None,
            last_opened_at: None,
            last_clicked_at: None,
            last_replied_at: None,
            clicks: serde_json::Value::Array(vec![]),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Synthesize the inbound record for a reply to this message, threaded
    /// to it via `thread_id`/`parent_message_id`.
    pub fn inbound_reply(&self, reply: &ReplyContent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            account_id: self.account_id,
            contact_id: self.contact_id,
            thread_id: Some(self.thread_id.unwrap_or(self.id)),
            parent_message_id: Some(self.id),
            direction: Direction::Inbound.to_string(),
            status: MessageStatus::Replied.as_str().to_string(),
            subject: reply.subject.clone(),
            body_html: None,
            body_text: reply.body.clone(),
            from_address: reply.from.clone(),
            to_address: self.from_address.clone(),
            open_count: 0,
            click_count: 0,
            reply_count: 0,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            replied_at: None,
            last_opened_at: None,
            last_clicked_at: None,
            last_replied_at: None,
            clicks: serde_json::Value::Array(vec![]),
            metadata: serde_json::json!({ "headers": reply.headers }),
            created_at: now,
            updated_at: now,
        }
    }
}
