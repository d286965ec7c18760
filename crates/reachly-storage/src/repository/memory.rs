//! In-memory message store
//!
//! Backs tests and single-node development setups. Applies the same
//! lifecycle rules as the SQL implementation, via
//! `reachly_common::lifecycle::next_status`, under one lock so each event
//! is atomic with respect to concurrent events for the same message.

use crate::models::Message;
use crate::repository::messages::{EventOutcome, MessageStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reachly_common::lifecycle::next_status;
use reachly_common::types::{EngagementEvent, MessageId};
use reachly_common::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory message store
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<HashMap<MessageId, Message>>,
}

impl MemoryMessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_status(message: &mut Message, event: &EngagementEvent) {
        if let Some(next) = next_status(message.status_enum(), event) {
            message.status = next.as_str().to_string();
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn insert(&self, message: &Message) -> Result<()> {
        self.messages
            .write()
            .await
            .insert(message.id, message.clone());
        Ok(())
    }

    async fn mark_sent(
        &self,
        id: MessageId,
        instrumented_html: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        if message.status != "draft" {
            return Ok(EventOutcome::Ignored);
        }

        message.status = "sent".to_string();
        message.sent_at.get_or_insert(now);
        if let Some(html) = instrumented_html {
            message.body_html = Some(html.to_string());
        }
        message.updated_at = now;
        Ok(EventOutcome::Applied)
    }

    async fn mark_failed(&self, id: MessageId) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        if message.status != "draft" {
            return Ok(EventOutcome::Ignored);
        }

        message.status = "failed".to_string();
        message.updated_at = Utc::now();
        Ok(EventOutcome::Applied)
    }

    async fn record_open(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        message.open_count += 1;
        message.last_opened_at = Some(now);
        message.opened_at.get_or_insert(now);
        Self::apply_status(message, &EngagementEvent::Open);
        message.updated_at = now;
        Ok(EventOutcome::Applied)
    }

    async fn record_click(
        &self,
        id: MessageId,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        message.click_count += 1;
        message.last_clicked_at = Some(now);
        let mut clicks = message.clicks_vec();
        clicks.push(reachly_common::types::ClickEvent {
            url: url.to_string(),
            timestamp: now,
        });
        message.clicks = serde_json::to_value(clicks).unwrap_or_default();
        message.updated_at = now;
        Ok(EventOutcome::Applied)
    }

    async fn record_delivery(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        match next_status(message.status_enum(), &EngagementEvent::Delivery) {
            Some(next) => {
                message.status = next.as_str().to_string();
                message.delivered_at.get_or_insert(now);
                message.updated_at = now;
                Ok(EventOutcome::Applied)
            }
            None => Ok(EventOutcome::Ignored),
        }
    }

    async fn record_bounce(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        match next_status(message.status_enum(), &EngagementEvent::Bounce) {
            Some(next) => {
                message.status = next.as_str().to_string();
                message.updated_at = now;
                Ok(EventOutcome::Applied)
            }
            None => Ok(EventOutcome::Ignored),
        }
    }

    async fn record_reply(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return Ok(EventOutcome::UnknownMessage);
        };

        message.reply_count += 1;
        message.last_replied_at = Some(now);
        message.replied_at.get_or_insert(now);
        Self::apply_status(message, &EngagementEvent::Reply);
        message.updated_at = now;
        Ok(EventOutcome::Applied)
    }
}
