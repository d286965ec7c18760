//! Engagement event application
//!
//! Translates verified engagement events into message store writes. The
//! store enforces the lifecycle atomically (guarded status writes,
//! increment-only counters); this layer owns the surrounding behavior:
//! the unknown-message no-op, inbound reply synthesis, and logging.

use chrono::Utc;
use reachly_common::types::{MessageId, ReplyContent};
use reachly_common::Result;
use reachly_storage::{EventOutcome, Message, MessageStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a reply event
#[derive(Debug)]
pub enum ReplyOutcome {
    /// Reply recorded; the synthesized inbound message is threaded to the
    /// original
    Applied { inbound: Message },
    /// No message with that id; the event was discarded
    UnknownMessage,
}

/// Applies engagement events against the message store
#[derive(Clone)]
pub struct EngagementTracker {
    store: Arc<dyn MessageStore>,
}

impl EngagementTracker {
    /// Create a tracker over a message store
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Record an open event
    pub async fn record_open(&self, message_id: MessageId) -> Result<EventOutcome> {
        let outcome = self.store.record_open(message_id, Utc::now()).await?;
        self.log_outcome("open", message_id, outcome);
        Ok(outcome)
    }

    /// Record a click event against a target URL
    pub async fn record_click(&self, message_id: MessageId, url: &str) -> Result<EventOutcome> {
        let outcome = self.store.record_click(message_id, url, Utc::now()).await?;
        self.log_outcome("click", message_id, outcome);
        Ok(outcome)
    }

    /// Record a delivery confirmation
    pub async fn record_delivery(&self, message_id: MessageId) -> Result<EventOutcome> {
        let outcome = self.store.record_delivery(message_id, Utc::now()).await?;
        self.log_outcome("delivery", message_id, outcome);
        Ok(outcome)
    }

    /// Record a bounce
    pub async fn record_bounce(&self, message_id: MessageId) -> Result<EventOutcome> {
        let outcome = self.store.record_bounce(message_id, Utc::now()).await?;
        self.log_outcome("bounce", message_id, outcome);
        Ok(outcome)
    }

    /// Record a reply and synthesize the threaded inbound message
    pub async fn record_reply(
        &self,
        message_id: MessageId,
        reply: &ReplyContent,
    ) -> Result<ReplyOutcome> {
        let outcome = self.store.record_reply(message_id, Utc::now()).await?;
        if outcome == EventOutcome::UnknownMessage {
            // Dangling tokens are discarded rather than surfaced; the
            // caller cannot fix them. Logged in case someone is probing
            // the token space.
            debug!(%message_id, "Reply event for unknown message, discarding");
            return Ok(ReplyOutcome::UnknownMessage);
        }

        let Some(parent) = self.store.get(message_id).await? else {
            warn!(%message_id, "Message disappeared between reply write and read");
            return Ok(ReplyOutcome::UnknownMessage);
        };

        let inbound = parent.inbound_reply(reply);
        self.store.insert(&inbound).await?;

        info!(
            %message_id,
            inbound_id = %inbound.id,
            thread_id = ?inbound.thread_id,
            "Recorded reply and created inbound message"
        );

        Ok(ReplyOutcome::Applied { inbound })
    }

    fn log_outcome(&self, event: &str, message_id: MessageId, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Applied => {
                debug!(%message_id, event, "Engagement event applied");
            }
            EventOutcome::Ignored => {
                debug!(%message_id, event, "Engagement event ignored in current state");
            }
            EventOutcome::UnknownMessage => {
                debug!(%message_id, event, "Engagement event for unknown message, discarding");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reachly_storage::MemoryMessageStore;
    use uuid::Uuid;

    async fn tracker_with_sent_message() -> (EngagementTracker, MessageId) {
        let store = Arc::new(MemoryMessageStore::new());
        let mut message = Message::new_draft(
            Some(Uuid::new_v4()),
            None,
            Some("Quick question".to_string()),
            Some("<p>Hello</p>".to_string()),
        );
        message.status = "sent".to_string();
        message.from_address = Some("rep@ourcrm.example".to_string());
        let id = message.id;
        store.insert(&message).await.unwrap();
        (EngagementTracker::new(store), id)
    }

    #[tokio::test]
    async fn test_open_reply_open_scenario() {
        let (tracker, id) = tracker_with_sent_message().await;

        tracker.record_open(id).await.unwrap();
        tracker.record_open(id).await.unwrap();

        let message = tracker.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.open_count, 2);
        assert_eq!(message.status, "opened");

        let outcome = tracker
            .record_reply(id, &ReplyContent::default())
            .await
            .unwrap();
        assert!(matches!(outcome, ReplyOutcome::Applied { .. }));

        let message = tracker.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.status, "replied");

        // A late open still counts but must not downgrade the status
        tracker.record_open(id).await.unwrap();

        let message = tracker.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.status, "replied");
        assert_eq!(message.open_count, 3);
    }

    #[tokio::test]
    async fn test_reply_synthesizes_threaded_inbound() {
        let (tracker, id) = tracker_with_sent_message().await;

        let reply = ReplyContent {
            subject: Some("Re: Quick question".to_string()),
            body: Some("Tell me more".to_string()),
            from: Some("prospect@example.com".to_string()),
            headers: serde_json::json!({"message-id": "<abc@example.com>"}),
        };

        let outcome = tracker.record_reply(id, &reply).await.unwrap();
        let ReplyOutcome::Applied { inbound } = outcome else {
            panic!("expected applied outcome");
        };

        assert_eq!(inbound.parent_message_id, Some(id));
        assert_eq!(inbound.thread_id, Some(id));
        assert_eq!(inbound.direction, "inbound");
        assert_eq!(inbound.from_address, Some("prospect@example.com".to_string()));

        // The synthesized record is persisted
        let stored = tracker.store.get(inbound.id).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_unknown_message_is_silent() {
        let store = Arc::new(MemoryMessageStore::new());
        let tracker = EngagementTracker::new(store);
        let id = Uuid::new_v4();

        assert_eq!(
            tracker.record_open(id).await.unwrap(),
            EventOutcome::UnknownMessage
        );
        assert!(matches!(
            tracker
                .record_reply(id, &ReplyContent::default())
                .await
                .unwrap(),
            ReplyOutcome::UnknownMessage
        ));
    }

    #[tokio::test]
    async fn test_click_counts_without_status_change() {
        let (tracker, id) = tracker_with_sent_message().await;

        tracker
            .record_click(id, "https://example.com/pricing")
            .await
            .unwrap();

        let message = tracker.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.status, "sent");
        assert_eq!(message.click_count, 1);
        assert_eq!(message.clicks_vec().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_then_bounce_guards() {
        let (tracker, id) = tracker_with_sent_message().await;

        assert_eq!(
            tracker.record_delivery(id).await.unwrap(),
            EventOutcome::Applied
        );
        // Second confirmation has nothing to do
        assert_eq!(
            tracker.record_delivery(id).await.unwrap(),
            EventOutcome::Ignored
        );
        // Bounce still applies from delivered
        assert_eq!(
            tracker.record_bounce(id).await.unwrap(),
            EventOutcome::Applied
        );

        let message = tracker.store.get(id).await.unwrap().unwrap();
        assert_eq!(message.status, "bounced");
    }
}
