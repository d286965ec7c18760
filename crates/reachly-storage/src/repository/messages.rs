//! Message store
//!
//! The persistence seam for the engagement pipeline. Counter bumps and
//! status writes are single guarded UPDATE statements so that concurrent
//! events for the same message never lose a count and a stale write can
//! never downgrade a status (increment-only counters, compare-and-set
//! status).

use crate::db::DatabasePool;
use crate::models::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reachly_common::types::MessageId;
use reachly_common::{Error, Result};

/// Outcome of applying an engagement event or lifecycle mark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The write landed
    Applied,
    /// The message exists but the event does not apply in its current state
    Ignored,
    /// No message with that id; callers decide whether this is a silent
    /// no-op (recipient-facing paths) or a 404 (provider webhook)
    UnknownMessage,
}

/// Message store trait
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Get a message by ID
    async fn get(&self, id: MessageId) -> Result<Option<Message>>;

    /// Insert a new message row (inbound reply synthesis, tests)
    async fn insert(&self, message: &Message) -> Result<()>;

    /// Mark a draft message sent, persisting the instrumented HTML.
    /// Guarded: only applies from `draft`; `sent_at` is first-writer-wins.
    async fn mark_sent(
        &self,
        id: MessageId,
        instrumented_html: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome>;

    /// Mark a draft message failed after a transport rejection
    async fn mark_failed(&self, id: MessageId) -> Result<EventOutcome>;

    /// Record an open: bump the counter, stamp first/last opened, advance
    /// status to `opened` unless the message already reached `replied`
    async fn record_open(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome>;

    /// Record a click: bump the counter and append to the click history;
    /// never touches status
    async fn record_click(
        &self,
        id: MessageId,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome>;

    /// Record a delivery confirmation. Guarded: `sent` -> `delivered` only.
    async fn record_delivery(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome>;

    /// Record a bounce. Guarded: `sent`/`delivered` -> `bounced` only.
    async fn record_bounce(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome>;

    /// Record a reply: bump the counter, stamp first/last replied, move any
    /// non-`replied` status to `replied`
    async fn record_reply(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome>;
}

/// PostgreSQL message store implementation
pub struct DbMessageStore {
    pool: DatabasePool,
}

impl DbMessageStore {
    /// Create a new store
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Distinguish "guard did not match" from "row does not exist" after a
    /// guarded update touched zero rows
    async fn outcome_for_missed_update(&self, id: MessageId) -> Result<EventOutcome> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if exists.0 {
            Ok(EventOutcome::Ignored)
        } else {
            Ok(EventOutcome::UnknownMessage)
        }
    }
}

#[async_trait]
impl MessageStore for DbMessageStore {
    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn insert(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, account_id, contact_id, thread_id, parent_message_id,
                direction, status, subject, body_html, body_text,
                from_address, to_address, open_count, click_count, reply_count,
                sent_at, delivered_at, opened_at, replied_at,
                last_opened_at, last_clicked_at, last_replied_at,
                clicks, metadata, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26
            )
            "#,
        )
        .bind(message.id)
        .bind(message.account_id)
        .bind(message.contact_id)
        .bind(message.thread_id)
        .bind(message.parent_message_id)
        .bind(&message.direction)
        .bind(&message.status)
        .bind(&message.subject)
        .bind(&message.body_html)
        .bind(&message.body_text)
        .bind(&message.from_address)
        .bind(&message.to_address)
        .bind(message.open_count)
        .bind(message.click_count)
        .bind(message.reply_count)
        .bind(message.sent_at)
        .bind(message.delivered_at)
        .bind(message.opened_at)
        .bind(message.replied_at)
        .bind(message.last_opened_at)
        .bind(message.last_clicked_at)
        .bind(message.last_replied_at)
        .bind(&message.clicks)
        .bind(&message.metadata)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_sent(
        &self,
        id: MessageId,
        instrumented_html: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = 'sent',
                sent_at = COALESCE(sent_at, $2),
                body_html = COALESCE($3, body_html),
                updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(instrumented_html)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            self.outcome_for_missed_update(id).await
        }
    }

    async fn mark_failed(&self, id: MessageId) -> Result<EventOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET status = 'failed', updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            self.outcome_for_missed_update(id).await
        }
    }

    async fn record_open(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                open_count = open_count + 1,
                last_opened_at = $2,
                opened_at = COALESCE(opened_at, $2),
                status = CASE WHEN status <> 'replied' THEN 'opened' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            Ok(EventOutcome::UnknownMessage)
        }
    }

    async fn record_click(
        &self,
        id: MessageId,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let entry = serde_json::json!([{ "url": url, "timestamp": now }]);

        let result = sqlx::query(
            r#"
            UPDATE messages SET
                click_count = click_count + 1,
                last_clicked_at = $2,
                clicks = clicks || $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(&entry)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            Ok(EventOutcome::UnknownMessage)
        }
    }

    async fn record_delivery(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = 'delivered',
                delivered_at = COALESCE(delivered_at, $2),
                updated_at = NOW()
            WHERE id = $1 AND status = 'sent'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            self.outcome_for_missed_update(id).await
        }
    }

    async fn record_bounce(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                status = 'bounced',
                updated_at = $2
            WHERE id = $1 AND status IN ('sent', 'delivered')
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            self.outcome_for_missed_update(id).await
        }
    }

    async fn record_reply(&self, id: MessageId, now: DateTime<Utc>) -> Result<EventOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET
                reply_count = reply_count + 1,
                last_replied_at = $2,
                replied_at = COALESCE(replied_at, $2),
                status = 'replied',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(EventOutcome::Applied)
        } else {
            Ok(EventOutcome::UnknownMessage)
        }
    }
}
