//! Message lifecycle rules
//!
//! The single source of truth for which engagement events move a message
//! to which status. Persistence implementations must apply these rules
//! atomically (guarded status writes, increment-only counters) so that
//! concurrent events cannot downgrade a status or lose a count.

use crate::types::{EngagementEvent, MessageStatus};

/// Compute the status an event moves a message to, if any.
///
/// Returns `None` when the event leaves the status untouched. Counters and
/// "last event" timestamps update regardless of the returned value; this
/// function only governs the `status` column.
///
/// Rules:
/// - `open`: any state except `replied` becomes `opened` (opens after a
///   reply still count, but do not demote the status)
/// - `delivery`: only `sent` becomes `delivered`
/// - `click`: never changes status
/// - `reply`: any non-`replied` state becomes `replied`
/// - `bounce`: only `sent` or `delivered` become `bounced`
pub fn next_status(current: MessageStatus, event: &EngagementEvent) -> Option<MessageStatus> {
    match event {
        EngagementEvent::Open => match current {
            MessageStatus::Replied => None,
            MessageStatus::Opened => None,
            _ => Some(MessageStatus::Opened),
        },
        EngagementEvent::Delivery => match current {
            MessageStatus::Sent => Some(MessageStatus::Delivered),
            _ => None,
        },
        EngagementEvent::Click { .. } => None,
        EngagementEvent::Reply => match current {
            MessageStatus::Replied => None,
            _ => Some(MessageStatus::Replied),
        },
        EngagementEvent::Bounce => match current {
            MessageStatus::Sent | MessageStatus::Delivered => Some(MessageStatus::Bounced),
            _ => None,
        },
    }
}
