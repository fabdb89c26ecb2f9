use chrono::{DateTime, Utc};

use crate::common::DeliveryStatus;
use crate::error::ChatResult;
use crate::storage::{MessageDatabase, MessageFilter};

/// Status a new message starts in: a receiver that looks online gets the
/// double tick straight away.
pub fn initial_status(receiver_present: bool) -> DeliveryStatus {
    if receiver_present {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Sent
    }
}

/// Bulk-advance every message matching `filter` to `target`. Messages at or
/// past `target` are skipped; the return value counts only real changes.
pub fn advance(
    store: &MessageDatabase,
    filter: &MessageFilter,
    target: DeliveryStatus,
    at: DateTime<Utc>,
) -> ChatResult<usize> {
    let changed = store.advance_status(filter, target, at)?;
    if changed > 0 {
        log::debug!("Advanced {changed} message(s) to {target} ({filter:?})");
    }
    Ok(changed)
}

/// Acknowledge one message on behalf of its receiver. Unknown ids, messages
/// addressed to someone else and messages already at `target` all report 0.
pub fn acknowledge(
    store: &MessageDatabase,
    message_id: &str,
    receiver: &str,
    target: DeliveryStatus,
    at: DateTime<Utc>,
) -> ChatResult<usize> {
    let filter = MessageFilter::default().id(message_id).receiver(receiver);
    advance(store, &filter, target, at)
}
