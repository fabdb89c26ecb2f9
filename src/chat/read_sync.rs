//! Status side effects of fetching and replying.
//!
//! Each sync is one set-based update, so repeating it (after a timeout, or
//! from two concurrent requests) lands in the same end state.

use chrono::{DateTime, Utc};

use super::delivery;
use crate::common::DeliveryStatus;
use crate::error::ChatResult;
use crate::storage::{MessageDatabase, MessageFilter};

/// `reader` just pulled its conversation: everything addressed to it that is
/// still `sent` has now reached a device.
pub fn on_fetch(store: &MessageDatabase, reader: &str, at: DateTime<Utc>) -> ChatResult<usize> {
    let filter = MessageFilter::default().receiver(reader);
    delivery::advance(store, &filter, DeliveryStatus::Delivered, at)
}

/// `reader` has seen everything `author` sent it.
pub fn mark_thread_read(
    store: &MessageDatabase,
    reader: &str,
    author: &str,
    at: DateTime<Utc>,
) -> ChatResult<usize> {
    let filter = MessageFilter::default().sender(author).receiver(reader);
    delivery::advance(store, &filter, DeliveryStatus::Read, at)
}

/// Replying implies reading. Must run before the reply is written.
pub fn on_reply(
    store: &MessageDatabase,
    replier: &str,
    counterpart: &str,
    at: DateTime<Utc>,
) -> ChatResult<usize> {
    mark_thread_read(store, replier, counterpart, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::from_millis;
    use crate::common::{Message, NewMessage};

    fn insert(store: &MessageDatabase, sender: &str, receiver: &str, status: DeliveryStatus) -> Message {
        store
            .insert(&NewMessage {
                sender: sender.into(),
                receiver: receiver.into(),
                text: "hi".into(),
                attachment_key: None,
                status,
                is_admin: sender == "hq@x.io",
                order_id: None,
                timestamp: from_millis(1_760_000_000_000),
            })
            .unwrap()
    }

    fn statuses(store: &MessageDatabase) -> Vec<(String, DeliveryStatus)> {
        let mut out = Vec::new();
        store
            .scan_newest_first(|m| out.push((m.id, m.status)))
            .unwrap();
        out
    }

    #[test]
    fn fetch_sync_is_idempotent() {
        let store = MessageDatabase::in_memory().unwrap();
        insert(&store, "hq@x.io", "ada@x.io", DeliveryStatus::Sent);
        insert(&store, "hq@x.io", "ada@x.io", DeliveryStatus::Read);
        insert(&store, "bo@x.io", "hq@x.io", DeliveryStatus::Sent);
        let at = from_millis(1_760_000_000_500);

        assert_eq!(on_fetch(&store, "ada@x.io", at).unwrap(), 1);
        let once = statuses(&store);
        assert_eq!(on_fetch(&store, "ada@x.io", at).unwrap(), 0);
        assert_eq!(statuses(&store), once);
    }

    #[test]
    fn fetch_sync_leaves_other_receivers_alone() {
        let store = MessageDatabase::in_memory().unwrap();
        let to_hq = insert(&store, "bo@x.io", "hq@x.io", DeliveryStatus::Sent);
        on_fetch(&store, "ada@x.io", from_millis(1_760_000_000_500)).unwrap();
        assert_eq!(store.get(&to_hq.id).unwrap().unwrap().status, DeliveryStatus::Sent);
    }

    #[test]
    fn reply_reads_only_the_counterparts_messages() {
        let store = MessageDatabase::in_memory().unwrap();
        let from_ada = insert(&store, "ada@x.io", "hq@x.io", DeliveryStatus::Sent);
        let delivered = insert(&store, "ada@x.io", "hq@x.io", DeliveryStatus::Delivered);
        let from_bo = insert(&store, "bo@x.io", "hq@x.io", DeliveryStatus::Sent);
        let own = insert(&store, "hq@x.io", "ada@x.io", DeliveryStatus::Sent);
        let at = from_millis(1_760_000_001_000);

        assert_eq!(on_reply(&store, "hq@x.io", "ada@x.io", at).unwrap(), 2);
        for id in [&from_ada.id, &delivered.id] {
            let message = store.get(id).unwrap().unwrap();
            assert_eq!(message.status, DeliveryStatus::Read);
            assert_eq!(message.read_at, Some(at));
        }
        assert_eq!(store.get(&from_bo.id).unwrap().unwrap().status, DeliveryStatus::Sent);
        assert_eq!(store.get(&own.id).unwrap().unwrap().status, DeliveryStatus::Sent);

        assert_eq!(on_reply(&store, "hq@x.io", "ada@x.io", at).unwrap(), 0);
    }
}
