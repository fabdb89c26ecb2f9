use std::collections::HashMap;

use futures::future::join_all;

use crate::collaborators::{ObjectStorage, OrderLookup, ProfileLookup};
use crate::common::{DeliveryStatus, Message, Thread};
use crate::error::ChatResult;
use crate::storage::MessageDatabase;

/// Per-counterpart fold of the message log, before any collaborator joins.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadDraft {
    pub counterpart: String,
    pub last_message: String,
    pub last_message_time: chrono::DateTime<chrono::Utc>,
    pub chat_attachment: Option<String>,
    pub unread_count: u32,
}

/// The non-dispatcher side of a message.
pub fn counterpart_of(message: &Message) -> &str {
    if message.is_admin {
        &message.receiver
    } else {
        &message.sender
    }
}

/// Groups messages fed newest first. The first message seen for a
/// counterpart fixes its text, time and attachment; later (older) ones only
/// add to the unread count.
#[derive(Debug, Default)]
pub struct ThreadFolder {
    index: HashMap<String, usize>,
    drafts: Vec<ThreadDraft>,
}

impl ThreadFolder {
    pub fn push(&mut self, message: Message) {
        let unread = !message.is_admin && message.status != DeliveryStatus::Read;
        let counterpart = counterpart_of(&message);

        match self.index.get(counterpart) {
            Some(&slot) => {
                if unread {
                    self.drafts[slot].unread_count += 1;
                }
            }
            None => {
                let counterpart = counterpart.to_string();
                self.index.insert(counterpart.clone(), self.drafts.len());
                self.drafts.push(ThreadDraft {
                    counterpart,
                    last_message: message.text,
                    last_message_time: message.timestamp,
                    chat_attachment: message.attachment_key.filter(|key| !key.is_empty()),
                    unread_count: u32::from(unread),
                });
            }
        }
    }

    pub fn finish(self) -> Vec<ThreadDraft> {
        self.drafts
    }
}

pub fn fold_threads(store: &MessageDatabase) -> ChatResult<Vec<ThreadDraft>> {
    let mut folder = ThreadFolder::default();
    store.scan_newest_first(|message| folder.push(message))?;
    Ok(folder.finish())
}

/// Builds the dispatcher inbox: message fold, then profile and order joins,
/// then URL signing. Lookup failures degrade to fallbacks and never drop a
/// thread.
pub struct ThreadAggregator<'a> {
    pub store: &'a MessageDatabase,
    pub profiles: &'a dyn ProfileLookup,
    pub orders: &'a dyn OrderLookup,
    pub storage: &'a dyn ObjectStorage,
}

impl ThreadAggregator<'_> {
    pub async fn list_threads(&self) -> ChatResult<Vec<Thread>> {
        let drafts = fold_threads(self.store)?;
        let mut threads = join_all(drafts.into_iter().map(|draft| self.enrich(draft))).await;
        threads.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));

        log::info!("Built {} inbox thread(s)", threads.len());
        Ok(threads)
    }

    async fn enrich(&self, draft: ThreadDraft) -> Thread {
        let (profile, order) = futures::join!(
            self.profiles.lookup_by_identity(&draft.counterpart),
            self.orders.latest_for_identity(&draft.counterpart),
        );
        let profile = profile.unwrap_or_else(|err| {
            log::warn!("Profile lookup failed for {}: {err}", draft.counterpart);
            None
        });
        let order = order.unwrap_or_else(|err| {
            log::warn!("Order lookup failed for {}: {err}", draft.counterpart);
            None
        });

        let attachment_key = draft.chat_attachment.or_else(|| {
            order
                .as_ref()
                .and_then(|o| o.attachment_key.clone())
                .filter(|key| !key.is_empty())
        });
        let avatar_key = profile
            .as_ref()
            .and_then(|p| p.avatar_key.clone())
            .filter(|key| !key.is_empty());

        let (attachment_url, avatar_url) = futures::join!(
            resolve_optional(self.storage, attachment_key),
            resolve_optional(self.storage, avatar_key),
        );

        let display_name = profile
            .map(|p| p.display_name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| draft.counterpart.clone());

        Thread {
            counterpart: draft.counterpart,
            display_name,
            avatar_url: avatar_url.unwrap_or_default(),
            last_message: draft.last_message,
            last_message_time: draft.last_message_time,
            attachment_url,
            unread_count: draft.unread_count,
            order_description: order.as_ref().map(|o| o.description.clone()),
            order_status: order.map(|o| o.status),
        }
    }
}

/// Resolve a key to a viewable URL; failures and empty results become
/// `None`.
pub async fn resolve_optional(storage: &dyn ObjectStorage, key: Option<String>) -> Option<String> {
    let key = key?;
    match storage.resolve(&key).await {
        Ok(url) if !url.is_empty() => Some(url),
        Ok(_) => None,
        Err(err) => {
            log::warn!("Could not resolve attachment {key}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{FakeDirectory, FakeStorage, SIGNED_PREFIX};
    use crate::common::clock::from_millis;
    use crate::common::{NewMessage, OrderSummary};
    use chrono::{DateTime, Duration, Utc};

    const HQ: &str = "hq@x.io";

    fn t(secs: i64) -> DateTime<Utc> {
        from_millis(1_760_000_000_000) + Duration::seconds(secs)
    }

    fn say(
        store: &MessageDatabase,
        from: &str,
        to: &str,
        text: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Message {
        store
            .insert(&NewMessage {
                sender: from.into(),
                receiver: to.into(),
                text: text.into(),
                attachment_key: None,
                status,
                is_admin: from == HQ,
                order_id: None,
                timestamp: at,
            })
            .unwrap()
    }

    fn order(identity: &str, attachment: Option<&str>) -> OrderSummary {
        OrderSummary {
            id: format!("order-{identity}"),
            identity: identity.into(),
            description: "Box of books".into(),
            status: "In Transit".into(),
            attachment_key: attachment.map(str::to_string),
            pickup_location: String::new(),
            delivery_location: String::new(),
            receiver_name: String::new(),
            weight: String::new(),
            created_at: t(0),
        }
    }

    #[test]
    fn folds_both_directions_into_one_thread() {
        let store = MessageDatabase::in_memory().unwrap();
        say(&store, "ada@x.io", HQ, "first", DeliveryStatus::Sent, t(1));
        say(&store, HQ, "ada@x.io", "reply", DeliveryStatus::Sent, t(2));
        say(&store, "ada@x.io", HQ, "second", DeliveryStatus::Delivered, t(3));
        say(&store, "ada@x.io", HQ, "old", DeliveryStatus::Read, t(0));

        let drafts = fold_threads(&store).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].counterpart, "ada@x.io");
        assert_eq!(drafts[0].last_message, "second");
        assert_eq!(drafts[0].last_message_time, t(3));
        assert_eq!(drafts[0].unread_count, 2);
    }

    #[test]
    fn newest_attachment_slot_wins_even_when_empty() {
        let store = MessageDatabase::in_memory().unwrap();
        let mut with_photo = NewMessage {
            sender: "ada@x.io".into(),
            receiver: HQ.into(),
            text: "photo".into(),
            attachment_key: Some("chat_ada/1.jpg".into()),
            status: DeliveryStatus::Read,
            is_admin: false,
            order_id: None,
            timestamp: t(1),
        };
        store.insert(&with_photo).unwrap();
        say(&store, HQ, "ada@x.io", "thanks", DeliveryStatus::Sent, t(2));

        let drafts = fold_threads(&store).unwrap();
        assert_eq!(drafts[0].chat_attachment, None);

        with_photo.timestamp = t(3);
        with_photo.attachment_key = Some("chat_ada/2.jpg".into());
        store.insert(&with_photo).unwrap();
        let drafts = fold_threads(&store).unwrap();
        assert_eq!(drafts[0].chat_attachment.as_deref(), Some("chat_ada/2.jpg"));
    }

    #[tokio::test]
    async fn unread_counts_match_constructed_log() {
        let store = MessageDatabase::in_memory().unwrap();
        let expected = [("ada@x.io", 3u32), ("bo@x.io", 0), ("cy@x.io", 1)];
        let mut clock = 0;
        for (identity, unread) in expected {
            for _ in 0..unread {
                clock += 1;
                say(&store, identity, HQ, "unread", DeliveryStatus::Delivered, t(clock));
            }
            clock += 1;
            say(&store, identity, HQ, "seen", DeliveryStatus::Read, t(clock));
            clock += 1;
            say(&store, HQ, identity, "admin note", DeliveryStatus::Sent, t(clock));
        }

        let directory = FakeDirectory::default();
        let storage = FakeStorage::default();
        let aggregator = ThreadAggregator {
            store: &store,
            profiles: &directory,
            orders: &directory,
            storage: &storage,
        };
        let threads = aggregator.list_threads().await.unwrap();

        assert_eq!(threads.len(), 3);
        for (identity, unread) in expected {
            let thread = threads.iter().find(|t| t.counterpart == identity).unwrap();
            assert_eq!(thread.unread_count, unread, "{identity}");
        }
        let order: Vec<_> = threads.iter().map(|t| t.counterpart.as_str()).collect();
        assert_eq!(order, vec!["cy@x.io", "bo@x.io", "ada@x.io"]);
    }

    #[tokio::test]
    async fn joins_profile_and_latest_order() {
        let store = MessageDatabase::in_memory().unwrap();
        say(&store, "ada@x.io", HQ, "hello", DeliveryStatus::Sent, t(1));
        say(&store, "bo@x.io", HQ, "hey", DeliveryStatus::Sent, t(2));

        let directory = FakeDirectory::default()
            .with_profile("ada@x.io", "Ada Obi", Some("avatars/ada.jpg"))
            .with_order(order("ada@x.io", Some("packages/ada.jpg")));
        let storage = FakeStorage::default();
        let aggregator = ThreadAggregator {
            store: &store,
            profiles: &directory,
            orders: &directory,
            storage: &storage,
        };
        let threads = aggregator.list_threads().await.unwrap();

        let bo = &threads[0];
        assert_eq!(bo.counterpart, "bo@x.io");
        assert_eq!(bo.display_name, "bo@x.io");
        assert_eq!(bo.avatar_url, "");
        assert_eq!(bo.order_description, None);
        assert_eq!(bo.order_status, None);
        assert_eq!(bo.attachment_url, None);

        let ada = &threads[1];
        assert_eq!(ada.display_name, "Ada Obi");
        assert_eq!(ada.avatar_url, format!("{SIGNED_PREFIX}avatars/ada.jpg"));
        assert_eq!(ada.order_description.as_deref(), Some("Box of books"));
        assert_eq!(ada.order_status.as_deref(), Some("In Transit"));
        assert_eq!(
            ada.attachment_url.as_deref(),
            Some(format!("{SIGNED_PREFIX}packages/ada.jpg").as_str())
        );
    }

    #[tokio::test]
    async fn chat_attachment_beats_order_attachment() {
        let store = MessageDatabase::in_memory().unwrap();
        store
            .insert(&NewMessage {
                sender: "ada@x.io".into(),
                receiver: HQ.into(),
                text: "📷 Sent an image".into(),
                attachment_key: Some("chat_ada/1.jpg".into()),
                status: DeliveryStatus::Sent,
                is_admin: false,
                order_id: None,
                timestamp: t(1),
            })
            .unwrap();
        let directory =
            FakeDirectory::default().with_order(order("ada@x.io", Some("packages/ada.jpg")));
        let storage = FakeStorage::default();
        let aggregator = ThreadAggregator {
            store: &store,
            profiles: &directory,
            orders: &directory,
            storage: &storage,
        };

        let threads = aggregator.list_threads().await.unwrap();
        assert_eq!(
            threads[0].attachment_url.as_deref(),
            Some(format!("{SIGNED_PREFIX}chat_ada/1.jpg").as_str())
        );
    }

    #[tokio::test]
    async fn collaborator_failures_degrade_without_dropping_threads() {
        let store = MessageDatabase::in_memory().unwrap();
        say(&store, "ada@x.io", HQ, "hello", DeliveryStatus::Sent, t(1));
        store
            .insert(&NewMessage {
                sender: "bo@x.io".into(),
                receiver: HQ.into(),
                text: "pic".into(),
                attachment_key: Some("chat_bo/broken.jpg".into()),
                status: DeliveryStatus::Sent,
                is_admin: false,
                order_id: None,
                timestamp: t(2),
            })
            .unwrap();

        let directory = FakeDirectory {
            failing: true,
            ..FakeDirectory::default()
        };
        let storage = FakeStorage {
            broken: vec!["chat_bo/broken.jpg".into()],
            ..FakeStorage::default()
        };
        let aggregator = ThreadAggregator {
            store: &store,
            profiles: &directory,
            orders: &directory,
            storage: &storage,
        };

        let threads = aggregator.list_threads().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].counterpart, "bo@x.io");
        assert_eq!(threads[0].attachment_url, None);
        assert_eq!(threads[1].display_name, "ada@x.io");
        assert_eq!(threads[1].order_status, None);
    }

    #[tokio::test]
    async fn empty_log_yields_no_threads() {
        let store = MessageDatabase::in_memory().unwrap();
        let directory = FakeDirectory::default();
        let storage = FakeStorage::default();
        let aggregator = ThreadAggregator {
            store: &store,
            profiles: &directory,
            orders: &directory,
            storage: &storage,
        };
        assert!(aggregator.list_threads().await.unwrap().is_empty());
    }
}
