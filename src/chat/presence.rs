use chrono::{DateTime, Duration, Utc};

use crate::error::ChatResult;
use crate::storage::MessageDatabase;

pub const DEFAULT_PRESENCE_WINDOW_SECS: i64 = 60;

/// Guesses whether an identity is online from message traffic alone: anyone
/// who sent or received a message inside the trailing window counts as
/// present. A message exactly `window` old is still inside.
#[derive(Debug, Clone, Copy)]
pub struct PresenceEstimator {
    window: Duration,
}

impl Default for PresenceEstimator {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_PRESENCE_WINDOW_SECS))
    }
}

impl PresenceEstimator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Oldest timestamp still inside the window. A window reaching past the
    /// representable range covers all history.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_present(
        &self,
        store: &MessageDatabase,
        identity: &str,
        now: DateTime<Utc>,
    ) -> ChatResult<bool> {
        let present = store.has_activity_since(identity, self.cutoff(now))?;
        log::debug!("Presence of {identity}: {present}");
        Ok(present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::from_millis;
    use crate::common::{DeliveryStatus, NewMessage};

    fn seed(store: &MessageDatabase, sender: &str, receiver: &str, at: DateTime<Utc>) {
        store
            .insert(&NewMessage {
                sender: sender.into(),
                receiver: receiver.into(),
                text: "ping".into(),
                attachment_key: None,
                status: DeliveryStatus::Sent,
                is_admin: false,
                order_id: None,
                timestamp: at,
            })
            .unwrap();
    }

    #[test]
    fn window_edges() {
        let store = MessageDatabase::in_memory().unwrap();
        let at = from_millis(1_760_000_000_000);
        seed(&store, "ada@x.io", "hq@x.io", at);
        let presence = PresenceEstimator::default();

        assert!(presence.is_present(&store, "ada@x.io", at + Duration::seconds(59)).unwrap());
        assert!(presence.is_present(&store, "ada@x.io", at + Duration::seconds(60)).unwrap());
        assert!(!presence.is_present(&store, "ada@x.io", at + Duration::seconds(61)).unwrap());
    }

    #[test]
    fn exact_boundary_is_stable_across_runs() {
        let store = MessageDatabase::in_memory().unwrap();
        let at = from_millis(1_760_000_000_000);
        seed(&store, "hq@x.io", "ada@x.io", at);
        let presence = PresenceEstimator::default();
        let boundary = at + presence.window();

        let answers: Vec<bool> = (0..10)
            .map(|_| presence.is_present(&store, "ada@x.io", boundary).unwrap())
            .collect();
        assert!(answers.iter().all(|present| *present));
    }

    #[test]
    fn receiving_counts_as_activity() {
        let store = MessageDatabase::in_memory().unwrap();
        let at = from_millis(1_760_000_000_000);
        seed(&store, "hq@x.io", "ada@x.io", at);
        let presence = PresenceEstimator::new(Duration::seconds(10));

        assert!(presence.is_present(&store, "ada@x.io", at).unwrap());
        assert!(!presence.is_present(&store, "bo@x.io", at).unwrap());
        assert!(!presence.is_present(&store, "ada@x.io", at + Duration::seconds(11)).unwrap());
    }

    #[test]
    fn window_past_the_calendar_does_not_overflow() {
        let store = MessageDatabase::in_memory().unwrap();
        let at = from_millis(1_760_000_000_000);
        seed(&store, "hq@x.io", "ada@x.io", at);
        let presence = PresenceEstimator::new(Duration::seconds(9_000_000_000_000));

        assert_eq!(presence.cutoff(at), DateTime::<Utc>::MIN_UTC);
        assert!(presence.is_present(&store, "ada@x.io", at + Duration::days(3650)).unwrap());
    }
}
