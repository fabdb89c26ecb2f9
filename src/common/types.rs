use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::DeliveryStatus;

/// One chat turn as persisted in the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Insertion sequence; breaks ties between equal timestamps.
    #[serde(default)]
    pub seq: i64,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    /// Storage key or external URL. Never resolved at this layer.
    pub attachment_key: Option<String>,
    pub status: DeliveryStatus,
    pub is_admin: bool,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Fields a caller supplies to create a message. Id, sequence and read
/// timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub attachment_key: Option<String>,
    pub status: DeliveryStatus,
    pub is_admin: bool,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A message as handed back to a client: the attachment key has been
/// swapped for a viewable URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub attachment_url: Option<String>,
    pub status: DeliveryStatus,
    pub is_admin: bool,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl MessageView {
    pub fn from_message(message: Message, attachment_url: Option<String>) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            receiver: message.receiver,
            text: message.text,
            attachment_url,
            status: message.status,
            is_admin: message.is_admin,
            order_id: message.order_id,
            timestamp: message.timestamp,
            read_at: message.read_at,
        }
    }
}

/// Dispatcher inbox row: everything exchanged with one counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub counterpart: String,
    pub display_name: String,
    pub avatar_url: String,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub attachment_url: Option<String>,
    pub unread_count: u32,
    pub order_description: Option<String>,
    pub order_status: Option<String>,
}

/// Customer profile as exposed by the profile collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub identity: String,
    pub display_name: String,
    pub avatar_key: Option<String>,
}

impl Profile {
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(self.identity.as_str())
    }
}

/// The parts of an order the chat needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: String,
    pub identity: String,
    pub description: String,
    pub status: String,
    pub attachment_key: Option<String>,
    #[serde(default)]
    pub pickup_location: String,
    #[serde(default)]
    pub delivery_location: String,
    #[serde(default)]
    pub receiver_name: String,
    #[serde(default)]
    pub weight: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "admin")]
    Dispatcher,
    #[serde(alias = "user")]
    Customer,
    Rider,
}

/// Verified caller, as returned by the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub identity: String,
    pub role: Role,
}

impl Requester {
    pub fn new(identity: &str, role: Role) -> Self {
        Self {
            identity: normalize_identity(identity),
            role,
        }
    }
}

/// Identities are compared trimmed and lower-cased.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Part of an identity before the `@`, used for storage folder names.
pub fn local_part(identity: &str) -> &str {
    identity.split('@').next().unwrap_or(identity)
}
