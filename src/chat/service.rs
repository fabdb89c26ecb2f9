use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::delivery;
use super::presence::{DEFAULT_PRESENCE_WINDOW_SECS, PresenceEstimator};
use super::read_sync;
use super::threads::{ThreadAggregator, resolve_optional};
use crate::collaborators::{
    Authenticator, ObjectStorage, OrderLookup, ProfileLookup, PushNotifier,
};
use crate::common::{
    Clock, DeliveryStatus, Message, MessageView, NewMessage, OrderSummary, Requester, Role,
    Thread, local_part, normalize_identity,
};
use crate::error::{ChatError, ChatResult, CollaboratorError};
use crate::storage::MessageDatabase;

pub const IMAGE_PLACEHOLDER_TEXT: &str = "📷 Sent an image";
pub const CUSTOMER_MESSAGE_TITLE: &str = "New Message Alert";
pub const ORDER_ALERT_TITLE: &str = "📦 New Order Alert";
pub const DEFAULT_CONVERSATION_LIMIT: usize = 50;
/// Name used in the dispatcher's order alert when the customer has no profile.
pub const UNKNOWN_CUSTOMER_NAME: &str = "Customer";

/// Raw attachment payloads at or below this length are not uploaded.
const MIN_UPLOAD_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub dispatcher_identity: String,
    pub brand_name: String,
    pub presence_window: Duration,
    pub conversation_limit: usize,
}

impl ChatSettings {
    pub fn new(dispatcher_identity: &str) -> Self {
        Self {
            dispatcher_identity: normalize_identity(dispatcher_identity),
            brand_name: "Dispatch".to_string(),
            presence_window: Duration::seconds(DEFAULT_PRESENCE_WINDOW_SECS),
            conversation_limit: DEFAULT_CONVERSATION_LIMIT,
        }
    }

    fn dispatcher_title(&self) -> String {
        format!("{} 🚚", self.brand_name)
    }
}

/// Which party is marking a thread as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSide {
    Dispatcher,
    Customer,
}

/// The two chat entries written when a customer places an order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderMessages {
    pub alert: Message,
    pub auto_reply: Message,
}

pub struct Collaborators {
    pub storage: Arc<dyn ObjectStorage>,
    pub profiles: Arc<dyn ProfileLookup>,
    pub orders: Arc<dyn OrderLookup>,
    pub push: Arc<dyn PushNotifier>,
}

/// Entry point for every chat operation. Each call runs its status syncs
/// first, then computes the new message's state, then persists.
pub struct ChatService {
    store: Arc<MessageDatabase>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    settings: ChatSettings,
    presence: PresenceEstimator,
}

/// Verify a credential with the auth collaborator.
pub async fn authenticate(auth: &dyn Authenticator, credential: &str) -> ChatResult<Requester> {
    auth.verify(credential).await.map_err(|err| match err {
        CollaboratorError::InvalidCredential => {
            ChatError::Unauthorized("invalid or expired credential".into())
        }
        other => {
            log::warn!("Credential check failed: {other}");
            ChatError::Unauthorized("credential could not be verified".into())
        }
    })
}

impl ChatService {
    pub fn new(
        store: Arc<MessageDatabase>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        settings: ChatSettings,
    ) -> Self {
        let presence = PresenceEstimator::new(settings.presence_window);
        Self {
            store,
            collaborators,
            clock,
            settings,
            presence,
        }
    }

    fn dispatcher(&self) -> &str {
        &self.settings.dispatcher_identity
    }

    /// Whether the caller acts as the dispatcher. Role and identity must
    /// agree; a mismatch is refused outright.
    fn acts_as_dispatcher(&self, requester: &Requester) -> ChatResult<bool> {
        let identity = normalize_identity(&requester.identity);
        if identity.is_empty() {
            return Err(ChatError::Validation("requester identity is missing".into()));
        }
        let is_dispatcher_identity = identity == self.dispatcher();
        match (requester.role == Role::Dispatcher, is_dispatcher_identity) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => Err(ChatError::Unauthorized(format!(
                "role does not match identity {identity}"
            ))),
        }
    }

    /// Send a chat message. Customers always write to the dispatcher; the
    /// dispatcher must name its receiver.
    pub async fn send_message(
        &self,
        requester: &Requester,
        receiver: Option<&str>,
        text: &str,
        attachment: Option<&str>,
    ) -> ChatResult<Message> {
        let is_admin = self.acts_as_dispatcher(requester)?;
        let sender = normalize_identity(&requester.identity);
        let requested = receiver.map(normalize_identity).filter(|r| !r.is_empty());

        let receiver = if is_admin {
            requested.ok_or_else(|| ChatError::Validation("receiver identity is required".into()))?
        } else {
            match requested {
                Some(r) if r != self.dispatcher() => {
                    return Err(ChatError::Unauthorized(
                        "customers can only message the dispatcher".into(),
                    ));
                }
                _ => self.dispatcher().to_string(),
            }
        };
        if sender == receiver {
            return Err(ChatError::Validation("cannot send a message to yourself".into()));
        }

        let attachment = attachment
            .map(str::trim)
            .filter(|raw| !raw.is_empty() && usable_attachment(raw));
        if text.trim().is_empty() && attachment.is_none() {
            return Err(ChatError::Validation("text or attachment is required".into()));
        }

        let customer = if is_admin { &receiver } else { &sender };
        let attachment_key = match attachment {
            Some(raw) => self.store_attachment(raw, &format!("chat_{}", local_part(customer))).await,
            None => None,
        };
        let text = if !text.trim().is_empty() {
            text.to_string()
        } else if attachment_key.is_some() {
            IMAGE_PLACEHOLDER_TEXT.to_string()
        } else {
            return Err(ChatError::Validation(
                "attachment could not be stored and no text was given".into(),
            ));
        };

        let now = self.clock.now();
        read_sync::on_reply(&self.store, &sender, &receiver, now)?;
        let present = self.presence.is_present(&self.store, &receiver, now)?;

        let message = self.store.insert(&NewMessage {
            sender: sender.clone(),
            receiver: receiver.clone(),
            text,
            attachment_key,
            status: delivery::initial_status(present),
            is_admin,
            order_id: None,
            timestamp: now,
        })?;
        log::info!(
            "Message {} {sender} -> {receiver} created as {}",
            message.id,
            message.status
        );

        let title = if is_admin {
            self.settings.dispatcher_title()
        } else {
            CUSTOMER_MESSAGE_TITLE.to_string()
        };
        self.notify_quietly(&receiver, &title, &message.text, &sender).await;

        Ok(message)
    }

    /// Upload a raw payload or keep an external URL. Upload failures leave
    /// the attachment absent.
    async fn store_attachment(&self, raw: &str, folder: &str) -> Option<String> {
        if raw.starts_with("http") {
            return Some(raw.to_string());
        }
        match self.collaborators.storage.store(raw, folder).await {
            Ok(key) if !key.is_empty() => Some(key),
            Ok(_) => None,
            Err(err) => {
                log::warn!("Attachment upload to {folder} failed: {err}");
                None
            }
        }
    }

    /// Fetch a conversation, oldest first. Marks everything waiting for the
    /// requester as delivered before reading.
    pub async fn fetch_conversation(
        &self,
        requester: &Requester,
        counterpart: Option<&str>,
    ) -> ChatResult<Vec<MessageView>> {
        let is_admin = self.acts_as_dispatcher(requester)?;
        let reader = normalize_identity(&requester.identity);
        let counterpart = counterpart.map(normalize_identity).filter(|c| !c.is_empty());

        let subject = match counterpart {
            Some(c) if is_admin => c,
            Some(c) if c != reader && c != self.dispatcher() => {
                return Err(ChatError::Unauthorized(format!(
                    "{reader} cannot read the conversation of {c}"
                )));
            }
            _ => reader.clone(),
        };

        let now = self.clock.now();
        read_sync::on_fetch(&self.store, &reader, now)?;

        let mut messages = self
            .store
            .recent_involving(&subject, self.settings.conversation_limit)?;
        messages.reverse();

        let storage = self.collaborators.storage.as_ref();
        let views = join_all(messages.into_iter().map(|message| async move {
            let url = resolve_optional(storage, message.attachment_key.clone()).await;
            MessageView::from_message(message, url)
        }))
        .await;
        Ok(views)
    }

    /// Mark everything `counterpart` sent the requester as read.
    pub async fn mark_read(
        &self,
        requester: &Requester,
        counterpart: &str,
        side: ReadSide,
    ) -> ChatResult<usize> {
        let is_admin = self.acts_as_dispatcher(requester)?;
        let reader = normalize_identity(&requester.identity);
        let counterpart = normalize_identity(counterpart);
        if counterpart.is_empty() {
            return Err(ChatError::Validation("counterpart identity is required".into()));
        }

        match side {
            ReadSide::Dispatcher if !is_admin => {
                return Err(ChatError::Unauthorized(
                    "only the dispatcher can mark customer messages read".into(),
                ));
            }
            ReadSide::Customer if is_admin || counterpart != self.dispatcher() => {
                return Err(ChatError::Unauthorized(
                    "customers can only mark dispatcher messages read".into(),
                ));
            }
            _ => {}
        }

        let changed = read_sync::mark_thread_read(&self.store, &reader, &counterpart, self.clock.now())?;
        log::info!("{reader} marked {changed} message(s) from {counterpart} read");
        Ok(changed)
    }

    /// Acknowledge a single message addressed to the requester.
    pub async fn acknowledge(
        &self,
        requester: &Requester,
        message_id: &str,
        status: DeliveryStatus,
    ) -> ChatResult<usize> {
        self.acts_as_dispatcher(requester)?;
        if message_id.trim().is_empty() {
            return Err(ChatError::Validation("message id is required".into()));
        }
        let reader = normalize_identity(&requester.identity);
        delivery::acknowledge(&self.store, message_id.trim(), &reader, status, self.clock.now())
    }

    /// Dispatcher inbox, newest activity first.
    pub async fn list_threads(&self, requester: &Requester) -> ChatResult<Vec<Thread>> {
        if !self.acts_as_dispatcher(requester)? {
            log::warn!("Inbox requested by non-dispatcher {}", requester.identity);
            return Err(ChatError::Unauthorized("dispatcher access required".into()));
        }
        let aggregator = ThreadAggregator {
            store: &self.store,
            profiles: self.collaborators.profiles.as_ref(),
            orders: self.collaborators.orders.as_ref(),
            storage: self.collaborators.storage.as_ref(),
        };
        aggregator.list_threads().await
    }

    /// Log a freshly placed order in the chat: the customer's receipt to the
    /// dispatcher and the dispatcher's automatic acknowledgment.
    pub async fn record_order_placed(
        &self,
        requester: &Requester,
        order: &OrderSummary,
    ) -> ChatResult<OrderMessages> {
        if self.acts_as_dispatcher(requester)? {
            return Err(ChatError::Unauthorized(
                "orders are placed by customers".into(),
            ));
        }
        let customer = normalize_identity(&requester.identity);
        if normalize_identity(&order.identity) != customer {
            return Err(ChatError::Unauthorized(format!(
                "order {} does not belong to {customer}",
                order.id
            )));
        }
        if order.description.trim().is_empty() || order.id.trim().is_empty() {
            return Err(ChatError::Validation("order id and description are required".into()));
        }

        let profile = self
            .collaborators
            .profiles
            .lookup_by_identity(&customer)
            .await
            .unwrap_or_else(|err| {
                log::warn!("Profile lookup failed for {customer}: {err}");
                None
            });
        let first_name = profile
            .as_ref()
            .map(|p| p.first_name().to_string())
            .unwrap_or_else(|| local_part(&customer).to_string());
        let full_name = profile
            .as_ref()
            .map(|p| p.display_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_CUSTOMER_NAME.to_string());

        let now = self.clock.now();
        read_sync::mark_thread_read(&self.store, &customer, self.dispatcher(), now)?;

        let alert = self.store.insert(&NewMessage {
            sender: customer.clone(),
            receiver: self.dispatcher().to_string(),
            text: order_receipt(order),
            attachment_key: order.attachment_key.clone().filter(|k| !k.is_empty()),
            status: DeliveryStatus::Sent,
            is_admin: false,
            order_id: Some(order.id.clone()),
            timestamp: now,
        })?;
        let auto_reply = self.store.insert(&NewMessage {
            sender: self.dispatcher().to_string(),
            receiver: customer.clone(),
            text: format!(
                "Hello {first_name}! 👋 We've received your order for \"{}\". {} will contact you shortly to confirm pickup.",
                order.description, self.settings.brand_name
            ),
            attachment_key: None,
            status: DeliveryStatus::Sent,
            is_admin: true,
            order_id: Some(order.id.clone()),
            timestamp: now,
        })?;
        log::info!("Order {} logged in chat for {customer}", order.id);

        self.notify_quietly(
            self.dispatcher(),
            ORDER_ALERT_TITLE,
            &format!("{full_name} placed an order: {}", order.description),
            &customer,
        )
        .await;

        Ok(OrderMessages { alert, auto_reply })
    }

    async fn notify_quietly(&self, target: &str, title: &str, body: &str, from: &str) {
        if let Err(err) = self.collaborators.push.notify(target, title, body, from).await {
            log::warn!("Push to {target} failed: {err}");
        }
    }
}

/// External URLs are kept; anything else must be long enough to be image
/// data (inline `data:` URIs included) or it is dropped.
fn usable_attachment(raw: &str) -> bool {
    if raw.starts_with("http") || raw.len() > MIN_UPLOAD_LEN {
        return true;
    }
    log::warn!("Ignoring attachment payload of {} chars", raw.len());
    false
}

fn order_receipt(order: &OrderSummary) -> String {
    let mut receipt = format!("📦 NEW ORDER LOGGED\n\n📝 DESC: {}", order.description);
    if !order.pickup_location.is_empty() {
        receipt.push_str(&format!("\n📍 FROM: {}", order.pickup_location));
    }
    if !order.delivery_location.is_empty() {
        receipt.push_str(&format!("\n🏁 TO: {}", order.delivery_location));
    }
    if !order.receiver_name.is_empty() {
        receipt.push_str(&format!("\n👤 RECEIVER: {}", order.receiver_name));
    }
    if !order.weight.is_empty() {
        receipt.push_str(&format!("\n⚖️ WEIGHT: {}kg", order.weight));
    }
    receipt.push_str("\n\nStatus: Awaiting Dispatcher.");
    receipt
}
