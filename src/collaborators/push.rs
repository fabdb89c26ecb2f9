use async_trait::async_trait;
use serde_json::json;

use super::{CollaboratorResult, PushNotifier};
use crate::common::normalize_identity;
use crate::error::CollaboratorError;

pub const DEFAULT_PUSH_ENDPOINT: &str = "https://api.onesignal.com/notifications";

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogPush;

#[async_trait]
impl PushNotifier for LogPush {
    async fn notify(
        &self,
        target: &str,
        title: &str,
        body: &str,
        from: &str,
    ) -> CollaboratorResult<()> {
        log::info!("Push to {target} from {from}: {title} | {body}");
        Ok(())
    }
}

/// Push gateway client. Targets devices by external id, which is the
/// customer's normalized identity.
pub struct WebhookPush {
    client: reqwest::Client,
    endpoint: String,
    app_id: Option<String>,
    api_key: Option<String>,
}

impl WebhookPush {
    pub fn new(endpoint: &str, app_id: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            app_id: app_id.filter(|v| !v.trim().is_empty()),
            api_key: api_key.filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn payload(app_id: &str, target: &str, title: &str, body: &str, from: &str) -> serde_json::Value {
        json!({
            "app_id": app_id,
            "include_aliases": { "external_id": [normalize_identity(target)] },
            "target_channel": "push",
            "headings": { "en": title },
            "contents": { "en": body },
            "priority": 10,
            "android_visibility": 1,
            "android_channel_id": "livechat_messages",
            "data": {
                "type": "chat_alert",
                "sender": from,
                "click_action": "FLUTTER_NOTIFICATION_CLICK"
            }
        })
    }
}

#[async_trait]
impl PushNotifier for WebhookPush {
    async fn notify(
        &self,
        target: &str,
        title: &str,
        body: &str,
        from: &str,
    ) -> CollaboratorResult<()> {
        let (Some(app_id), Some(api_key)) = (&self.app_id, &self.api_key) else {
            return Err(CollaboratorError::NotConfigured(
                "push app id or API key missing".into(),
            ));
        };
        if target.trim().is_empty() {
            return Err(CollaboratorError::Request("push target is empty".into()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Basic {}", api_key.trim()))
            .json(&Self::payload(app_id, target, title, body, from))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Request(format!(
                "push gateway returned {status}: {detail}"
            )));
        }
        log::debug!("Push delivered to {target}");
        Ok(())
    }
}
