//! In-process collaborator doubles shared by the chat tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::{
    CollaboratorResult, ObjectStorage, OrderLookup, ProfileLookup, PushNotifier, is_pre_resolved,
};
use crate::common::{OrderSummary, Profile};
use crate::error::CollaboratorError;

pub const SIGNED_PREFIX: &str = "https://signed.test/";

/// Resolves keys to `https://signed.test/<key>`; keys listed in `broken`
/// fail to resolve. Uploads return `<folder>/<n>.jpg`.
#[derive(Default)]
pub struct FakeStorage {
    pub broken: Vec<String>,
    pub fail_uploads: bool,
    pub uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn store(&self, raw: &str, folder: &str) -> CollaboratorResult<String> {
        if self.fail_uploads {
            return Err(CollaboratorError::Request("bucket offline".into()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        let key = format!("{folder}/{}.jpg", uploads.len() + 1);
        uploads.push((folder.to_string(), raw.to_string()));
        Ok(key)
    }

    async fn resolve(&self, key: &str) -> CollaboratorResult<String> {
        if self.broken.iter().any(|b| b == key) {
            return Err(CollaboratorError::Request(format!("cannot sign {key}")));
        }
        if is_pre_resolved(key) {
            return Ok(key.to_string());
        }
        Ok(format!("{SIGNED_PREFIX}{key}"))
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    pub profiles: HashMap<String, Profile>,
    pub orders: HashMap<String, OrderSummary>,
    pub failing: bool,
}

impl FakeDirectory {
    pub fn with_profile(mut self, identity: &str, name: &str, avatar: Option<&str>) -> Self {
        self.profiles.insert(
            identity.to_string(),
            Profile {
                identity: identity.to_string(),
                display_name: name.to_string(),
                avatar_key: avatar.map(str::to_string),
            },
        );
        self
    }

    pub fn with_order(mut self, order: OrderSummary) -> Self {
        self.orders.insert(order.identity.clone(), order);
        self
    }
}

#[async_trait]
impl ProfileLookup for FakeDirectory {
    async fn lookup_by_identity(&self, identity: &str) -> CollaboratorResult<Option<Profile>> {
        if self.failing {
            return Err(CollaboratorError::Request("profile service down".into()));
        }
        Ok(self.profiles.get(identity).cloned())
    }
}

#[async_trait]
impl OrderLookup for FakeDirectory {
    async fn latest_for_identity(
        &self,
        identity: &str,
    ) -> CollaboratorResult<Option<OrderSummary>> {
        if self.failing {
            return Err(CollaboratorError::Request("order service down".into()));
        }
        Ok(self.orders.get(identity).cloned())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    pub fail: bool,
    pub sent: Mutex<Vec<(String, String, String, String)>>,
}

impl RecordingPush {
    pub fn sent(&self) -> Vec<(String, String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushNotifier for RecordingPush {
    async fn notify(
        &self,
        target: &str,
        title: &str,
        body: &str,
        from: &str,
    ) -> CollaboratorResult<()> {
        self.sent.lock().unwrap().push((
            target.to_string(),
            title.to_string(),
            body.to_string(),
            from.to_string(),
        ));
        if self.fail {
            return Err(CollaboratorError::Request("gateway timeout".into()));
        }
        Ok(())
    }
}
