//! Interfaces to the systems the chat core depends on but does not own:
//! credential verification, attachment storage, customer profiles, orders,
//! and push delivery. Each has one small concrete implementation here so the
//! service can run end to end.

pub mod auth;
pub mod object_store;
pub mod push;

use async_trait::async_trait;

use crate::common::{OrderSummary, Profile, Requester};
use crate::error::CollaboratorError;

pub use auth::TokenAuthenticator;
pub use object_store::{LocalObjectStorage, is_pre_resolved};
pub use push::{LogPush, WebhookPush};

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify a bearer credential and return who is calling.
    async fn verify(&self, credential: &str) -> CollaboratorResult<Requester>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Persist raw image data under `folder`. An empty key means nothing was
    /// stored.
    async fn store(&self, raw: &str, folder: &str) -> CollaboratorResult<String>;

    /// Turn a stored key into a temporary viewable URL. Values that already
    /// look like URLs or inline data come back unchanged.
    async fn resolve(&self, key: &str) -> CollaboratorResult<String>;
}

#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn lookup_by_identity(&self, identity: &str) -> CollaboratorResult<Option<Profile>>;
}

#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// Most recently created order for `identity`.
    async fn latest_for_identity(&self, identity: &str)
    -> CollaboratorResult<Option<OrderSummary>>;
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify(
        &self,
        target: &str,
        title: &str,
        body: &str,
        from: &str,
    ) -> CollaboratorResult<()>;
}
