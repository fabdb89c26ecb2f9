use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::{CollaboratorResult, ObjectStorage};
use crate::common::Clock;
use crate::common::clock::to_millis;
use crate::error::CollaboratorError;

type HmacSha256 = Hmac<Sha256>;

/// Payloads shorter than this are not treated as image data.
const MIN_IMAGE_PAYLOAD: usize = 100;

/// Values that are already viewable and must not be re-signed.
pub fn is_pre_resolved(value: &str) -> bool {
    value.starts_with("http") || value.starts_with("data:")
}

/// Filesystem-backed attachment store handing out expiring signed links.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
    secret: Vec<u8>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl LocalObjectStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: &str,
        secret: &[u8],
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            secret: secret.to_vec(),
            ttl,
            clock,
        }
    }

    fn sign(&self, key: &str, expires: i64) -> CollaboratorResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| CollaboratorError::NotConfigured(format!("signing key: {err}")))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a signature produced by `resolve` and that it has not expired.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < self.clock.now().timestamp() {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    pub fn path_for(&self, key: &str) -> CollaboratorResult<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || key.is_empty() {
            return Err(CollaboratorError::Request(format!(
                "refusing object key `{key}`"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn sanitize_folder(folder: &str) -> String {
    let cleaned: String = folder
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "uploads".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn store(&self, raw: &str, folder: &str) -> CollaboratorResult<String> {
        if raw.len() < MIN_IMAGE_PAYLOAD {
            log::debug!("Attachment payload too short ({} chars); not stored", raw.len());
            return Ok(String::new());
        }

        let encoded = match raw.split_once("base64,") {
            Some((_, data)) => data,
            None => raw,
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| CollaboratorError::Request(format!("invalid base64 payload: {err}")))?;

        let key = format!(
            "{}/{}_{}.jpg",
            sanitize_folder(folder),
            to_millis(self.clock.now()),
            Uuid::new_v4().simple()
        );
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        log::info!("Stored attachment {key}");
        Ok(key)
    }

    async fn resolve(&self, key: &str) -> CollaboratorResult<String> {
        if key.is_empty() || is_pre_resolved(key) {
            return Ok(key.to_string());
        }
        self.path_for(key)?;

        let expires = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| CollaboratorError::NotConfigured("link lifetime out of range".into()))?
            .timestamp();
        let signature = self.sign(key, expires)?;
        Ok(format!(
            "{}/{key}?expires={expires}&signature={signature}",
            self.public_base_url
        ))
    }
}
