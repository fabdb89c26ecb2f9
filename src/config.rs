use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::chat::presence::DEFAULT_PRESENCE_WINDOW_SECS;
use crate::chat::service::DEFAULT_CONVERSATION_LIMIT;
use crate::collaborators::push::DEFAULT_PUSH_ENDPOINT;
use crate::common::Requester;
use crate::error::{ChatError, ChatResult};

pub const DEFAULT_CONFIG_PATH: &str = "config/dispatch.json";

/// Upper bound for configured windows and link lifetimes: one year.
pub const MAX_CONFIG_SECS: i64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub directory_path: String,
    pub dispatcher_identity: String,
    pub brand_name: String,
    pub presence_window_secs: i64,
    pub conversation_limit: usize,
    pub storage_root: String,
    pub public_base_url: String,
    pub url_ttl_secs: i64,
    pub signing_secret: String,
    pub push_endpoint: String,
    pub push_app_id: Option<String>,
    pub push_api_key: Option<String>,
    /// Bearer token -> who it was issued to.
    pub tokens: HashMap<String, Requester>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "data/dispatch.db".to_string(),
            directory_path: "data/directory.db".to_string(),
            dispatcher_identity: "dispatch@localhost".to_string(),
            brand_name: "Dispatch".to_string(),
            presence_window_secs: DEFAULT_PRESENCE_WINDOW_SECS,
            conversation_limit: DEFAULT_CONVERSATION_LIMIT,
            storage_root: "data/attachments".to_string(),
            public_base_url: "http://localhost:8080/attachments".to_string(),
            url_ttl_secs: 3600,
            signing_secret: String::new(),
            push_endpoint: DEFAULT_PUSH_ENDPOINT.to_string(),
            push_app_id: None,
            push_api_key: None,
            tokens: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn presence_window(&self) -> ChatResult<Duration> {
        bounded_secs("presence_window_secs", self.presence_window_secs)
    }

    pub fn url_ttl(&self) -> ChatResult<Duration> {
        bounded_secs("url_ttl_secs", self.url_ttl_secs)
    }

    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(path) = lookup("DISPATCH_DB") {
            self.database_path = path;
        }
        if let Some(identity) = lookup("DISPATCH_IDENTITY") {
            self.dispatcher_identity = identity;
        }
        if let Some(secret) = lookup("DISPATCH_SIGNING_SECRET") {
            self.signing_secret = secret;
        }
        if let Some(app_id) = lookup("ONESIGNAL_APP_ID") {
            self.push_app_id = Some(app_id);
        }
        if let Some(key) = lookup("ONESIGNAL_REST_API_KEY") {
            self.push_api_key = Some(key);
        }
    }
}

fn bounded_secs(name: &str, secs: i64) -> ChatResult<Duration> {
    if !(1..=MAX_CONFIG_SECS).contains(&secs) {
        return Err(ChatError::Validation(format!(
            "{name} must be between 1 and {MAX_CONFIG_SECS}, got {secs}"
        )));
    }
    Duration::try_seconds(secs)
        .ok_or_else(|| ChatError::Validation(format!("{name} is out of range")))
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
