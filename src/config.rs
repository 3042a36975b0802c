//! Runtime configuration for the sync layer.
//!
//! Every field has a default, so an empty JSON object (or a missing file) yields
//! the stock configuration:
//!
//! ```json
//! {
//!   "placeholder_prefix": "temp-",
//!   "notification_ttl_ms": 5000,
//!   "cache_namespace": "wardrobe",
//!   "codec": "json",
//!   "same_entity_policy": "last_write_wins",
//!   "log": { "filter": "wardrobe_sync=info", "with_target": true }
//! }
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheCodec;
use crate::engine::SameEntityPolicy;
use crate::error::ConfigError;
use crate::logging::LogConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Prefix tagging locally allocated ids as provisional.
    pub placeholder_prefix: String,
    /// How long a notification stays in the toast tray.
    pub notification_ttl_ms: u64,
    /// First segment of every cache key.
    pub cache_namespace: String,
    pub codec: CacheCodec,
    pub same_entity_policy: SameEntityPolicy,
    pub log: LogConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            placeholder_prefix: "temp-".to_string(),
            notification_ttl_ms: 5_000,
            cache_namespace: "wardrobe".to_string(),
            codec: CacheCodec::default(),
            same_entity_policy: SameEntityPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// An empty placeholder prefix would tag every id as provisional.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.placeholder_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "placeholder_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match fs::read_to_string(path.as_ref()) {
            Ok(raw) => Self::from_json_str(&raw),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    /// Cache key for one collection of one signed-in user.
    pub fn cache_key(&self, user: &str, collection: &str) -> String {
        format!("{}:{}:{}", self.cache_namespace, user, collection)
    }
}
