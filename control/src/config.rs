//! Configuration for the GatewayClass informer
//!
//! Values come from defaults, optionally overridden by `GATEWAY_INFORMER_*`
//! environment variables.

use crate::client::{ListOptions, TweakListOptions};
use crate::error::{InformerError, Result};
use crate::selector::parse_selector;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Informer configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InformerConfig {
    /// Full resync interval in seconds, 0 disables resync (default: 300s)
    #[serde(default = "default_resync_period")]
    pub resync_period_secs: u64,

    /// Label selector applied to every list and watch
    #[serde(default)]
    pub label_selector: Option<String>,

    /// Field selector applied to every list and watch
    #[serde(default)]
    pub field_selector: Option<String>,

    /// How long to wait for the initial cache sync (default: 30s)
    #[serde(default = "default_cache_sync_timeout")]
    pub cache_sync_timeout_secs: u64,
}

fn default_resync_period() -> u64 {
    300
}

fn default_cache_sync_timeout() -> u64 {
    30
}

impl Default for InformerConfig {
    fn default() -> Self {
        Self {
            resync_period_secs: default_resync_period(),
            label_selector: None,
            field_selector: None,
            cache_sync_timeout_secs: default_cache_sync_timeout(),
        }
    }
}

impl InformerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("GATEWAY_INFORMER_RESYNC_SECS") {
            config.resync_period_secs = parse_secs("GATEWAY_INFORMER_RESYNC_SECS", &val)?;
        }

        if let Some(val) = lookup("GATEWAY_INFORMER_SYNC_TIMEOUT_SECS") {
            config.cache_sync_timeout_secs =
                parse_secs("GATEWAY_INFORMER_SYNC_TIMEOUT_SECS", &val)?;
        }

        if let Some(val) = lookup("GATEWAY_INFORMER_LABEL_SELECTOR").filter(|v| !v.is_empty()) {
            parse_selector(&val).map_err(|e| {
                InformerError::Config(format!("GATEWAY_INFORMER_LABEL_SELECTOR: {}", e))
            })?;
            config.label_selector = Some(val);
        }

        if let Some(val) = lookup("GATEWAY_INFORMER_FIELD_SELECTOR").filter(|v| !v.is_empty()) {
            config.field_selector = Some(val);
        }

        Ok(config)
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    /// List options hook carrying the configured selectors, if any
    pub fn tweak(&self) -> Option<TweakListOptions> {
        if self.label_selector.is_none() && self.field_selector.is_none() {
            return None;
        }

        let label_selector = self.label_selector.clone();
        let field_selector = self.field_selector.clone();
        Some(Arc::new(move |options: &mut ListOptions| {
            if label_selector.is_some() {
                options.label_selector = label_selector.clone();
            }
            if field_selector.is_some() {
                options.field_selector = field_selector.clone();
            }
        }))
    }
}

fn parse_secs(key: &str, val: &str) -> Result<u64> {
    val.trim()
        .parse()
        .map_err(|_| InformerError::Config(format!("{}: expected seconds, got {:?}", key, val)))
}
