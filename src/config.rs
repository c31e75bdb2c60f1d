//! Configuration types for the bot.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! partial (or missing) file still yields a runnable configuration.

use crate::content::MessageTemplate;
use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Recipient settings file path (`None` = platform default location).
    pub settings_file: Option<PathBuf>,
    /// Calendar content production settings.
    pub content: ContentConfig,
    /// Delivery settings.
    pub delivery: DeliveryConfig,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
}

/// Calendar image fetch and caption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Calendar image API endpoints, tried in order.
    pub api_endpoints: Vec<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Caption templates, rotated round-robin. Empty = built-in default.
    pub templates: Vec<MessageTemplate>,
    /// Local image used when every endpoint fails.
    pub backup_image: Option<PathBuf>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_endpoints: vec![
                "https://api.vvhan.com/api/moyu?type=json".to_owned(),
                "https://api.52vmy.cn/api/wl/moyu".to_owned(),
            ],
            request_timeout_secs: 5,
            templates: Vec::new(),
            backup_image: None,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Webhook endpoint that forwards messages to the chat platform.
    pub webhook_url: String,
    /// Optional bearer token sent with each request.
    pub bearer_token: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            bearer_token: None,
            request_timeout_secs: 10,
        }
    }
}

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Hard upper bound in seconds for one collaborator call (content fetch
    /// or delivery) so a hung collaborator cannot stall the wakeup loop.
    pub call_timeout_secs: u64,
    /// Pause in seconds after an unexpected loop error before resuming.
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
            error_backoff_secs: 60,
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BotError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| BotError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default config file path (`~/.config/moyuren/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("moyuren").join("config.toml"))
    }

    /// Settings file path: configured value, or the platform default next to
    /// the config file.
    pub fn settings_path(&self) -> Option<PathBuf> {
        self.settings_file.clone().or_else(|| {
            dirs::config_dir().map(|d| d.join("moyuren").join("settings.json"))
        })
    }
}
