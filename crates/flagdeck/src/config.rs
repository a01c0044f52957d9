//! Configuration management for flagdeck.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::flags::{default_flags, FlagDef, FlagSet, DEFAULT_SECTION_SUFFIX};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "flagdeck";

/// Environment variables of the original deployment and the keys they set.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("PORT", "server.port"),
    ("LAUNCHDARKLY_CLIENT_SIDE_ID", "backend.client_side_id"),
    ("NODE_ENV", "backend.environment"),
];

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables prefixed with `FLAGDECK_` (`__` separates levels)
/// 2. `PORT`, `LAUNCHDARKLY_CLIENT_SIDE_ID` and `NODE_ENV`
/// 3. TOML config file at `~/.config/flagdeck/config.toml`
/// 4. Default values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Deck file and reconciliation configuration.
    pub deck: DeckConfig,
    /// Remote flag backend configuration.
    pub backend: BackendConfig,
    /// Fallback polling configuration.
    pub polling: PollingConfig,
    /// Notification configuration.
    pub notifications: NotificationConfig,
    /// Known flags, in display order.
    pub flags: Vec<FlagDef>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Directory served under `/static`.
    pub public_dir: PathBuf,
    /// reveal.js distribution served under `/reveal.js`.
    pub reveal_dir: PathBuf,
}

/// Deck configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Markdown deck to present.
    pub path: PathBuf,
    /// Level-two heading text identifying the anchor slide.
    pub anchor_heading: String,
    /// Suffix stripped from flag keys to name sections.
    pub section_suffix: String,
}

/// Remote flag backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Client-side identifier. Empty selects polling mode.
    pub client_side_id: String,
    /// Environment name reported by `/api/config`.
    pub environment: String,
    /// Base URI for flag evaluation requests.
    pub base_uri: String,
    /// Base URI for the flag change stream.
    pub stream_uri: String,
    /// How long to wait for the backend to become ready, in milliseconds.
    pub init_timeout_ms: u64,
}

/// Fallback polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between polls in milliseconds.
    pub interval_ms: u64,
    /// URL returning a JSON map of flag values. Takes precedence over `file`.
    pub url: Option<String>,
    /// JSON file of flag values, re-read on every poll.
    pub file: Option<PathBuf>,
    /// Timeout of a single HTTP poll in milliseconds.
    pub request_timeout_ms: u64,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// How long a notification stays visible, in milliseconds.
    pub dismiss_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            deck: DeckConfig::default(),
            backend: BackendConfig::default(),
            polling: PollingConfig::default(),
            notifications: NotificationConfig::default(),
            flags: default_flags(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_dir: PathBuf::from("public"),
            reveal_dir: PathBuf::from("node_modules/reveal.js"),
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("slides.md"),
            anchor_heading: "Core Value Propositions".to_string(),
            section_suffix: DEFAULT_SECTION_SUFFIX.to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            client_side_id: String::new(),
            environment: "development".to_string(),
            base_uri: "https://clientsdk.launchdarkly.com".to_string(),
            stream_uri: "https://clientstream.launchdarkly.com".to_string(),
            // Just under the backend's own 5 second warning threshold.
            init_timeout_ms: 4_900,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            url: None,
            file: Some(PathBuf::from("flags.json")),
            request_timeout_ms: 3_000,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { dismiss_ms: 3_000 }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Config = Self::figment(&config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &std::path::Path) -> Figment {
        let legacy = Env::raw().filter_map(|key| {
            LEGACY_ENV
                .iter()
                .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                .map(|(_, path)| (*path).into())
        });

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(legacy)
            .merge(Env::prefixed("FLAGDECK_").split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(invalid("polling.interval_ms must be greater than 0"));
        }

        if self.notifications.dismiss_ms == 0 {
            return Err(invalid("notifications.dismiss_ms must be greater than 0"));
        }

        if self.deck.section_suffix.is_empty() {
            return Err(invalid("deck.section_suffix must not be empty"));
        }

        let mut keys = HashSet::new();
        let mut hotkeys = HashSet::new();
        for flag in &self.flags {
            if flag.key.trim().is_empty() {
                return Err(invalid("flag keys must not be empty"));
            }
            if !keys.insert(flag.key.as_str()) {
                return Err(invalid(format!("duplicate flag key: {}", flag.key)));
            }
            if let Some(code) = flag.hotkey {
                if !hotkeys.insert(code) {
                    return Err(invalid(format!(
                        "hotkey {code} is bound to more than one flag"
                    )));
                }
            }
        }

        Ok(())
    }

    /// The known flags as a [`FlagSet`].
    #[must_use]
    pub fn flag_set(&self) -> FlagSet {
        FlagSet::new(self.flags.clone(), self.deck.section_suffix.clone())
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Whether a remote backend is configured at all.
    #[must_use]
    pub fn has_client_side_id(&self) -> bool {
        !self.backend.client_side_id.trim().is_empty()
    }

    /// Get the backend readiness timeout as a Duration.
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.init_timeout_ms)
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    /// Get the poll request timeout as a Duration.
    #[must_use]
    pub fn poll_request_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.request_timeout_ms)
    }

    /// Get the notification lifetime as a Duration.
    #[must_use]
    pub fn dismiss_after(&self) -> Duration {
        Duration::from_millis(self.notifications.dismiss_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
