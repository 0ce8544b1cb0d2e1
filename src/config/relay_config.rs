//! StatusRelay configuration file handling
//!
//! Loads and manages ~/.config/statusrelay/config.yaml: server settings,
//! Jira pacing, and per-user platform profiles.

use super::platform::PlatformConfig;
use crate::integrations::jira::WorklogPacing;
use crate::model::Platform;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Profile used when a request carries no user id, or an unknown one
pub const DEFAULT_PROFILE: &str = "default";

fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("statusrelay");
    path
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// SQLite database holding update records
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Request body size limit in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_database() -> PathBuf {
    config_dir().join("updates.db")
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database: default_database(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Jira worklog delivery pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraPublishSettings {
    /// Attempts per entry, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts for one entry
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Delay between consecutive entries
    #[serde(default = "default_entry_delay_secs")]
    pub entry_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_entry_delay_secs() -> u64 {
    2
}

impl Default for JiraPublishSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            entry_delay_secs: default_entry_delay_secs(),
        }
    }
}

impl JiraPublishSettings {
    pub fn pacing(&self) -> WorklogPacing {
        WorklogPacing {
            max_attempts: self.max_attempts.max(1),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            entry_delay: Duration::from_secs(self.entry_delay_secs),
        }
    }
}

/// Platform settings for one user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<PlatformConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<PlatformConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira: Option<PlatformConfig>,
}

impl PlatformProfiles {
    pub fn get(&self, platform: Platform) -> Option<&PlatformConfig> {
        match platform {
            Platform::Slack => self.slack.as_ref(),
            Platform::Teams => self.teams.as_ref(),
            Platform::Jira => self.jira.as_ref(),
        }
    }
}

/// Source of platform configuration, consulted once per publish attempt
pub trait ConfigSource: Send + Sync {
    /// Settings for `platform` as configured for user `uid`
    fn platform_config(&self, uid: &str, platform: Platform) -> Result<Option<PlatformConfig>>;
}

/// StatusRelay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Base URL of the Slack Web API
    #[serde(default = "default_slack_api_base")]
    pub slack_api_base: String,

    #[serde(default)]
    pub jira_publish: JiraPublishSettings,

    /// Platform settings keyed by user id
    #[serde(default)]
    pub profiles: BTreeMap<String, PlatformProfiles>,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

impl RelayConfig {
    /// Create a new configuration with an empty default profile
    pub fn new() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), PlatformProfiles::default());
        Self {
            server: ServerConfig::default(),
            slack_api_base: default_slack_api_base(),
            jira_publish: JiraPublishSettings::default(),
            profiles,
        }
    }

    /// Load configuration from the default path
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::RelayError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading StatusRelay configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            profiles = config.profiles.len(),
            bind = %config.server.bind,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving StatusRelay configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/statusrelay/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Profile for `uid`, falling back to the default profile
    pub fn profile(&self, uid: &str) -> Option<&PlatformProfiles> {
        self.profiles
            .get(uid)
            .or_else(|| self.profiles.get(DEFAULT_PROFILE))
    }

    pub fn profile_mut(&mut self, uid: &str) -> &mut PlatformProfiles {
        self.profiles.entry(uid.to_string()).or_default()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for RelayConfig {
    fn platform_config(&self, uid: &str, platform: Platform) -> Result<Option<PlatformConfig>> {
        Ok(self.profile(uid).and_then(|p| p.get(platform)).cloned())
    }
}
