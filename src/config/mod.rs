//! Configuration system
//!
//! Loads ~/.config/statusrelay/config.yaml with support for:
//! - Per-user platform profiles (Slack, Teams, Jira)
//! - Slack webhook or thread-reply delivery
//! - Jira worklog pacing
//! - HTTP server settings

mod platform;
mod relay_config;
pub mod validation;

pub use platform::{
    JiraCredentials, PlatformConfig, SlackMode, ThreadTarget, WorkflowAnchor,
    DEFAULT_THREAD_MATCH_TEXT,
};
pub use relay_config::{
    ConfigSource, JiraPublishSettings, PlatformProfiles, RelayConfig, ServerConfig,
    DEFAULT_PROFILE,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
