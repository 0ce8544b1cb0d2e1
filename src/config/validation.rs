//! Configuration validation
//!
//! Validates StatusRelay configuration for correctness:
//! - At least one profile is defined
//! - Active platforms carry the credentials their delivery mode needs
//! - URLs, timezones and workflow times parse
//! - Jira pacing is usable

use super::platform::PlatformConfig;
use super::relay_config::RelayConfig;
use crate::timefmt;
use crate::RelayError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub profile: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            profile: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref profile) = self.profile {
            write!(f, "[{}] {}: {}", profile, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a StatusRelay configuration
pub fn validate_config(config: &RelayConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.profiles.is_empty() {
        errors.push(ValidationError::new(
            "profiles",
            "At least one profile must be defined",
        ));
    }

    if !is_http_url(&config.slack_api_base) {
        errors.push(ValidationError::new(
            "slack_api_base",
            format!("Invalid URL: {}", config.slack_api_base),
        ));
    }

    if config.jira_publish.max_attempts == 0 {
        errors.push(ValidationError::new(
            "jira_publish.max_attempts",
            "Must allow at least one attempt",
        ));
    }

    for (name, profile) in &config.profiles {
        let mut profile_errors = Vec::new();
        if let Some(ref slack) = profile.slack {
            validate_slack(slack, &mut profile_errors);
        }
        if let Some(ref teams) = profile.teams {
            validate_teams(teams, &mut profile_errors);
        }
        if let Some(ref jira) = profile.jira {
            validate_jira(jira, &mut profile_errors);
        }
        errors.extend(profile_errors.into_iter().map(|e| e.with_profile(name)));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_slack(slack: &PlatformConfig, errors: &mut Vec<ValidationError>) {
    if !slack.is_active {
        return;
    }

    if slack.thread_mode {
        let has_token = slack.bot_token.as_deref().is_some_and(|t| !t.trim().is_empty())
            || slack.bot_token_env.is_some();
        if !has_token {
            errors.push(ValidationError::new(
                "slack.bot_token",
                "Thread mode requires bot_token or bot_token_env",
            ));
        }
        if let Some(ref env_var) = slack.bot_token_env {
            warn_if_unset(env_var);
        }
        if slack.channel_id.as_deref().map_or(true, |c| c.trim().is_empty()) {
            errors.push(ValidationError::new(
                "slack.channel_id",
                "Thread mode requires channel_id",
            ));
        }
        match (&slack.workflow_time, &slack.workflow_timezone) {
            (Some(time), Some(tz)) => {
                if let Err(e) = timefmt::parse_workflow_time(time) {
                    errors.push(ValidationError::new("slack.workflow_time", e.to_string()));
                }
                if let Err(e) = timefmt::parse_timezone(tz) {
                    errors.push(ValidationError::new("slack.workflow_timezone", e.to_string()));
                }
            }
            (Some(_), None) | (None, Some(_)) => errors.push(ValidationError::new(
                "slack.workflow_time",
                "workflow_time and workflow_timezone must be set together",
            )),
            (None, None) => {}
        }
    } else {
        check_webhook("slack.webhook_url", slack.webhook_url.as_deref(), errors);
    }
}

fn validate_teams(teams: &PlatformConfig, errors: &mut Vec<ValidationError>) {
    if teams.is_active {
        check_webhook("teams.webhook_url", teams.webhook_url.as_deref(), errors);
    }
}

fn validate_jira(jira: &PlatformConfig, errors: &mut Vec<ValidationError>) {
    if !jira.is_active {
        return;
    }

    match jira.base_url.as_deref() {
        Some(url) if is_http_url(url) => {}
        Some(url) => errors.push(ValidationError::new(
            "jira.base_url",
            format!("Invalid Jira URL: {}", url),
        )),
        None => errors.push(ValidationError::new("jira.base_url", "Jira requires base_url")),
    }

    if jira.email.as_deref().map_or(true, |e| !e.contains('@')) {
        errors.push(ValidationError::new(
            "jira.email",
            "Jira requires the account email",
        ));
    }

    if jira.api_token.is_none() && jira.api_token_env.is_none() {
        errors.push(ValidationError::new(
            "jira.api_token",
            "Jira requires api_token or api_token_env",
        ));
    }
    if let Some(ref env_var) = jira.api_token_env {
        warn_if_unset(env_var);
    }

    if let Some(ref tz) = jira.timezone {
        if let Err(e) = timefmt::parse_timezone(tz) {
            errors.push(ValidationError::new("jira.timezone", e.to_string()));
        }
    }
}

fn check_webhook(field: &str, url: Option<&str>, errors: &mut Vec<ValidationError>) {
    match url {
        Some(url) if is_http_url(url) => {}
        Some(url) => errors.push(ValidationError::new(
            field,
            format!("Invalid webhook URL: {}", url),
        )),
        None => errors.push(ValidationError::new(field, "Webhook URL is required")),
    }
}

fn warn_if_unset(env_var: &str) {
    let name = env_var.trim_start_matches('$');
    if std::env::var(name).is_err() {
        tracing::warn!(
            env_var = %name,
            "Environment variable not set (this may be intentional if set at runtime)"
        );
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &RelayConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        RelayError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROFILE;

    fn valid_config() -> RelayConfig {
        let mut config = RelayConfig::new();
        let profile = config.profile_mut(DEFAULT_PROFILE);
        profile.slack = Some(PlatformConfig {
            webhook_url: Some("https://hooks.slack.com/services/x".to_string()),
            ..Default::default()
        });
        profile.teams = Some(PlatformConfig {
            webhook_url: Some("https://acme.webhook.office.com/x".to_string()),
            ..Default::default()
        });
        profile.jira = Some(PlatformConfig {
            base_url: Some("https://acme.atlassian.net".to_string()),
            email: Some("dev@acme.io".to_string()),
            api_token: Some("token".to_string()),
            timezone: Some("Asia/Kolkata".to_string()),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_profiles() {
        let mut config = RelayConfig::new();
        config.profiles.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("At least one profile"));
    }

    #[test]
    fn test_thread_mode_requirements() {
        let mut config = valid_config();
        config.profile_mut(DEFAULT_PROFILE).slack = Some(PlatformConfig {
            thread_mode: true,
            workflow_time: Some("9am".to_string()),
            ..Default::default()
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"slack.bot_token"));
        assert!(fields.contains(&"slack.channel_id"));
        assert!(fields.contains(&"slack.workflow_time"));
        assert!(errors.iter().all(|e| e.profile.as_deref() == Some(DEFAULT_PROFILE)));
    }

    #[test]
    fn test_invalid_jira_settings() {
        let mut config = valid_config();
        if let Some(jira) = config.profile_mut(DEFAULT_PROFILE).jira.as_mut() {
            jira.base_url = Some("acme.atlassian.net".to_string());
            jira.timezone = Some("Nowhere/Special".to_string());
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_inactive_platform_not_validated() {
        let mut config = valid_config();
        config.profile_mut(DEFAULT_PROFILE).teams = Some(PlatformConfig {
            is_active: false,
            ..Default::default()
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_result_message_lists_problems() {
        let mut config = valid_config();
        config.jira_publish.max_attempts = 0;
        let err = validate_config_result(&config).unwrap_err();
        assert!(err.to_string().contains("jira_publish.max_attempts"));
    }
}
