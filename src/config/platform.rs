//! Per-platform credentials and delivery-mode selection

use crate::integrations::decorate::{Mentions, Person};
use crate::timefmt;
use crate::{RelayError, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Text used to find the workflow message when none is configured
pub const DEFAULT_THREAD_MATCH_TEXT: &str = "Daily Status Update";

fn default_active() -> bool {
    true
}

/// Settings for one platform of one user
///
/// A single shape covers Slack, Teams and Jira; each platform reads the fields
/// it needs through the typed accessors below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Slack incoming webhook or Teams webhook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Slack bot token (inline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// Environment variable holding the Slack bot token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Reply inside the workflow thread instead of posting via webhook
    #[serde(default)]
    pub thread_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_match_text: Option<String>,
    /// Time the workflow message is posted, `HH:MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_timezone: Option<String>,

    /// Jira site, e.g. `https://acme.atlassian.net`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token_env: Option<String>,
    /// Timezone worklog times are rendered in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_lead_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_lead_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            webhook_url: None,
            bot_token: None,
            bot_token_env: None,
            channel_id: None,
            thread_mode: false,
            thread_match_text: None,
            workflow_time: None,
            workflow_timezone: None,
            base_url: None,
            email: None,
            api_token: None,
            api_token_env: None,
            timezone: None,
            team_lead_name: None,
            team_lead_id: None,
            user_id: None,
            user_name: None,
        }
    }
}

/// Where the Slack workflow message is expected to appear
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowAnchor {
    pub time: NaiveTime,
    pub timezone: Tz,
}

/// Slack thread-reply settings
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadTarget {
    pub bot_token: String,
    pub channel_id: String,
    pub match_text: String,
    pub anchor: Option<WorkflowAnchor>,
}

/// How a Slack update is delivered
#[derive(Debug, Clone, PartialEq)]
pub enum SlackMode {
    Webhook { url: String },
    Thread(ThreadTarget),
}

/// Jira REST credentials
#[derive(Debug, Clone)]
pub struct JiraCredentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub timezone: Tz,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Inline secret first, then the named environment variable
fn resolve_secret(inline: Option<&String>, env_var: Option<&String>) -> Option<String> {
    non_blank(inline).or_else(|| {
        env_var
            .and_then(|name| std::env::var(name.trim_start_matches('$')).ok())
            .filter(|v| !v.trim().is_empty())
    })
}

impl PlatformConfig {
    pub fn slack_mode(&self) -> Result<SlackMode> {
        if !self.thread_mode {
            let url = non_blank(self.webhook_url.as_ref()).ok_or_else(|| {
                RelayError::Config("Slack webhook mode requires webhook_url".to_string())
            })?;
            return Ok(SlackMode::Webhook { url });
        }

        let bot_token = resolve_secret(self.bot_token.as_ref(), self.bot_token_env.as_ref())
            .ok_or_else(|| {
                RelayError::Config("Slack thread mode requires a bot token".to_string())
            })?;
        let channel_id = non_blank(self.channel_id.as_ref()).ok_or_else(|| {
            RelayError::Config("Slack thread mode requires channel_id".to_string())
        })?;
        let match_text = non_blank(self.thread_match_text.as_ref())
            .unwrap_or_else(|| DEFAULT_THREAD_MATCH_TEXT.to_string());

        let anchor = match (
            non_blank(self.workflow_time.as_ref()),
            non_blank(self.workflow_timezone.as_ref()),
        ) {
            (Some(time), Some(tz)) => Some(WorkflowAnchor {
                time: timefmt::parse_workflow_time(&time)?,
                timezone: timefmt::parse_timezone(&tz)?,
            }),
            _ => None,
        };

        Ok(SlackMode::Thread(ThreadTarget {
            bot_token,
            channel_id,
            match_text,
            anchor,
        }))
    }

    pub fn teams_webhook(&self) -> Result<String> {
        non_blank(self.webhook_url.as_ref())
            .ok_or_else(|| RelayError::Config("Teams requires webhook_url".to_string()))
    }

    pub fn jira_credentials(&self) -> Result<JiraCredentials> {
        let missing = |field: &str| RelayError::Config(format!("Jira requires {}", field));

        let base_url = non_blank(self.base_url.as_ref()).ok_or_else(|| missing("base_url"))?;
        let email = non_blank(self.email.as_ref()).ok_or_else(|| missing("email"))?;
        let api_token = resolve_secret(self.api_token.as_ref(), self.api_token_env.as_ref())
            .ok_or_else(|| missing("api_token"))?;

        Ok(JiraCredentials {
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            api_token,
            timezone: self.jira_timezone()?,
        })
    }

    /// Timezone for worklog times; UTC when unset
    pub fn jira_timezone(&self) -> Result<Tz> {
        match non_blank(self.timezone.as_ref()) {
            Some(tz) => timefmt::parse_timezone(&tz),
            None => Ok(chrono_tz::UTC),
        }
    }

    pub fn mentions(&self) -> Mentions {
        Mentions {
            user: Person::from_parts(self.user_id.as_deref(), self.user_name.as_deref()),
            lead: Person::from_parts(self.team_lead_id.as_deref(), self.team_lead_name.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_mode() {
        let config = PlatformConfig {
            webhook_url: Some("https://hooks.slack.com/services/T/B/X".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.slack_mode().unwrap(),
            SlackMode::Webhook {
                url: "https://hooks.slack.com/services/T/B/X".to_string()
            }
        );
    }

    #[test]
    fn test_thread_mode_defaults_match_text() {
        let config = PlatformConfig {
            thread_mode: true,
            bot_token: Some("xoxb-1".to_string()),
            channel_id: Some("C1".to_string()),
            workflow_time: Some("09:30".to_string()),
            workflow_timezone: Some("Asia/Kolkata".to_string()),
            ..Default::default()
        };
        match config.slack_mode().unwrap() {
            SlackMode::Thread(target) => {
                assert_eq!(target.match_text, DEFAULT_THREAD_MATCH_TEXT);
                let anchor = target.anchor.unwrap();
                assert_eq!(anchor.timezone, chrono_tz::Asia::Kolkata);
            }
            other => panic!("unexpected mode: {:?}", other),
        }
    }

    #[test]
    fn test_thread_mode_requires_channel() {
        let config = PlatformConfig {
            thread_mode: true,
            bot_token: Some("xoxb-1".to_string()),
            ..Default::default()
        };
        assert!(config.slack_mode().is_err());
    }

    #[test]
    fn test_thread_mode_token_from_env() {
        std::env::set_var("STATUSRELAY_TEST_SLACK_TOKEN", "xoxb-env");
        let config = PlatformConfig {
            thread_mode: true,
            bot_token_env: Some("$STATUSRELAY_TEST_SLACK_TOKEN".to_string()),
            channel_id: Some("C1".to_string()),
            ..Default::default()
        };
        match config.slack_mode().unwrap() {
            SlackMode::Thread(target) => assert_eq!(target.bot_token, "xoxb-env"),
            other => panic!("unexpected mode: {:?}", other),
        }
    }

    #[test]
    fn test_jira_credentials() {
        let config = PlatformConfig {
            base_url: Some("https://acme.atlassian.net/".to_string()),
            email: Some("dev@acme.io".to_string()),
            api_token: Some("secret".to_string()),
            timezone: Some("America/New_York".to_string()),
            ..Default::default()
        };
        let creds = config.jira_credentials().unwrap();
        assert_eq!(creds.base_url, "https://acme.atlassian.net");
        assert_eq!(creds.timezone, chrono_tz::America::New_York);

        let incomplete = PlatformConfig {
            base_url: Some("https://acme.atlassian.net".to_string()),
            ..Default::default()
        };
        assert!(incomplete.jira_credentials().is_err());
    }

    #[test]
    fn test_mentions() {
        let config = PlatformConfig {
            user_id: Some("U1".to_string()),
            team_lead_name: Some("Sam".to_string()),
            ..Default::default()
        };
        let mentions = config.mentions();
        assert_eq!(mentions.user.unwrap().id.as_deref(), Some("U1"));
        assert_eq!(mentions.lead.unwrap().name.as_deref(), Some("Sam"));
    }
}
