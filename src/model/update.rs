//! Update and work-log entry records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A delivery target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Teams,
    Jira,
}

impl Platform {
    /// Publish order used by the orchestrator
    pub const ALL: [Platform; 3] = [Platform::Slack, Platform::Teams, Platform::Jira];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Teams => "teams",
            Platform::Jira => "jira",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of one platform for one update
///
/// `Skipped` is terminal and only assigned at creation. `Sent` is terminal.
/// `Pending` and `Failed` are eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl PlatformStatus {
    /// Status a platform starts in when an update is created
    pub fn initial(enabled: bool, has_content: bool) -> Self {
        if enabled && has_content {
            PlatformStatus::Pending
        } else {
            PlatformStatus::Skipped
        }
    }

    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, PlatformStatus::Pending | PlatformStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStatus::Pending => "PENDING",
            PlatformStatus::Sent => "SENT",
            PlatformStatus::Failed => "FAILED",
            PlatformStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformStatus {
    type Err = crate::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PlatformStatus::Pending),
            "SENT" => Ok(PlatformStatus::Sent),
            "FAILED" => Ok(PlatformStatus::Failed),
            "SKIPPED" => Ok(PlatformStatus::Skipped),
            other => Err(crate::RelayError::Parse(format!(
                "Unknown platform status: {}",
                other
            ))),
        }
    }
}

/// One billable time record destined for Jira
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLogEntry {
    pub id: String,
    pub issue_key: String,
    pub time_spent_secs: i64,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_repeat: bool,
    /// Set once Jira accepts the entry; delivered entries are never re-sent
    #[serde(default)]
    pub jira_worklog_id: Option<String>,
}

impl WorkLogEntry {
    pub fn is_delivered(&self) -> bool {
        self.jira_worklog_id.is_some()
    }
}

/// Generate a fresh entry identifier
pub fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One day's status report as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub raw_transcript: String,
    pub slack_output: String,
    pub teams_output: String,
    pub work_log_entries: Vec<WorkLogEntry>,
    pub slack_status: PlatformStatus,
    pub teams_status: PlatformStatus,
    pub jira_status: PlatformStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Update {
    pub fn status(&self, platform: Platform) -> PlatformStatus {
        match platform {
            Platform::Slack => self.slack_status,
            Platform::Teams => self.teams_status,
            Platform::Jira => self.jira_status,
        }
    }

    /// Formatted text for a chat platform (empty for Jira)
    pub fn output(&self, platform: Platform) -> &str {
        match platform {
            Platform::Slack => &self.slack_output,
            Platform::Teams => &self.teams_output,
            Platform::Jira => "",
        }
    }
}

/// Fields of an update before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpdate {
    pub user_id: String,
    pub date: NaiveDate,
    pub raw_transcript: String,
    pub slack_output: String,
    pub teams_output: String,
    pub work_log_entries: Vec<WorkLogEntry>,
    pub slack_status: PlatformStatus,
    pub teams_status: PlatformStatus,
    pub jira_status: PlatformStatus,
}
