//! Inbound request bodies and store-level patch/filter types

use super::update::{new_entry_id, Platform, PlatformStatus, WorkLogEntry};
use crate::timefmt;
use crate::{RelayError, Result};
use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

lazy_static! {
    /// Jira issue key, e.g. `PROJ-123`
    static ref ISSUE_KEY: Regex =
        Regex::new(r"^[A-Z][A-Z0-9_]*-\d+$").expect("issue key pattern is valid");
}

/// Work-log entry as submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLogEntryInput {
    /// Present when the client echoes back an entry it received earlier
    #[serde(default)]
    pub id: Option<String>,
    pub issue_key: String,
    pub time_spent_secs: i64,
    /// ISO-like timestamp; read as wall clock in the Jira timezone when it has no zone
    pub started: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_repeat: bool,
}

impl WorkLogEntryInput {
    /// Convert into an undelivered entry, keeping the client id if one was sent
    pub fn into_entry(self, tz: Tz) -> Result<WorkLogEntry> {
        let issue_key = self.issue_key.trim().to_string();
        if issue_key.is_empty() {
            return Err(RelayError::Validation(
                "workLogEntries[].issueKey is required".to_string(),
            ));
        }
        if !ISSUE_KEY.is_match(&issue_key) {
            return Err(RelayError::Validation(format!(
                "workLogEntries[].issueKey is not a Jira issue key: {}",
                issue_key
            )));
        }
        let started = timefmt::parse_as_wall_clock(&self.started, tz)
            .map_err(|e| RelayError::Validation(e.to_string()))?;

        Ok(WorkLogEntry {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_entry_id),
            issue_key,
            time_spent_secs: self.time_spent_secs,
            started,
            comment: self.comment.filter(|c| !c.trim().is_empty()),
            is_repeat: self.is_repeat,
            jira_worklog_id: None,
        })
    }
}

impl From<&WorkLogEntry> for WorkLogEntryInput {
    fn from(entry: &WorkLogEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            issue_key: entry.issue_key.clone(),
            time_spent_secs: entry.time_spent_secs,
            started: entry.started.to_rfc3339(),
            comment: entry.comment.clone(),
            is_repeat: entry.is_repeat,
        }
    }
}

/// Body of `POST /api/updates`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUpdateRequest {
    pub date: String,
    #[serde(default)]
    pub raw_transcript: String,
    #[serde(default)]
    pub slack_output: String,
    #[serde(default)]
    pub teams_output: String,
    #[serde(default)]
    pub work_log_entries: Vec<WorkLogEntryInput>,
    #[serde(default)]
    pub slack_enabled: bool,
    #[serde(default)]
    pub teams_enabled: bool,
    #[serde(default)]
    pub jira_enabled: bool,
}

/// Body of `PUT /api/updates`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryUpdateRequest {
    #[serde(default)]
    pub update_id: Option<String>,
    #[serde(default)]
    pub slack_output: Option<String>,
    #[serde(default)]
    pub teams_output: Option<String>,
    #[serde(default)]
    pub work_log_entries: Option<Vec<WorkLogEntryInput>>,
    #[serde(default)]
    pub retry_slack: bool,
    #[serde(default)]
    pub retry_teams: bool,
    #[serde(default)]
    pub retry_jira: bool,
}

impl RetryUpdateRequest {
    pub fn wants(&self, platform: Platform) -> bool {
        match platform {
            Platform::Slack => self.retry_slack,
            Platform::Teams => self.retry_teams,
            Platform::Jira => self.retry_jira,
        }
    }

    /// Replacement text for a chat platform, if the caller edited it
    pub fn output(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Slack => self.slack_output.as_deref(),
            Platform::Teams => self.teams_output.as_deref(),
            Platform::Jira => None,
        }
    }
}

/// Partial update of a stored record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePatch {
    pub slack_output: Option<String>,
    pub teams_output: Option<String>,
    pub work_log_entries: Option<Vec<WorkLogEntry>>,
    pub slack_status: Option<PlatformStatus>,
    pub teams_status: Option<PlatformStatus>,
    pub jira_status: Option<PlatformStatus>,
}

impl UpdatePatch {
    pub fn status(platform: Platform, status: PlatformStatus) -> Self {
        Self::default().with_status(platform, status)
    }

    pub fn with_status(mut self, platform: Platform, status: PlatformStatus) -> Self {
        match platform {
            Platform::Slack => self.slack_status = Some(status),
            Platform::Teams => self.teams_status = Some(status),
            Platform::Jira => self.jira_status = Some(status),
        }
        self
    }

    pub fn with_output(mut self, platform: Platform, text: impl Into<String>) -> Self {
        match platform {
            Platform::Slack => self.slack_output = Some(text.into()),
            Platform::Teams => self.teams_output = Some(text.into()),
            Platform::Jira => {}
        }
        self
    }

    pub fn with_entries(mut self, entries: Vec<WorkLogEntry>) -> Self {
        self.work_log_entries = Some(entries);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A calendar month written as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    /// First day of this month and first day of the next one
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN);
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        }
        .unwrap_or(NaiveDate::MAX);
        (first, next)
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl FromStr for Month {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RelayError::Validation(format!("Invalid month (expected YYYY-MM): {}", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

/// Selection criteria for listing updates
#[derive(Debug, Clone, Default)]
pub struct UpdateFilter {
    pub user_id: Option<String>,
    pub month: Option<Month>,
}
