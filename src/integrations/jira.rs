//! Jira worklog publisher
//!
//! Posts work-log entries to `POST {base}/rest/api/3/issue/{key}/worklog` one at
//! a time. Delivered entries carry the worklog id Jira returned and are never
//! posted again, so publishing the same batch twice is safe.

use super::retry::{decision_for_status, with_retry, RetryConfig, RetryDecision, RetryableError};
use crate::config::JiraCredentials;
use crate::metrics;
use crate::model::{PlatformStatus, WorkLogEntry};
use crate::timefmt;
use crate::RelayError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Default client timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for worklog creation
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Attempt ceiling and delays for worklog delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorklogPacing {
    /// Attempts per entry, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts for one entry
    pub retry_delay: Duration,
    /// Delay inserted between consecutive entries
    pub entry_delay: Duration,
}

impl Default for WorklogPacing {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            entry_delay: Duration::from_secs(2),
        }
    }
}

impl WorklogPacing {
    fn retry_config(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_attempts, self.retry_delay)
    }
}

/// Worklog creation body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogRequest {
    pub time_spent: String,
    pub started: String,
    /// Atlassian document format
    pub comment: Value,
}

impl WorklogRequest {
    pub fn for_entry(entry: &WorkLogEntry, tz: chrono_tz::Tz) -> Self {
        Self {
            time_spent: timefmt::secs_to_duration(entry.time_spent_secs),
            started: timefmt::to_tracker_timestamp(entry.started, tz),
            comment: comment_document(entry.comment.as_deref()),
        }
    }
}

/// Wrap plain text in an ADF document, one paragraph per non-blank line
pub fn comment_document(text: Option<&str>) -> Value {
    let paragraphs: Vec<Value> = text
        .unwrap_or_default()
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            json!({
                "type": "paragraph",
                "content": [{ "type": "text", "text": line }]
            })
        })
        .collect();

    json!({
        "type": "doc",
        "version": 1,
        "content": paragraphs
    })
}

#[derive(Debug, Deserialize)]
struct WorklogCreated {
    id: String,
}

/// Failure of a single worklog POST
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorklogError {
    #[error("Jira returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    /// Jira accepted the request but the response could not be read
    #[error("Unexpected Jira response: {0}")]
    InvalidResponse(String),
    #[error("Invalid duration: {0}s")]
    InvalidDuration(i64),
}

impl RetryableError for WorklogError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            WorklogError::Status { status, .. } => decision_for_status(*status),
            WorklogError::Network(_) => RetryDecision::Retry,
            // the worklog may already exist; posting again could duplicate it
            WorklogError::InvalidResponse(_) => RetryDecision::NoRetry,
            WorklogError::InvalidDuration(_) => RetryDecision::NoRetry,
        }
    }
}

impl From<WorklogError> for RelayError {
    fn from(err: WorklogError) -> Self {
        RelayError::Integration(format!("Jira worklog failed: {}", err))
    }
}

/// Destination for worklogs
#[async_trait]
pub trait WorklogSink: Send + Sync {
    /// Create one worklog and return the id Jira assigned to it
    async fn add_worklog(
        &self,
        creds: &JiraCredentials,
        issue_key: &str,
        request: &WorklogRequest,
    ) -> Result<String, WorklogError>;
}

/// Jira REST client
pub struct JiraClient {
    client: Client,
}

impl JiraClient {
    pub fn new() -> crate::Result<Self> {
        let client = Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorklogSink for JiraClient {
    async fn add_worklog(
        &self,
        creds: &JiraCredentials,
        issue_key: &str,
        request: &WorklogRequest,
    ) -> Result<String, WorklogError> {
        let url = format!("{}/rest/api/3/issue/{}/worklog", creds.base_url, issue_key);

        debug!(issue_key = %issue_key, time_spent = %request.time_spent, "Posting Jira worklog");

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.email, Some(&creds.api_token))
            .json(request)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
            .map_err(|e| WorklogError::Network(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let created: WorklogCreated = response
                    .json()
                    .await
                    .map_err(|e| WorklogError::InvalidResponse(e.to_string()))?;
                Ok(created.id)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(WorklogError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

/// An entry that did not reach Jira
#[derive(Debug, Clone, PartialEq)]
pub struct FailedWorklog {
    pub entry_id: String,
    pub issue_key: String,
    pub reason: String,
}

/// Outcome of one pass over a batch of entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JiraPublishReport {
    /// Entries delivered during this pass
    pub sent: usize,
    /// Entries skipped because an earlier pass delivered them
    pub already_delivered: usize,
    pub failures: Vec<FailedWorklog>,
}

impl JiraPublishReport {
    /// `SENT` iff nothing failed
    pub fn status(&self) -> PlatformStatus {
        if self.failures.is_empty() {
            PlatformStatus::Sent
        } else {
            PlatformStatus::Failed
        }
    }
}

/// Deliver every undelivered entry, in order, recording worklog ids in place
pub async fn publish_worklogs(
    sink: &dyn WorklogSink,
    creds: &JiraCredentials,
    entries: &mut [WorkLogEntry],
    pacing: &WorklogPacing,
) -> JiraPublishReport {
    let retry = pacing.retry_config();
    let mut report = JiraPublishReport::default();
    let mut attempted_any = false;

    for entry in entries.iter_mut() {
        if entry.is_delivered() {
            debug!(
                entry_id = %entry.id,
                issue_key = %entry.issue_key,
                "Worklog already delivered, skipping"
            );
            report.already_delivered += 1;
            continue;
        }

        if entry.time_spent_secs <= 0 {
            let err = WorklogError::InvalidDuration(entry.time_spent_secs);
            warn!(entry_id = %entry.id, issue_key = %entry.issue_key, "{}", err);
            report.failures.push(FailedWorklog {
                entry_id: entry.id.clone(),
                issue_key: entry.issue_key.clone(),
                reason: err.to_string(),
            });
            continue;
        }

        if attempted_any && !pacing.entry_delay.is_zero() {
            sleep(pacing.entry_delay).await;
        }
        attempted_any = true;

        let request = WorklogRequest::for_entry(entry, creds.timezone);
        let issue_key = entry.issue_key.as_str();
        let request_ref = &request;
        let op_name = format!("jira worklog {}", issue_key);

        let result = with_retry(&retry, &op_name, move || async move {
            let result = sink.add_worklog(creds, issue_key, request_ref).await;
            let outcome = match &result {
                Ok(_) => "success",
                Err(e) if e.retry_decision() == RetryDecision::Retry => "transient",
                Err(_) => "rejected",
            };
            metrics::record_worklog_attempt(outcome);
            result
        })
        .await;

        match result {
            Ok(worklog_id) => {
                info!(
                    entry_id = %entry.id,
                    issue_key = %entry.issue_key,
                    worklog_id = %worklog_id,
                    "Worklog delivered"
                );
                entry.jira_worklog_id = Some(worklog_id);
                report.sent += 1;
            }
            Err(e) => {
                warn!(
                    entry_id = %entry.id,
                    issue_key = %entry.issue_key,
                    error = %e,
                    "Worklog failed"
                );
                report.failures.push(FailedWorklog {
                    entry_id: entry.id.clone(),
                    issue_key: entry.issue_key.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        sent = report.sent,
        already_delivered = report.already_delivered,
        failed = report.failures.len(),
        "Jira worklog pass complete"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every call; issue keys in `failures` answer with that HTTP status
    #[derive(Default)]
    struct FakeSink {
        calls: Mutex<Vec<String>>,
        call_times: Mutex<Vec<tokio::time::Instant>>,
        failures: HashMap<String, u16>,
    }

    impl FakeSink {
        fn failing(key: &str, status: u16) -> Self {
            let mut failures = HashMap::new();
            failures.insert(key.to_string(), status);
            Self {
                failures,
                ..Default::default()
            }
        }

        fn calls_for(&self, key: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Time between consecutive calls
        fn gaps(&self) -> Vec<Duration> {
            let times = self.call_times.lock().unwrap();
            times.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl WorklogSink for FakeSink {
        async fn add_worklog(
            &self,
            _creds: &JiraCredentials,
            issue_key: &str,
            _request: &WorklogRequest,
        ) -> Result<String, WorklogError> {
            self.call_times.lock().unwrap().push(tokio::time::Instant::now());
            let mut calls = self.calls.lock().unwrap();
            calls.push(issue_key.to_string());
            if let Some(status) = self.failures.get(issue_key) {
                return Err(WorklogError::Status {
                    status: *status,
                    body: "nope".to_string(),
                });
            }
            Ok(format!("wl-{}", calls.len()))
        }
    }

    fn creds() -> JiraCredentials {
        JiraCredentials {
            base_url: "https://acme.atlassian.net".to_string(),
            email: "dev@acme.io".to_string(),
            api_token: "token".to_string(),
            timezone: chrono_tz::Asia::Kolkata,
        }
    }

    fn fast() -> WorklogPacing {
        WorklogPacing {
            max_attempts: 3,
            retry_delay: Duration::ZERO,
            entry_delay: Duration::ZERO,
        }
    }

    fn entry(id: &str, key: &str, secs: i64) -> WorkLogEntry {
        WorkLogEntry {
            id: id.to_string(),
            issue_key: key.to_string(),
            time_spent_secs: secs,
            started: Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap(),
            comment: Some("Reviewed PR\n\nFixed flaky test".to_string()),
            is_repeat: false,
            jira_worklog_id: None,
        }
    }

    #[test]
    fn test_worklog_request_body() {
        let request =
            WorklogRequest::for_entry(&entry("e1", "PROJ-1", 5400), chrono_tz::Asia::Kolkata);
        assert_eq!(request.time_spent, "1h30m");
        assert_eq!(request.started, "2024-03-15T14:00:00.000+0530");

        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("timeSpent").is_some());
        assert_eq!(body["comment"]["type"], "doc");
        assert_eq!(body["comment"]["content"].as_array().unwrap().len(), 2);
        assert_eq!(body["comment"]["content"][1]["content"][0]["text"], "Fixed flaky test");
    }

    #[test]
    fn test_empty_comment_document() {
        let doc = comment_document(None);
        assert_eq!(doc["content"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_error_classification() {
        let status = |s| WorklogError::Status {
            status: s,
            body: String::new(),
        };
        assert_eq!(status(429).retry_decision(), RetryDecision::Retry);
        assert_eq!(status(502).retry_decision(), RetryDecision::Retry);
        assert_eq!(status(400).retry_decision(), RetryDecision::NoRetry);
        assert_eq!(status(401).retry_decision(), RetryDecision::NoRetry);
        assert_eq!(
            WorklogError::Network("reset".into()).retry_decision(),
            RetryDecision::Retry
        );
    }

    #[tokio::test]
    async fn test_all_entries_delivered() {
        let sink = FakeSink::default();
        let mut entries = vec![entry("e1", "PROJ-1", 3600), entry("e2", "PROJ-2", 1800)];

        let report = publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;

        assert_eq!(report.status(), PlatformStatus::Sent);
        assert_eq!(report.sent, 2);
        assert!(entries.iter().all(WorkLogEntry::is_delivered));
        assert_eq!(sink.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_second_pass_sends_nothing() {
        let sink = FakeSink::default();
        let mut entries = vec![entry("e1", "PROJ-1", 3600), entry("e2", "PROJ-2", 1800)];

        publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;
        let ids: Vec<_> = entries.iter().map(|e| e.jira_worklog_id.clone()).collect();

        let report = publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;
        let ids_again: Vec<_> = entries.iter().map(|e| e.jira_worklog_id.clone()).collect();

        assert_eq!(sink.total_calls(), 2);
        assert_eq!(report.already_delivered, 2);
        assert_eq!(report.sent, 0);
        assert_eq!(ids, ids_again);
    }

    #[tokio::test]
    async fn test_zero_duration_never_attempted() {
        let sink = FakeSink::default();
        let mut entries = vec![entry("e1", "PROJ-1", 0), entry("e2", "PROJ-2", 900)];

        let report = publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;
        assert_eq!(report.status(), PlatformStatus::Failed);
        assert_eq!(report.failures[0].entry_id, "e1");
        assert_eq!(sink.calls_for("PROJ-1"), 0);
        assert!(entries[1].is_delivered());

        publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;
        assert_eq!(sink.calls_for("PROJ-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_pacing_between_entries_and_attempts() {
        let sink = FakeSink::failing("PROJ-2", 503);
        let mut entries = vec![
            entry("e1", "PROJ-1", 600),
            entry("e2", "PROJ-2", 600),
            entry("e3", "PROJ-3", 600),
        ];

        publish_worklogs(&sink, &creds(), &mut entries, &WorklogPacing::default()).await;

        assert_eq!(sink.calls_for("PROJ-2"), 3);
        let secs = Duration::from_secs;
        // entry gap, two retry gaps, entry gap
        assert_eq!(sink.gaps(), vec![secs(2), secs(5), secs(5), secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_entries_add_no_delay() {
        let sink = FakeSink::default();
        let mut delivered = entry("e1", "PROJ-1", 600);
        delivered.jira_worklog_id = Some("wl-0".to_string());
        let mut entries = vec![
            delivered,
            entry("e2", "PROJ-2", 0),
            entry("e3", "PROJ-3", 600),
            entry("e4", "PROJ-4", 600),
        ];

        let started = tokio::time::Instant::now();
        publish_worklogs(&sink, &creds(), &mut entries, &WorklogPacing::default()).await;

        assert_eq!(sink.total_calls(), 2);
        assert_eq!(sink.gaps(), vec![Duration::from_secs(2)]);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_visible_to_scoped_subscriber() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let sink = FakeSink::failing("PROJ-9", 400);
        let mut entries = vec![entry("e1", "PROJ-9", 600)];
        publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Worklog failed"));
        assert!(output.contains("PROJ-9"));
    }

    #[tokio::test]
    async fn test_transient_error_hits_attempt_ceiling() {
        let sink = FakeSink::failing("PROJ-1", 503);
        let mut entries = vec![entry("e1", "PROJ-1", 3600), entry("e2", "PROJ-2", 600)];

        let report = publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;

        assert_eq!(sink.calls_for("PROJ-1"), 3);
        assert_eq!(sink.calls_for("PROJ-2"), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.contains("503"));
        assert!(!entries[0].is_delivered());
        assert!(entries[1].is_delivered());
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let sink = FakeSink::failing("PROJ-404", 400);
        let mut entries = vec![entry("e1", "PROJ-404", 3600)];

        let report = publish_worklogs(&sink, &creds(), &mut entries, &fast()).await;

        assert_eq!(sink.calls_for("PROJ-404"), 1);
        assert_eq!(report.status(), PlatformStatus::Failed);
    }
}
