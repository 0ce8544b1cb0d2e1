//! Publish orchestrator
//!
//! Fans a drafted update out to Slack, Teams and Jira (in that order) and
//! records each platform's outcome on the stored record. Platform failures,
//! including panics inside a publisher, become `FAILED` status data for that
//! platform only. Storage errors are the only errors that escape `create` and
//! `retry` once the request has been validated.

use super::merge::merge_retry_entries;
use crate::config::{ConfigSource, PlatformConfig};
use crate::integrations::jira::{
    publish_worklogs, JiraClient, JiraPublishReport, WorklogPacing, WorklogSink,
};
use crate::integrations::slack::SlackClient;
use crate::integrations::teams::TeamsClient;
use crate::integrations::ChatPublisher;
use crate::metrics;
use crate::model::{
    CreateUpdateRequest, Month, NewUpdate, Platform, PlatformStatus, RetryUpdateRequest, Update,
    UpdateFilter, UpdatePatch, WorkLogEntry, WorkLogEntryInput,
};
use crate::storage::UpdateStore;
use crate::{RelayError, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Publisher implementations for each platform
#[derive(Clone)]
pub struct PlatformClients {
    pub slack: Arc<dyn ChatPublisher>,
    pub teams: Arc<dyn ChatPublisher>,
    pub jira: Arc<dyn WorklogSink>,
}

impl PlatformClients {
    /// Real HTTP clients
    pub fn http(slack_api_base: &str) -> Result<Self> {
        Ok(Self {
            slack: Arc::new(SlackClient::new(slack_api_base)?),
            teams: Arc::new(TeamsClient::new()?),
            jira: Arc::new(JiraClient::new()?),
        })
    }

    fn chat(&self, platform: Platform) -> Option<&Arc<dyn ChatPublisher>> {
        match platform {
            Platform::Slack => Some(&self.slack),
            Platform::Teams => Some(&self.teams),
            Platform::Jira => None,
        }
    }
}

pub struct PublishOrchestrator {
    store: Arc<dyn UpdateStore>,
    config: Arc<dyn ConfigSource>,
    clients: PlatformClients,
    pacing: WorklogPacing,
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        RelayError::Validation(format!("Invalid date (expected YYYY-MM-DD): {}", value))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one platform's publish, turning errors and panics into `Err(reason)`
async fn contained<T, F>(platform: Platform, fut: F) -> std::result::Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(platform = %platform, panic = %reason, "Publisher panicked");
            Err(format!("publisher panicked: {}", reason))
        }
    }
}

impl PublishOrchestrator {
    pub fn new(
        store: Arc<dyn UpdateStore>,
        config: Arc<dyn ConfigSource>,
        clients: PlatformClients,
    ) -> Self {
        Self {
            store,
            config,
            clients,
            pacing: WorklogPacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: WorklogPacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Persist a drafted update, then publish every platform that starts `PENDING`
    pub async fn create(&self, uid: &str, request: CreateUpdateRequest) -> Result<Update> {
        let date = parse_date(&request.date)?;
        let entries = self.parse_entries(uid, request.work_log_entries)?;

        let new_update = NewUpdate {
            user_id: uid.to_string(),
            date,
            raw_transcript: request.raw_transcript,
            slack_status: PlatformStatus::initial(
                request.slack_enabled,
                !request.slack_output.trim().is_empty(),
            ),
            teams_status: PlatformStatus::initial(
                request.teams_enabled,
                !request.teams_output.trim().is_empty(),
            ),
            jira_status: PlatformStatus::initial(request.jira_enabled, !entries.is_empty()),
            slack_output: request.slack_output,
            teams_output: request.teams_output,
            work_log_entries: entries,
        };

        let id = self.store.create(&new_update)?;
        info!(
            update_id = %id,
            user_id = %uid,
            date = %date,
            slack = %new_update.slack_status,
            teams = %new_update.teams_status,
            jira = %new_update.jira_status,
            "Update created"
        );

        for platform in Platform::ALL {
            let status = match platform {
                Platform::Slack => new_update.slack_status,
                Platform::Teams => new_update.teams_status,
                Platform::Jira => new_update.jira_status,
            };
            if status != PlatformStatus::Pending {
                continue;
            }
            match platform {
                Platform::Jira => {
                    self.publish_jira(uid, &id, new_update.work_log_entries.clone())
                        .await?;
                }
                chat => {
                    let text = match chat {
                        Platform::Slack => &new_update.slack_output,
                        _ => &new_update.teams_output,
                    };
                    self.publish_chat(uid, &id, chat, text, date).await?;
                }
            }
        }

        self.require(&id)
    }

    /// Re-publish the requested platforms that have not been delivered yet
    pub async fn retry(&self, uid: &str, request: RetryUpdateRequest) -> Result<Update> {
        let id = request
            .update_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::Validation("updateId is required".to_string()))?
            .to_string();
        let update = self.owned(uid, &id)?;

        let targets: Vec<Platform> = Platform::ALL
            .into_iter()
            .filter(|p| request.wants(*p))
            .filter(|p| {
                let eligible = update.status(*p).is_retry_eligible();
                if !eligible {
                    debug!(
                        update_id = %id,
                        platform = %p,
                        status = %update.status(*p),
                        "Not retrying platform"
                    );
                }
                eligible
            })
            .collect();

        // parse before any platform is touched so a bad entry rejects the whole request
        let submitted = if targets.contains(&Platform::Jira) {
            match request.work_log_entries.clone() {
                Some(inputs) => Some(self.parse_entries(uid, inputs)?),
                None => None,
            }
        } else {
            None
        };

        info!(update_id = %id, platforms = ?targets, "Retrying update");

        for platform in targets {
            match platform {
                Platform::Jira => {
                    let submitted = submitted.clone().unwrap_or_default();
                    if submitted.is_empty() {
                        // Nothing was submitted: the record is closed out as sent.
                        // TODO: confirm with product whether this should reject the request.
                        warn!(
                            update_id = %id,
                            "Jira retry without work-log entries, marking as sent"
                        );
                        self.store.update(
                            &id,
                            &UpdatePatch::status(Platform::Jira, PlatformStatus::Sent),
                        )?;
                        metrics::record_publish(Platform::Jira, PlatformStatus::Sent);
                        continue;
                    }
                    let merged = merge_retry_entries(&update.work_log_entries, submitted);
                    self.store.update(
                        &id,
                        &UpdatePatch::status(Platform::Jira, PlatformStatus::Pending)
                            .with_entries(merged.clone()),
                    )?;
                    self.publish_jira(uid, &id, merged).await?;
                }
                chat => {
                    let mut patch = UpdatePatch::status(chat, PlatformStatus::Pending);
                    let text = match request.output(chat) {
                        Some(replacement) => {
                            patch = patch.with_output(chat, replacement);
                            replacement.to_string()
                        }
                        None => update.output(chat).to_string(),
                    };
                    self.store.update(&id, &patch)?;
                    self.publish_chat(uid, &id, chat, &text, update.date).await?;
                }
            }
        }

        self.require(&id)
    }

    /// A single update owned by `uid`
    pub fn get(&self, uid: &str, id: &str) -> Result<Update> {
        self.owned(uid, id)
    }

    /// Updates owned by `uid`, optionally limited to one month
    pub fn list(&self, uid: &str, month: Option<Month>) -> Result<Vec<Update>> {
        self.store.list(&UpdateFilter {
            user_id: Some(uid.to_string()),
            month,
        })
    }

    pub fn delete(&self, uid: &str, id: &str) -> Result<()> {
        self.owned(uid, id)?;
        if !self.store.delete(id)? {
            return Err(RelayError::NotFound(id.to_string()));
        }
        info!(update_id = %id, user_id = %uid, "Update deleted");
        Ok(())
    }

    fn require(&self, id: &str) -> Result<Update> {
        self.store
            .get(id)?
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    /// Other users' records are reported as missing
    fn owned(&self, uid: &str, id: &str) -> Result<Update> {
        let update = self.require(id)?;
        if update.user_id != uid {
            return Err(RelayError::NotFound(id.to_string()));
        }
        Ok(update)
    }

    /// Timezone entry times without an offset are read in
    fn entry_timezone(&self, uid: &str) -> Tz {
        self.config
            .platform_config(uid, Platform::Jira)
            .ok()
            .flatten()
            .and_then(|config| config.jira_timezone().ok())
            .unwrap_or(chrono_tz::UTC)
    }

    fn parse_entries(
        &self,
        uid: &str,
        inputs: Vec<WorkLogEntryInput>,
    ) -> Result<Vec<WorkLogEntry>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let tz = self.entry_timezone(uid);
        inputs.into_iter().map(|input| input.into_entry(tz)).collect()
    }

    /// Settings for an enabled platform; missing or inactive config is an error
    fn active_config(&self, uid: &str, platform: Platform) -> Result<PlatformConfig> {
        let config = self
            .config
            .platform_config(uid, platform)?
            .ok_or_else(|| {
                RelayError::Config(format!("No {} configuration for user {}", platform, uid))
            })?;
        if !config.is_active {
            return Err(RelayError::Config(format!(
                "{} integration is not active for user {}",
                platform, uid
            )));
        }
        Ok(config)
    }

    async fn send_chat(
        &self,
        uid: &str,
        platform: Platform,
        text: &str,
        date: NaiveDate,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(RelayError::Validation(format!("No {} text to send", platform)));
        }
        let config = self.active_config(uid, platform)?;
        let client = self
            .clients
            .chat(platform)
            .ok_or_else(|| RelayError::Other(format!("{} is not a chat platform", platform)))?;
        client.publish(&config, text, date).await
    }

    async fn send_worklogs(
        &self,
        uid: &str,
        entries: &mut [WorkLogEntry],
    ) -> Result<JiraPublishReport> {
        let config = self.active_config(uid, Platform::Jira)?;
        let creds = config.jira_credentials()?;
        Ok(publish_worklogs(self.clients.jira.as_ref(), &creds, entries, &self.pacing).await)
    }

    async fn publish_chat(
        &self,
        uid: &str,
        update_id: &str,
        platform: Platform,
        text: &str,
        date: NaiveDate,
    ) -> Result<PlatformStatus> {
        let started = Instant::now();
        let status = match contained(platform, self.send_chat(uid, platform, text, date)).await {
            Ok(()) => {
                info!(update_id = %update_id, platform = %platform, "Platform publish succeeded");
                PlatformStatus::Sent
            }
            Err(reason) => {
                warn!(
                    update_id = %update_id,
                    platform = %platform,
                    error = %reason,
                    "Platform publish failed"
                );
                PlatformStatus::Failed
            }
        };

        self.store
            .update(update_id, &UpdatePatch::status(platform, status))?;
        metrics::record_publish(platform, status);
        metrics::record_publish_duration(platform, started.elapsed().as_secs_f64());
        Ok(status)
    }

    /// Deliver entries and persist them with the aggregate status in one write
    async fn publish_jira(
        &self,
        uid: &str,
        update_id: &str,
        mut entries: Vec<WorkLogEntry>,
    ) -> Result<PlatformStatus> {
        let started = Instant::now();
        let status = match contained(Platform::Jira, self.send_worklogs(uid, &mut entries)).await {
            Ok(report) => {
                for failure in &report.failures {
                    warn!(
                        update_id = %update_id,
                        entry_id = %failure.entry_id,
                        issue_key = %failure.issue_key,
                        reason = %failure.reason,
                        "Work-log entry not delivered"
                    );
                }
                report.status()
            }
            Err(reason) => {
                warn!(
                    update_id = %update_id,
                    platform = %Platform::Jira,
                    error = %reason,
                    "Platform publish failed"
                );
                PlatformStatus::Failed
            }
        };

        self.store.update(
            update_id,
            &UpdatePatch::status(Platform::Jira, status).with_entries(entries),
        )?;
        metrics::record_publish(Platform::Jira, status);
        metrics::record_publish_duration(Platform::Jira, started.elapsed().as_secs_f64());
        Ok(status)
    }
}
