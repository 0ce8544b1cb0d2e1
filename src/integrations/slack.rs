//! Slack delivery
//!
//! Two modes, chosen by configuration:
//!
//! - **Webhook**: POST `{text}` to an incoming webhook.
//! - **Thread reply**: find the day's workflow message in the channel history
//!   and reply under it with `chat.postMessage`.
//!
//! Both modes send the decorated text (user mention, date, lead ping on blockers).

use super::decorate::decorate_slack;
use super::ChatPublisher;
use crate::config::{PlatformConfig, SlackMode, ThreadTarget, WorkflowAnchor};
use crate::timefmt;
use crate::RelayError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CONVERSATIONS_HISTORY: &str = "conversations.history";
const CHAT_POST_MESSAGE: &str = "chat.postMessage";
const HISTORY_LIMIT: &str = "100";
/// Upper bound on history pages read while looking for the workflow message
const MAX_HISTORY_PAGES: usize = 20;

/// Half-width of the search window around a configured workflow time
const WORKFLOW_WINDOW_MINUTES: i64 = 5;

/// Per-request timeout for Slack calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("Slack webhook returned HTTP {status}: {body}")]
    Webhook { status: u16, body: String },
    #[error("Slack API error: {0}")]
    Api(String),
    #[error("No workflow message matching {match_text:?} found in channel {channel}")]
    NoWorkflowMessage { channel: String, match_text: String },
    #[error("Slack configuration error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
}

impl From<SlackError> for RelayError {
    fn from(err: SlackError) -> Self {
        RelayError::Integration(err.to_string())
    }
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        SlackError::Network(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    ts: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Option<Vec<HistoryMessage>>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
    #[serde(default)]
    error: Option<String>,
}

impl HistoryResponse {
    /// Cursor for the next page, if Slack reported one
    fn next_cursor(&self) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.response_metadata
            .as_ref()
            .and_then(|m| m.next_cursor.clone())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// UTC window in which the workflow message is searched for
///
/// With an anchor the window is five minutes either side of the workflow time
/// on `date`; otherwise it is the whole UTC day.
pub fn search_window(
    anchor: Option<&WorkflowAnchor>,
    date: NaiveDate,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match anchor {
        Some(anchor) => {
            let center = timefmt::workflow_time_to_utc(date, anchor.time, anchor.timezone);
            let margin = ChronoDuration::minutes(WORKFLOW_WINDOW_MINUTES);
            (center - margin, center + margin)
        }
        None => timefmt::utc_day_bounds(date),
    }
}

/// Slack's `ts` form of an instant
fn slack_ts(instant: DateTime<Utc>) -> String {
    format!("{}.000000", instant.timestamp())
}

/// Slack web and webhook client
pub struct SlackClient {
    http: Client,
    api_base: String,
}

impl SlackClient {
    pub fn new(api_base: impl Into<String>) -> crate::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http, api_base))
    }

    pub fn with_client(http: Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// Post `{text}` to an incoming webhook
    pub async fn post_webhook(&self, url: &str, text: &str) -> Result<(), SlackError> {
        let response = self.http.post(url).json(&json!({ "text": text })).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SlackError::Webhook {
            status: status.as_u16(),
            body,
        })
    }

    /// Timestamp of the first message in the search window containing the match text
    ///
    /// Follows `next_cursor` until the window is exhausted.
    pub async fn find_workflow_message(
        &self,
        target: &ThreadTarget,
        date: NaiveDate,
    ) -> Result<String, SlackError> {
        let (oldest, latest) = search_window(target.anchor.as_ref(), date);
        let oldest = slack_ts(oldest);
        let latest = slack_ts(latest);

        debug!(
            channel = %target.channel_id,
            oldest = %oldest,
            latest = %latest,
            "Searching channel history for workflow message"
        );

        let mut cursor: Option<String> = None;
        for page in 1..=MAX_HISTORY_PAGES {
            let history = self
                .history_page(target, &oldest, &latest, cursor.as_deref())
                .await?;
            let next = history.next_cursor();

            let found = history
                .messages
                .unwrap_or_default()
                .into_iter()
                .find(|m| {
                    m.text
                        .as_deref()
                        .is_some_and(|text| text.contains(&target.match_text))
                });
            if let Some(message) = found {
                debug!(page, ts = %message.ts, "Workflow message found");
                return Ok(message.ts);
            }

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
            if page == MAX_HISTORY_PAGES {
                warn!(
                    channel = %target.channel_id,
                    pages = MAX_HISTORY_PAGES,
                    "Stopped reading channel history before the window was exhausted"
                );
            }
        }

        Err(SlackError::NoWorkflowMessage {
            channel: target.channel_id.clone(),
            match_text: target.match_text.clone(),
        })
    }

    async fn history_page(
        &self,
        target: &ThreadTarget,
        oldest: &str,
        latest: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryResponse, SlackError> {
        let mut query = vec![
            ("channel", target.channel_id.as_str()),
            ("oldest", oldest),
            ("latest", latest),
            ("limit", HISTORY_LIMIT),
            ("inclusive", "true"),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let response = self
            .http
            .get(self.api_url(CONVERSATIONS_HISTORY))
            .bearer_auth(&target.bot_token)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SlackError::Api(format!(
                "{} returned HTTP {}",
                CONVERSATIONS_HISTORY,
                response.status()
            )));
        }

        let history: HistoryResponse = response.json().await?;
        if !history.ok {
            return Err(SlackError::Api(format!(
                "{} returned ok=false: {}",
                CONVERSATIONS_HISTORY,
                history.error.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(history)
    }

    /// Reply under `thread_ts`
    pub async fn post_thread_reply(
        &self,
        target: &ThreadTarget,
        thread_ts: &str,
        text: &str,
    ) -> Result<String, SlackError> {
        let response = self
            .http
            .post(self.api_url(CHAT_POST_MESSAGE))
            .bearer_auth(&target.bot_token)
            .json(&json!({
                "channel": target.channel_id,
                "text": text,
                "thread_ts": thread_ts,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SlackError::Api(format!(
                "{} returned HTTP {}",
                CHAT_POST_MESSAGE,
                response.status()
            )));
        }

        let posted: PostMessageResponse = response.json().await?;
        if !posted.ok {
            return Err(SlackError::Api(format!(
                "{} returned ok=false: {}",
                CHAT_POST_MESSAGE,
                posted.error.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(posted.ts.unwrap_or_default())
    }

    async fn deliver(
        &self,
        config: &PlatformConfig,
        text: &str,
        date: NaiveDate,
    ) -> Result<(), SlackError> {
        let mode = config
            .slack_mode()
            .map_err(|e| SlackError::Config(e.to_string()))?;
        let decorated = decorate_slack(text, &config.mentions(), date);

        match mode {
            SlackMode::Webhook { url } => {
                self.post_webhook(&url, &decorated).await?;
                info!(date = %date, "Slack update posted via webhook");
            }
            SlackMode::Thread(target) => {
                let parent = self.find_workflow_message(&target, date).await?;
                let ts = self.post_thread_reply(&target, &parent, &decorated).await?;
                info!(
                    channel = %target.channel_id,
                    thread_ts = %parent,
                    ts = %ts,
                    "Slack update posted as thread reply"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPublisher for SlackClient {
    async fn publish(
        &self,
        config: &PlatformConfig,
        text: &str,
        date: NaiveDate,
    ) -> crate::Result<()> {
        Ok(self.deliver(config, text, date).await?)
    }
}
