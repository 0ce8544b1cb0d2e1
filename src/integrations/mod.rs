//! Platform integrations
//!
//! Delivery adapters for the three publish targets:
//!
//! - **Slack**: incoming webhook or bot-token thread reply
//! - **Teams**: incoming webhook with an Adaptive Card payload
//! - **Jira**: REST worklogs, one entry at a time with retry
//!
//! Chat platforms sit behind [`ChatPublisher`] and Jira behind
//! [`jira::WorklogSink`] so the orchestrator can be driven by fakes in tests.

pub mod decorate;
pub mod jira;
pub mod retry;
pub mod slack;
pub mod teams;

use crate::config::PlatformConfig;
use async_trait::async_trait;
use chrono::NaiveDate;

/// A chat platform that accepts one formatted update per call
#[async_trait]
pub trait ChatPublisher: Send + Sync {
    /// Deliver `text` for `date` using the platform's configuration
    async fn publish(
        &self,
        config: &PlatformConfig,
        text: &str,
        date: NaiveDate,
    ) -> crate::Result<()>;
}

pub use decorate::{has_real_blockers, Mentions, Person};
pub use jira::{
    publish_worklogs, FailedWorklog, JiraClient, JiraPublishReport, WorklogError, WorklogPacing,
    WorklogRequest, WorklogSink,
};
pub use retry::{with_retry, RetryConfig, RetryDecision, RetryableError};
pub use slack::{SlackClient, SlackError};
pub use teams::{build_adaptive_card, TeamsClient, TeamsError};
