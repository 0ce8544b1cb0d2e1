//! StatusRelay - multi-platform publishing for daily status updates
//!
//! A drafted update (formatted Slack and Teams text plus Jira work-log entries)
//! is stored once and published to each enabled platform independently. Each
//! platform's outcome is recorded on the update, and a retry only re-sends the
//! platforms and worklogs that have not been delivered yet.
//!
//! # Architecture
//!
//! - **model**: Update records, work-log entries, per-platform status
//! - **config**: YAML configuration, per-user platform profiles, validation
//! - **timefmt**: Timezone-correct timestamp and duration formatting
//! - **integrations**: Slack, Teams and Jira clients with retry
//! - **storage**: Update persistence (SQLite)
//! - **publish**: Create/retry orchestration
//! - **server**: HTTP API (axum)

// Core modules
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod timefmt;

// Components
pub mod integrations;
pub mod logging;
pub mod metrics;
pub mod publish;
pub mod server;

// Re-exports
pub use error::{RelayError, Result};
