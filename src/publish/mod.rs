//! Publish pipeline
//!
//! - **orchestrator**: create/retry state machine over the three platforms
//! - **merge**: Jira retry batch construction

mod merge;
mod orchestrator;

pub use merge::merge_retry_entries;
pub use orchestrator::{PlatformClients, PublishOrchestrator};
