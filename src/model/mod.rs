//! Domain model
//!
//! - **update**: persisted `Update` records, `WorkLogEntry`, per-platform status
//! - **request**: inbound create/retry bodies, store patches and filters

mod request;
mod update;

pub use request::{
    CreateUpdateRequest, Month, RetryUpdateRequest, UpdateFilter, UpdatePatch, WorkLogEntryInput,
};
pub use update::{new_entry_id, NewUpdate, Platform, PlatformStatus, Update, WorkLogEntry};
