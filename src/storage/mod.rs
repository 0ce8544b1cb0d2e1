//! Storage layer
//!
//! The orchestrator talks to persistence through [`UpdateStore`]; the shipped
//! implementation keeps records in SQLite.

mod sqlite;

pub use sqlite::SqliteUpdateStore;

use crate::model::{NewUpdate, Update, UpdateFilter, UpdatePatch};
use crate::Result;

/// Document-style store of update records keyed by id
///
/// Writes are last-writer-wins; there is no optimistic concurrency token.
pub trait UpdateStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Update>>;

    /// Persist a new record and return its id
    fn create(&self, update: &NewUpdate) -> Result<String>;

    /// Apply `patch` to an existing record; `NotFound` when the id is unknown
    fn update(&self, id: &str, patch: &UpdatePatch) -> Result<()>;

    /// Remove a record, returning whether it existed
    fn delete(&self, id: &str) -> Result<bool>;

    /// Records matching `filter`, newest date first
    fn list(&self, filter: &UpdateFilter) -> Result<Vec<Update>>;
}
