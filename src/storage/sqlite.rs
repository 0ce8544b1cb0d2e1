//! SQLite update store

use super::UpdateStore;
use crate::model::{
    NewUpdate, PlatformStatus, Update, UpdateFilter, UpdatePatch, WorkLogEntry,
};
use crate::{RelayError, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, date, raw_transcript, slack_output, teams_output,
           work_log_entries, slack_status, teams_status, jira_status,
           created_at, updated_at
    FROM updates
"#;

/// Update records in a single SQLite table
pub struct SqliteUpdateStore {
    conn: Mutex<Connection>,
}

/// Row as stored, before parsing
struct StoredRow {
    id: String,
    user_id: String,
    date: String,
    raw_transcript: String,
    slack_output: String,
    teams_output: String,
    work_log_entries: String,
    slack_status: String,
    teams_status: String,
    jira_status: String,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            raw_transcript: row.get(3)?,
            slack_output: row.get(4)?,
            teams_output: row.get(5)?,
            work_log_entries: row.get(6)?,
            slack_status: row.get(7)?,
            teams_status: row.get(8)?,
            jira_status: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_update(self) -> Result<Update> {
        let entries: Vec<WorkLogEntry> = serde_json::from_str(&self.work_log_entries)?;
        Ok(Update {
            date: NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
                .map_err(|e| RelayError::Storage(format!("Bad date in row {}: {}", self.id, e)))?,
            created_at: parse_instant(&self.created_at)?,
            updated_at: parse_instant(&self.updated_at)?,
            slack_status: self.slack_status.parse()?,
            teams_status: self.teams_status.parse()?,
            jira_status: self.jira_status.parse()?,
            work_log_entries: entries,
            id: self.id,
            user_id: self.user_id,
            raw_transcript: self.raw_transcript,
            slack_output: self.slack_output,
            teams_output: self.teams_output,
        })
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RelayError::Storage(format!("Bad timestamp {:?}: {}", value, e)))
}

fn status_value(status: PlatformStatus) -> SqlValue {
    SqlValue::Text(status.as_str().to_string())
}

impl SqliteUpdateStore {
    /// Open or create a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "Opening update database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS updates (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                raw_transcript TEXT NOT NULL,
                slack_output TEXT NOT NULL,
                teams_output TEXT NOT NULL,
                work_log_entries TEXT NOT NULL,
                slack_status TEXT NOT NULL,
                teams_status TEXT NOT NULL,
                jira_status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_updates_user_date ON updates(user_id, date);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RelayError::Storage("Database lock poisoned".to_string()))
    }
}

impl UpdateStore for SqliteUpdateStore {
    fn get(&self, id: &str) -> Result<Option<Update>> {
        let stored = self
            .lock()?
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                StoredRow::from_row,
            )
            .optional()?;

        stored.map(StoredRow::into_update).transpose()
    }

    fn create(&self, update: &NewUpdate) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_instant(Utc::now());
        let entries = serde_json::to_string(&update.work_log_entries)?;

        self.lock()?.execute(
            r#"
            INSERT INTO updates (
                id, user_id, date, raw_transcript, slack_output, teams_output,
                work_log_entries, slack_status, teams_status, jira_status,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
            params![
                id,
                update.user_id,
                update.date.format(DATE_FORMAT).to_string(),
                update.raw_transcript,
                update.slack_output,
                update.teams_output,
                entries,
                update.slack_status.as_str(),
                update.teams_status.as_str(),
                update.jira_status.as_str(),
                now,
            ],
        )?;

        tracing::debug!(update_id = %id, user_id = %update.user_id, "Update record created");
        Ok(id)
    }

    fn update(&self, id: &str, patch: &UpdatePatch) -> Result<()> {
        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(ref text) = patch.slack_output {
            columns.push("slack_output");
            values.push(SqlValue::Text(text.clone()));
        }
        if let Some(ref text) = patch.teams_output {
            columns.push("teams_output");
            values.push(SqlValue::Text(text.clone()));
        }
        if let Some(ref entries) = patch.work_log_entries {
            columns.push("work_log_entries");
            values.push(SqlValue::Text(serde_json::to_string(entries)?));
        }
        if let Some(status) = patch.slack_status {
            columns.push("slack_status");
            values.push(status_value(status));
        }
        if let Some(status) = patch.teams_status {
            columns.push("teams_status");
            values.push(status_value(status));
        }
        if let Some(status) = patch.jira_status {
            columns.push("jira_status");
            values.push(status_value(status));
        }
        columns.push("updated_at");
        values.push(SqlValue::Text(format_instant(Utc::now())));

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE updates SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len() + 1
        );
        values.push(SqlValue::Text(id.to_string()));

        let changed = self.lock()?.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(RelayError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .lock()?
            .execute("DELETE FROM updates WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    fn list(&self, filter: &UpdateFilter) -> Result<Vec<Update>> {
        let (from, until) = match filter.month {
            Some(month) => {
                let (first, next) = month.bounds();
                (
                    Some(first.format(DATE_FORMAT).to_string()),
                    Some(next.format(DATE_FORMAT).to_string()),
                )
            }
            None => (None, None),
        };

        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "{} WHERE (?1 IS NULL OR user_id = ?1)
                   AND (?2 IS NULL OR date >= ?2)
                   AND (?3 IS NULL OR date < ?3)
                 ORDER BY date DESC, created_at DESC",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![filter.user_id, from, until], StoredRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter().map(StoredRow::into_update).collect()
    }
}
