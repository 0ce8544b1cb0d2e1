//! Jira retry batch construction

use crate::model::{new_entry_id, WorkLogEntry};
use std::collections::HashSet;

/// Build the entry batch for a Jira retry
///
/// Entries Jira already accepted are carried forward unchanged, in their
/// original order. Submitted entries follow them with fresh ids and no worklog
/// id; a submitted entry echoing the id of a delivered one is dropped.
pub fn merge_retry_entries(
    previous: &[WorkLogEntry],
    submitted: Vec<WorkLogEntry>,
) -> Vec<WorkLogEntry> {
    let delivered: Vec<WorkLogEntry> = previous
        .iter()
        .filter(|e| e.is_delivered())
        .cloned()
        .collect();
    let delivered_ids: HashSet<&str> = delivered.iter().map(|e| e.id.as_str()).collect();

    let fresh: Vec<WorkLogEntry> = submitted
        .into_iter()
        .filter(|e| !delivered_ids.contains(e.id.as_str()))
        .map(|e| WorkLogEntry {
            id: new_entry_id(),
            jira_worklog_id: None,
            ..e
        })
        .collect();

    let mut merged = delivered;
    merged.extend(fresh);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, key: &str, worklog: Option<&str>) -> WorkLogEntry {
        WorkLogEntry {
            id: id.to_string(),
            issue_key: key.to_string(),
            time_spent_secs: 1800,
            started: Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
            comment: None,
            is_repeat: false,
            jira_worklog_id: worklog.map(String::from),
        }
    }

    #[test]
    fn test_delivered_carried_forward() {
        let previous = vec![
            entry("a", "PROJ-1", Some("100")),
            entry("b", "PROJ-2", None),
        ];
        let submitted = vec![entry("b", "PROJ-2", None)];

        let merged = merge_retry_entries(&previous, submitted);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], previous[0]);
        assert_eq!(merged[1].issue_key, "PROJ-2");
        assert_ne!(merged[1].id, "b");
        assert!(merged[1].jira_worklog_id.is_none());
    }

    #[test]
    fn test_submitted_worklog_ids_are_reset() {
        let merged = merge_retry_entries(&[], vec![entry("x", "PROJ-9", Some("stale"))]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_delivered());
    }

    #[test]
    fn test_resubmitted_delivered_entry_dropped() {
        let previous = vec![entry("a", "PROJ-1", Some("100"))];
        let submitted = vec![entry("a", "PROJ-1", None), entry("c", "PROJ-3", None)];

        let merged = merge_retry_entries(&previous, submitted);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].jira_worklog_id.as_deref(), Some("100"));
        assert_eq!(merged[1].issue_key, "PROJ-3");
    }

    #[test]
    fn test_undelivered_previous_entries_are_replaced() {
        let previous = vec![entry("a", "PROJ-1", None)];
        let merged = merge_retry_entries(&previous, Vec::new());
        assert!(merged.is_empty());
    }
}
