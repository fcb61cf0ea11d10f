//! Sync History Module - outcome log of sync cycles
//!
//! Every cycle, successful or not, leaves one row behind:
//! - counts of fetched, appended, overwritten and sent records
//! - number of conflicts raised
//! - the error message of a failed cycle
//! - retention policy to keep the table small

use crate::db::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Types & Structures
// ============================================================================

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    Success,
    Conflict,
    Failed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Conflict => "conflict",
            CycleOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "success" => Ok(CycleOutcome::Success),
            "conflict" => Ok(CycleOutcome::Conflict),
            "failed" => Ok(CycleOutcome::Failed),
            _ => Err(format!("Invalid outcome: {}", s)),
        }
    }
}

/// One recorded cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub outcome: CycleOutcome,
    pub fetched: i64,
    pub appended: i64,
    pub overwritten: i64,
    pub conflicts: i64,
    pub sent: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            id: None,
            outcome: CycleOutcome::Failed,
            fetched: 0,
            appended: 0,
            overwritten: 0,
            conflicts: 0,
            sent: 0,
            error_message: Some(error_message.into()),
            created_at: Utc::now(),
        }
    }
}

/// History statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_cycles: i64,
    pub failed_cycles: i64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

// ============================================================================
// History Manager
// ============================================================================

/// Manages the sync history table
pub struct HistoryManager {
    db: Arc<Database>,
}

impl HistoryManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record one cycle
    pub fn record(&self, entry: &HistoryEntry) -> Result<i64, HistoryError> {
        self.db.execute_insert(
            "INSERT INTO sync_history (
                outcome, fetched, appended, overwritten, conflicts, sent, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                entry.outcome.as_str(),
                entry.fetched,
                entry.appended,
                entry.overwritten,
                entry.conflicts,
                entry.sent,
                entry.error_message,
                entry.created_at.to_rfc3339(),
            ],
        ).map_err(|e| HistoryError::DatabaseError(e.to_string()))
    }

    /// Most recent entries first
    pub fn recent(&self, limit: i64) -> Result<Vec<HistoryEntry>, HistoryError> {
        let rows = self.db.query(
            "SELECT id, outcome, fetched, appended, overwritten, conflicts, sent,
                    error_message, created_at
             FROM sync_history
             ORDER BY id DESC
             LIMIT ?1",
            rusqlite::params![limit],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        ).map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|(id, outcome, fetched, appended, overwritten, conflicts, sent, error_message, created_at)| {
                Ok(HistoryEntry {
                    id: Some(id),
                    outcome: CycleOutcome::from_str(&outcome).map_err(HistoryError::CorruptEntry)?,
                    fetched,
                    appended,
                    overwritten,
                    conflicts,
                    sent,
                    error_message,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    /// Enforce retention policy - delete entries older than specified days
    pub fn enforce_retention_policy(&self, retention_days: i64) -> Result<usize, HistoryError> {
        let cutoff_date = Utc::now() - chrono::Duration::days(retention_days);

        self.db.execute(
            "DELETE FROM sync_history WHERE created_at < ?1",
            rusqlite::params![cutoff_date.to_rfc3339()],
        ).map_err(|e| HistoryError::DatabaseError(e.to_string()))
    }

    /// Get statistics about sync history
    pub fn get_stats(&self) -> Result<HistoryStats, HistoryError> {
        self.db.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN outcome = 'failed' THEN 1 ELSE 0 END), 0),
                MIN(created_at),
                MAX(created_at)
             FROM sync_history",
            [],
            |row| {
                Ok(HistoryStats {
                    total_cycles: row.get(0)?,
                    failed_cycles: row.get(1)?,
                    oldest_entry: row.get::<_, Option<String>>(2)?
                        .and_then(|s| s.parse().ok()),
                    newest_entry: row.get::<_, Option<String>>(3)?
                        .and_then(|s| s.parse().ok()),
                })
            }
        ).map_err(|e| HistoryError::DatabaseError(e.to_string()))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HistoryError::CorruptEntry(format!("created_at {}: {}", raw, e)))
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Corrupt history entry: {0}")]
    CorruptEntry(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::new(db_path).unwrap());
        (db, temp_dir)
    }

    fn success_entry(appended: i64) -> HistoryEntry {
        HistoryEntry {
            id: None,
            outcome: CycleOutcome::Success,
            fetched: 5,
            appended,
            overwritten: 0,
            conflicts: 0,
            sent: 1,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_and_list() {
        let (db, _temp) = create_test_db();
        let manager = HistoryManager::new(db);

        manager.record(&success_entry(2)).unwrap();
        manager.record(&HistoryEntry::failed("Server request failed: 500")).unwrap();

        let history = manager.recent(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome, CycleOutcome::Failed);
        assert_eq!(history[0].error_message.as_deref(), Some("Server request failed: 500"));
        assert_eq!(history[1].appended, 2);

        assert_eq!(manager.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_stats() {
        let (db, _temp) = create_test_db();
        let manager = HistoryManager::new(db);

        let empty = manager.get_stats().unwrap();
        assert_eq!(empty.total_cycles, 0);
        assert!(empty.oldest_entry.is_none());

        manager.record(&success_entry(1)).unwrap();
        manager.record(&HistoryEntry::failed("boom")).unwrap();

        let stats = manager.get_stats().unwrap();
        assert_eq!(stats.total_cycles, 2);
        assert_eq!(stats.failed_cycles, 1);
        assert!(stats.newest_entry.is_some());
    }

    #[test]
    fn test_retention_policy() {
        let (db, _temp) = create_test_db();
        let manager = HistoryManager::new(db);

        let mut old = success_entry(0);
        old.created_at = Utc::now() - chrono::Duration::days(90);
        manager.record(&old).unwrap();
        manager.record(&success_entry(0)).unwrap();

        let deleted = manager.enforce_retention_policy(30).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(manager.recent(10).unwrap().len(), 1);
    }
}
