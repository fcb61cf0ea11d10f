//! Sync Data Models
//!
//! Defines the structures shared by the fetcher, reconciler, manager and
//! notifier:
//! - ConflictChoice / Conflict: detected divergences and how they are settled
//! - SyncState / SyncStatus: the visible sync indicator
//! - RemotePost: the external record shape served by the endpoint

use crate::quotes::Quote;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Conflict Resolution
// ============================================================================

/// Which version the user kept for a conflicting record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    /// Restore the pre-merge local record
    Local,

    /// Keep the server record already applied by the merge
    Server,
}

impl ConflictChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictChoice::Local => "local",
            ConflictChoice::Server => "server",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ConflictChoice::Local),
            "server" => Ok(ConflictChoice::Server),
            _ => Err(format!("Invalid conflict choice: {}", s)),
        }
    }
}

/// A divergence between the local and server versions of one record
///
/// `local` is a copy taken before the merge overwrote the slot, so keeping
/// the local version can restore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: i64,
    pub local: Quote,
    pub server: Quote,
}

// ============================================================================
// Sync Status & State
// ============================================================================

/// Current position in the sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Merging,
    ConflictPending,
    Sending,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Fetching => "fetching",
            SyncState::Merging => "merging",
            SyncState::ConflictPending => "conflict_pending",
            SyncState::Sending => "sending",
            SyncState::Failed => "failed",
        }
    }

    /// Whether a cycle is currently between fetch and send
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SyncState::Fetching | SyncState::Merging | SyncState::ConflictPending | SyncState::Sending
        )
    }
}

/// Visible sync indicator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub message: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub unresolved_conflicts: usize,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            message: "Ready to sync".to_string(),
            last_synced_at: None,
            unresolved_conflicts: 0,
        }
    }
}

// ============================================================================
// Remote Records
// ============================================================================

/// Record shape returned by the remote endpoint
///
/// Only `id` and `title` are required; a timestamp is used when the server
/// provides one.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePost {
    pub id: i64,
    pub title: String,

    #[serde(default, alias = "lastUpdated", rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of the outbound update request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpload<'a> {
    pub quotes: &'a [Quote],
    pub last_sync: Option<DateTime<Utc>>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_choice_parsing() {
        assert_eq!(ConflictChoice::from_str("local"), Ok(ConflictChoice::Local));
        assert_eq!(ConflictChoice::from_str("SERVER"), Ok(ConflictChoice::Server));
        assert!(ConflictChoice::from_str("both").is_err());
        assert_eq!(ConflictChoice::Local.as_str(), "local");
    }

    #[test]
    fn test_sync_state_as_str() {
        assert_eq!(SyncState::Idle.as_str(), "idle");
        assert_eq!(SyncState::Fetching.as_str(), "fetching");
        assert_eq!(SyncState::ConflictPending.as_str(), "conflict_pending");
        assert_eq!(SyncState::Failed.as_str(), "failed");
        assert!(SyncState::Sending.is_busy());
        assert!(!SyncState::Failed.is_busy());
    }

    #[test]
    fn test_status_default() {
        let status = SyncStatus::default();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.message, "Ready to sync");
        assert!(status.last_synced_at.is_none());
    }

    #[test]
    fn test_remote_post_ignores_extra_fields() {
        let post: RemotePost = serde_json::from_str(
            r#"{"userId": 1, "id": 7, "title": "hello", "body": "world"}"#,
        )
        .unwrap();
        assert_eq!(post.id, 7);
        assert_eq!(post.title, "hello");
        assert!(post.updated_at.is_none());

        let post: RemotePost = serde_json::from_str(
            r#"{"id": 8, "title": "t", "lastUpdated": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(post.updated_at.is_some());
    }

    #[test]
    fn test_upload_body_shape() {
        let quotes = vec![Quote::new("text", "cat")];
        let body = serde_json::to_value(SyncUpload { quotes: &quotes, last_sync: None }).unwrap();
        assert_eq!(body["quotes"].as_array().unwrap().len(), 1);
        assert!(body["lastSync"].is_null());
    }
}
