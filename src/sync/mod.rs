//! Sync Module - keeps the local quote store in step with the remote endpoint
//!
//! Provides periodic two-way sync:
//! - Fetch a batch of remote records and map them to quotes
//! - Last-writer-wins merge with a conflict log
//! - Manual conflict resolution (keep local / keep server)
//! - Upload of records the server has not acknowledged
//!
//! Architecture:
//! - `SyncManager` runs one cycle at a time behind an in-flight guard
//! - `BackgroundScheduler` drives cycles on an interval
//! - `Notifier` carries results to whatever front end is attached

pub mod api;
pub mod history;
pub mod manager;
pub mod merge;
pub mod models;
pub mod notifier;
pub mod scheduler;


// Re-export commonly used types
pub use models::{Conflict, ConflictChoice, SyncState, SyncStatus};

pub use api::{SyncApiClient, SyncApiError};
pub use history::{CycleOutcome, HistoryEntry, HistoryError, HistoryManager, HistoryStats};
pub use manager::{SyncManager, SyncManagerError, SyncReport};
pub use merge::{merge, MergeOutcome};
pub use notifier::{ChannelNotifier, LogNotifier, Notification, NotificationLevel, Notifier, NotifierEvent};
pub use scheduler::{BackgroundScheduler, SchedulerConfig, SchedulerError};
