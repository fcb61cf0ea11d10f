//! Sync Manager - Orchestrates synchronization cycles
//!
//! Coordinates between the quote store, persistence and the API client.
//! Handles:
//! - Fetching the remote batch
//! - Merging it into the store with conflict detection
//! - Persisting the merged store
//! - Uploading unsynced records
//! - Manual conflict resolution
//! - The visible sync status

use super::api::{SyncApiClient, SyncApiError};
use super::history::{CycleOutcome, HistoryEntry, HistoryManager};
use super::merge::merge;
use super::models::{Conflict, ConflictChoice, SyncState, SyncStatus};
use super::notifier::{Notification, NotificationLevel, Notifier};
use crate::cache::SessionCache;
use crate::db::{Database, DbError};
use crate::quotes::{Quote, SharedStore};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sync manager - main orchestrator
#[derive(Clone)]
pub struct SyncManager {
    api_client: Arc<SyncApiClient>,
    db: Arc<Database>,
    store: SharedStore,
    session: SessionCache,
    notifier: Arc<dyn Notifier>,
    history_manager: Arc<HistoryManager>,
    status: Arc<RwLock<SyncStatus>>,
    pending_conflicts: Arc<RwLock<Vec<Conflict>>>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when a cycle ends, however it ends
///
/// A cycle dropped midway (scheduler stopped, task aborted) would leave the
/// status in a busy state; the guard puts it back to idle.
pub(crate) struct CycleGuard {
    flag: Arc<AtomicBool>,
    status: Arc<RwLock<SyncStatus>>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if let Ok(mut status) = self.status.try_write() {
            if status.state.is_busy() {
                log::warn!("Sync cycle interrupted while {}", status.state.as_str());
                status.state = SyncState::Idle;
                status.message = "Sync cancelled".to_string();
            }
        }
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl SyncManager {
    pub fn new(
        api_client: Arc<SyncApiClient>,
        db: Arc<Database>,
        store: SharedStore,
        session: SessionCache,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let history_manager = Arc::new(HistoryManager::new(db.clone()));

        Self {
            api_client,
            db,
            store,
            session,
            notifier,
            history_manager,
            status: Arc::new(RwLock::new(SyncStatus::default())),
            pending_conflicts: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    // ========================================================================
    // Sync Cycle
    // ========================================================================

    /// Claim the in-flight flag, `None` if a cycle is already running
    pub(crate) fn try_begin_cycle(&self) -> Option<CycleGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard {
                flag: self.in_flight.clone(),
                status: self.status.clone(),
            })
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one fetch → merge → send cycle
    pub async fn run_cycle(&self) -> Result<SyncReport, SyncManagerError> {
        let _guard = self.try_begin_cycle().ok_or_else(|| {
            log::warn!("Sync cycle skipped: previous cycle still in flight");
            self.notifier.notify(Notification::new(
                NotificationLevel::Info,
                "Sync already in progress",
            ));
            SyncManagerError::AlreadySyncing
        })?;

        self.set_state(SyncState::Fetching, "Syncing with server...").await;

        match self.execute_cycle().await {
            Ok(report) => {
                let now = Utc::now();
                let unresolved = self.pending_conflicts.read().await.len();
                {
                    let mut status = self.status.write().await;
                    status.state = SyncState::Idle;
                    status.message = format!("Synced: {}", now.format("%H:%M:%S"));
                    status.last_synced_at = Some(now);
                    status.unresolved_conflicts = unresolved;
                }

                let outcome = if report.has_conflicts() {
                    CycleOutcome::Conflict
                } else {
                    CycleOutcome::Success
                };
                self.record_history(report.to_history_entry(outcome));

                log::info!(
                    "Sync cycle completed: fetched={}, appended={}, conflicts={}, sent={}",
                    report.fetched,
                    report.appended,
                    report.conflicts.len(),
                    report.sent
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Sync error: {}", e);
                self.set_state(SyncState::Failed, "Sync failed").await;
                self.notifier.notify(Notification::new(
                    NotificationLevel::Error,
                    "Failed to sync with server",
                ));
                self.record_history(HistoryEntry::failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn execute_cycle(&self) -> Result<SyncReport, SyncManagerError> {
        let remote = self.api_client.fetch_quotes().await?;

        self.set_state(SyncState::Merging, "Merging server data...").await;

        let mut report = SyncReport {
            fetched: remote.len(),
            ..Default::default()
        };

        {
            let mut store = self.store.write().await;
            let outcome = merge(store.quotes(), &remote);

            report.appended = outcome.appended;
            report.overwritten = outcome.overwritten;
            report.updated = outcome.updated;
            report.conflicts = outcome.conflicts.clone();

            if outcome.updated || !outcome.conflicts.is_empty() {
                self.db.save_quotes(&outcome.merged)?;
                store.replace_all(outcome.merged);
            }
        }

        if report.updated {
            self.session.touch_last_updated().await;
        }

        if report.has_conflicts() {
            self.set_state(SyncState::ConflictPending, "Conflicts detected").await;
            self.register_conflicts(&report.conflicts).await;
            self.notifier.notify(Notification::new(
                NotificationLevel::Warning,
                format!("{} conflicts detected with server data", report.conflicts.len()),
            ));
            self.notifier.conflicts_detected(&report.conflicts);
        } else if report.updated {
            self.notifier.notify(Notification::new(
                NotificationLevel::Success,
                "Quotes synced with server!",
            ));
        }

        self.set_state(SyncState::Sending, "Sending local changes...").await;
        report.sent = self.send_updates().await?;

        Ok(report)
    }

    /// Upload records the server has not acknowledged yet
    ///
    /// Returns how many were sent. Nothing is sent when nothing changed.
    async fn send_updates(&self) -> Result<usize, SyncManagerError> {
        let pending = self.store.read().await.pending_sync();
        if pending.is_empty() {
            return Ok(0);
        }

        let last_sync = self.db.last_sync()?;
        self.api_client.send_updates(&pending, last_sync).await?;

        let now = Utc::now();
        self.mark_sent(&pending, now).await?;
        self.db.set_last_sync(now)?;

        Ok(pending.len())
    }

    /// Stamp the records that went out, returns how many were stamped
    ///
    /// The store is unlocked while the upload is in flight. A record edited
    /// meanwhile (e.g. a keep-local resolution) is not what the server got,
    /// so it stays pending.
    async fn mark_sent(&self, sent: &[Quote], now: DateTime<Utc>) -> Result<usize, SyncManagerError> {
        let mut stamped = 0;
        {
            let mut store = self.store.write().await;
            for record in sent {
                match store.get_mut(record.id) {
                    Some(quote) if same_content(quote, record) => {
                        quote.last_synced = Some(now);
                        quote.synced = Some(true);
                        stamped += 1;
                    }
                    Some(_) => log::debug!("Quote {} changed during upload, keeping it pending", record.id),
                    None => {}
                }
            }
            self.db.save_quotes(store.quotes())?;
        }

        self.session.touch_last_updated().await;
        Ok(stamped)
    }

    /// Keep the newest conflict per quote id
    async fn register_conflicts(&self, conflicts: &[Conflict]) {
        let mut pending = self.pending_conflicts.write().await;
        for conflict in conflicts {
            match pending.iter_mut().find(|c| c.id == conflict.id) {
                // First local snapshot stays the one to restore
                Some(existing) => existing.server = conflict.server.clone(),
                None => pending.push(conflict.clone()),
            }
        }
        self.status.write().await.unresolved_conflicts = pending.len();
    }

    async fn set_state(&self, state: SyncState, message: &str) {
        log::debug!("Sync state -> {}", state.as_str());
        let mut status = self.status.write().await;
        status.state = state;
        status.message = message.to_string();
    }

    fn record_history(&self, entry: HistoryEntry) {
        if let Err(e) = self.history_manager.record(&entry) {
            log::error!("Failed to record sync history: {}", e);
        }
    }

    // ========================================================================
    // Conflict Resolution
    // ========================================================================

    /// Conflicts waiting for a user decision
    pub async fn pending_conflicts(&self) -> Vec<Conflict> {
        self.pending_conflicts.read().await.clone()
    }

    /// Settle a conflict with the user's choice
    pub async fn resolve_conflict(
        &self,
        id: i64,
        choice: ConflictChoice,
    ) -> Result<Quote, SyncManagerError> {
        let conflict = {
            let mut pending = self.pending_conflicts.write().await;
            let index = pending
                .iter()
                .position(|c| c.id == id)
                .ok_or(SyncManagerError::ConflictNotFound(id))?;
            let conflict = pending.remove(index);
            self.status.write().await.unresolved_conflicts = pending.len();
            conflict
        };

        let resolved = {
            let mut store = self.store.write().await;
            let slot = store
                .get_mut(id)
                .ok_or(SyncManagerError::QuoteNotFound(id))?;

            if choice == ConflictChoice::Local {
                *slot = conflict.local;
                slot.touch();
            }
            slot.resolved = Some(true);
            slot.resolution = Some(choice);

            let resolved = slot.clone();
            self.db.save_quotes(store.quotes())?;
            resolved
        };

        self.session.touch_last_updated().await;
        log::info!("Resolved conflict for quote {} in favor of {} version", id, choice.as_str());
        self.notifier.notify(Notification::new(
            NotificationLevel::Success,
            "Conflict resolved successfully!",
        ));

        Ok(resolved)
    }

    // ========================================================================
    // Status & History
    // ========================================================================

    pub async fn get_status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history_manager
    }

}

/// Same text, category and timestamp; sync bookkeeping fields are ignored
fn same_content(current: &Quote, sent: &Quote) -> bool {
    current.last_updated == sent.last_updated
        && current.text == sent.text
        && current.category == sent.category
}

// ============================================================================
// Result Types
// ============================================================================

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub fetched: usize,
    pub appended: usize,
    pub overwritten: usize,
    pub sent: usize,
    pub updated: bool,

    /// Detected conflicts requiring user resolution
    pub conflicts: Vec<Conflict>,
}

impl SyncReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    fn to_history_entry(&self, outcome: CycleOutcome) -> HistoryEntry {
        HistoryEntry {
            id: None,
            outcome,
            fetched: self.fetched as i64,
            appended: self.appended as i64,
            overwritten: self.overwritten as i64,
            conflicts: self.conflicts.len() as i64,
            sent: self.sent as i64,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncManagerError {
    #[error("API error: {0}")]
    Api(#[from] SyncApiError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("A sync cycle is already in progress")]
    AlreadySyncing,

    #[error("No pending conflict for quote {0}")]
    ConflictNotFound(i64),

    #[error("Quote {0} no longer exists")]
    QuoteNotFound(i64),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::QuoteStore;
    use crate::sync::notifier::LogNotifier;

    fn test_manager(store: QuoteStore) -> SyncManager {
        test_manager_at("http://127.0.0.1:9/posts", store)
    }

    fn test_manager_at(endpoint: &str, store: QuoteStore) -> SyncManager {
        let db = Arc::new(Database::in_memory().expect("Failed to create test database"));
        let api = Arc::new(SyncApiClient::new(endpoint, None).unwrap());
        SyncManager::new(
            api,
            db,
            Arc::new(RwLock::new(store)),
            SessionCache::new(),
            Arc::new(LogNotifier),
        )
    }

    #[tokio::test]
    async fn test_manager_creation() {
        let manager = test_manager(QuoteStore::default());
        let status = manager.get_status().await;
        assert_eq!(status.state, SyncState::Idle);
        assert!(!manager.is_syncing());
        assert!(manager.pending_conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_rejected_while_in_flight() {
        let manager = test_manager(QuoteStore::default());

        let guard = manager.try_begin_cycle().expect("first cycle should start");
        assert!(manager.is_syncing());
        assert!(matches!(
            manager.run_cycle().await,
            Err(SyncManagerError::AlreadySyncing)
        ));

        drop(guard);
        assert!(!manager.is_syncing());
        assert!(manager.try_begin_cycle().is_some());
    }

    #[tokio::test]
    async fn test_aborted_cycle_resets_busy_status() {
        // Accepts connections but never answers, so the fetch hangs
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/posts", listener.local_addr().unwrap());
        let manager = test_manager_at(&endpoint, QuoteStore::default());

        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run_cycle().await }
        });

        for _ in 0..100 {
            if manager.get_status().await.state == SyncState::Fetching {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get_status().await.state, SyncState::Fetching);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let status = manager.get_status().await;
        assert!(!status.state.is_busy());
        assert_eq!(status.message, "Sync cancelled");
        assert!(!manager.is_syncing());
        drop(listener);
    }

    #[tokio::test]
    async fn test_mark_sent_skips_record_changed_during_upload() {
        let local = Quote::new("A", "x");
        let mut server = local.clone();
        server.text = "B".to_string();
        server.category = "server".to_string();
        server.synced = None;
        server.last_updated = local.last_updated + chrono::Duration::seconds(5);
        let untouched = Quote::new("C", "y");

        let manager = test_manager(QuoteStore::new(vec![server.clone(), untouched.clone()]));
        manager
            .register_conflicts(&[Conflict {
                id: local.id,
                local: local.clone(),
                server: server.clone(),
            }])
            .await;

        // Snapshot taken before the upload, then the user keeps the local
        // version while the request is still out
        let uploaded = manager.store.read().await.pending_sync();
        assert_eq!(uploaded.len(), 2);
        manager.resolve_conflict(local.id, ConflictChoice::Local).await.unwrap();

        let stamped = manager.mark_sent(&uploaded, Utc::now()).await.unwrap();
        assert_eq!(stamped, 1);

        let store = manager.store.read().await;
        let restored = store.get(local.id).unwrap();
        assert_eq!(restored.text, "A");
        assert!(restored.needs_sync());
        assert!(!store.get(untouched.id).unwrap().needs_sync());
        assert_eq!(manager.db.load_quotes().unwrap().unwrap(), store.quotes());
        assert!(manager.session.last_updated().await.is_some());
    }

    #[tokio::test]
    async fn test_mark_sent_ignores_resolution_flags() {
        let mut quote = Quote::new("B", "server");
        quote.synced = None;
        let manager = test_manager(QuoteStore::new(vec![quote.clone()]));

        manager.store.write().await.get_mut(quote.id).unwrap().resolution = Some(ConflictChoice::Server);

        assert_eq!(manager.mark_sent(&[quote.clone()], Utc::now()).await.unwrap(), 1);
        assert!(!manager.store.read().await.get(quote.id).unwrap().needs_sync());
    }

    #[tokio::test]
    async fn test_resolve_unknown_conflict() {
        let manager = test_manager(QuoteStore::default());
        let result = manager.resolve_conflict(99, ConflictChoice::Local).await;
        assert!(matches!(result, Err(SyncManagerError::ConflictNotFound(99))));
    }

    #[tokio::test]
    async fn test_resolve_keep_local_restores_snapshot() {
        let local = Quote::new("mine", "x");
        let mut server = local.clone();
        server.text = "theirs".to_string();
        server.category = "server".to_string();
        server.last_updated = local.last_updated + chrono::Duration::seconds(5);

        let manager = test_manager(QuoteStore::new(vec![server.clone()]));
        manager
            .register_conflicts(&[Conflict {
                id: local.id,
                local: local.clone(),
                server,
            }])
            .await;
        assert_eq!(manager.get_status().await.unresolved_conflicts, 1);

        let resolved = manager.resolve_conflict(local.id, ConflictChoice::Local).await.unwrap();

        assert_eq!(resolved.text, "mine");
        assert_eq!(resolved.category, "x");
        assert!(resolved.last_updated > local.last_updated);
        assert_eq!(resolved.resolved, Some(true));
        assert_eq!(resolved.resolution, Some(ConflictChoice::Local));
        assert!(manager.pending_conflicts().await.is_empty());
        assert_eq!(manager.get_status().await.unresolved_conflicts, 0);

        let persisted = manager.db.load_quotes().unwrap().unwrap();
        assert_eq!(persisted, vec![resolved]);
    }

    #[tokio::test]
    async fn test_resolve_keep_server_leaves_record() {
        let local = Quote::new("mine", "x");
        let mut server = local.clone();
        server.text = "theirs".to_string();
        server.last_updated = local.last_updated + chrono::Duration::seconds(5);

        let manager = test_manager(QuoteStore::new(vec![server.clone()]));
        manager
            .register_conflicts(&[Conflict {
                id: local.id,
                local,
                server: server.clone(),
            }])
            .await;

        let resolved = manager.resolve_conflict(server.id, ConflictChoice::Server).await.unwrap();

        assert_eq!(resolved.text, "theirs");
        assert_eq!(resolved.last_updated, server.last_updated);
        assert_eq!(resolved.resolution, Some(ConflictChoice::Server));
    }

    #[tokio::test]
    async fn test_resolve_after_quote_removed() {
        let local = Quote::new("mine", "x");
        let manager = test_manager(QuoteStore::default());
        manager
            .register_conflicts(&[Conflict {
                id: local.id,
                local: local.clone(),
                server: local.clone(),
            }])
            .await;

        let result = manager.resolve_conflict(local.id, ConflictChoice::Server).await;
        assert!(matches!(result, Err(SyncManagerError::QuoteNotFound(_))));
        assert!(manager.pending_conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_conflict_keeps_first_local_snapshot() {
        let original = Quote::new("original", "x");
        let mut first_server = original.clone();
        first_server.text = "server v1".to_string();
        let mut second_server = original.clone();
        second_server.text = "server v2".to_string();

        let manager = test_manager(QuoteStore::default());
        manager
            .register_conflicts(&[Conflict {
                id: original.id,
                local: original.clone(),
                server: first_server.clone(),
            }])
            .await;
        manager
            .register_conflicts(&[Conflict {
                id: original.id,
                local: first_server,
                server: second_server.clone(),
            }])
            .await;

        let pending = manager.pending_conflicts().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local, original);
        assert_eq!(pending[0].server, second_server);
    }
}
