//! Quote Sync - quote collection with periodic server reconciliation
//!
//! Library side of the `quote-sync` binary:
//! - `quotes`: records, filtering, random pick, JSON export/import
//! - `sync`: fetch / merge / send cycle, conflicts, scheduler, history
//! - `db`: SQLite-backed persistence
//! - `cache`: per-process session values
//! - `config`: environment configuration
//!
//! `QuoteApp` ties them together; every user-facing operation goes through it.

pub mod cache;
pub mod config;
pub mod db;
pub mod quotes;
pub mod sync;

use cache::SessionCache;
use config::{AppConfig, ConfigError};
use db::{Database, DbError};
use quotes::transfer::{self, TransferError};
use quotes::{CategoryFilter, Quote, QuoteError, QuoteStore, SharedStore};
use std::path::Path;
use std::sync::Arc;
use sync::{
    BackgroundScheduler, Conflict, ConflictChoice, HistoryEntry, HistoryError, HistoryStats, Notifier,
    SchedulerConfig, SchedulerError, SyncApiClient, SyncApiError, SyncManager, SyncManagerError,
    SyncReport, SyncStatus,
};
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Api(#[from] SyncApiError),

    #[error(transparent)]
    Sync(#[from] SyncManagerError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

pub type AppResult<T> = Result<T, AppError>;

// ============================================================================
// Application Controller
// ============================================================================

/// Owns the quote store and everything that reads or writes it
pub struct QuoteApp {
    db: Arc<Database>,
    store: SharedStore,
    filter: RwLock<CategoryFilter>,
    session: SessionCache,
    sync_manager: SyncManager,
    background_scheduler: BackgroundScheduler,
    default_interval_secs: u64,
}

impl QuoteApp {
    /// Open the database and endpoint described by `config`
    pub async fn open(config: &AppConfig, notifier: Arc<dyn Notifier>) -> AppResult<Self> {
        log::info!("Database path: {:?}", config.db_path);
        let db = Database::new(config.db_path.clone())?;
        log::info!("Database initialized successfully");

        let api = SyncApiClient::with_timeout(
            &config.server_url,
            config.api_token.clone(),
            config.request_timeout,
        )?;

        let mut app = Self::with_parts(Arc::new(db), api, notifier).await?;
        app.default_interval_secs = config.sync_interval_secs;
        Ok(app)
    }

    /// Assemble from already built parts
    ///
    /// Loads the persisted quotes and the saved filter; a saved category
    /// that no longer exists falls back to all. On a fresh database the
    /// default seed set is written straight away.
    pub async fn with_parts(
        db: Arc<Database>,
        api: SyncApiClient,
        notifier: Arc<dyn Notifier>,
    ) -> AppResult<Self> {
        let session = SessionCache::new();
        let store = match db.load_quotes()? {
            Some(quotes) => {
                log::info!("Loaded {} quotes from storage", quotes.len());
                QuoteStore::new(quotes)
            }
            None => {
                log::info!("No stored quotes, starting with defaults");
                let store = QuoteStore::with_defaults();
                db.save_quotes(store.quotes())?;
                session.touch_last_updated().await;
                store
            }
        };

        let filter = match db.load_filter()? {
            Some(CategoryFilter::Category(category)) if !store.has_category(&category) => {
                log::debug!("Saved filter {} no longer matches any quote", category);
                CategoryFilter::All
            }
            Some(filter) => filter,
            None => CategoryFilter::All,
        };

        let store: SharedStore = Arc::new(RwLock::new(store));
        let sync_manager = SyncManager::new(
            Arc::new(api),
            db.clone(),
            store.clone(),
            session.clone(),
            notifier,
        );
        let background_scheduler = BackgroundScheduler::new(db.clone());

        Ok(Self {
            db,
            store,
            filter: RwLock::new(filter),
            session,
            sync_manager,
            background_scheduler,
            default_interval_secs: sync::scheduler::DEFAULT_INTERVAL_SECS,
        })
    }

    // ========================================================================
    // Quotes
    // ========================================================================

    /// Random quote among those matching the current filter
    pub async fn show_random_quote(&self) -> Option<Quote> {
        let picked = {
            let store = self.store.read().await;
            let filter = self.filter.read().await;
            store.random(&filter, &mut rand::thread_rng()).cloned()
        };

        if let Some(quote) = &picked {
            self.session.set_last_viewed(quote).await;
        }
        picked
    }

    pub async fn quotes(&self) -> Vec<Quote> {
        self.store.read().await.quotes().to_vec()
    }

    pub async fn categories(&self) -> Vec<String> {
        self.store.read().await.categories()
    }

    pub async fn current_filter(&self) -> CategoryFilter {
        self.filter.read().await.clone()
    }

    pub async fn set_filter(&self, filter: CategoryFilter) -> AppResult<()> {
        self.db.save_filter(&filter)?;
        log::debug!("Filter set to {}", filter);
        *self.filter.write().await = filter;
        Ok(())
    }

    pub async fn add_quote(&self, text: &str, category: &str) -> AppResult<Quote> {
        let quote = {
            let mut store = self.store.write().await;
            let quote = store.add(text, category)?;
            self.db.save_quotes(store.quotes())?;
            quote
        };

        self.session.touch_last_updated().await;
        log::info!("Added quote {} in category {}", quote.id, quote.category);
        Ok(quote)
    }

    /// Time of the last persisted change in this session
    pub async fn last_updated(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.session.last_updated().await
    }

    pub async fn last_viewed(&self) -> Option<Quote> {
        self.session.last_viewed().await
    }

    // ========================================================================
    // Export / Import
    // ========================================================================

    pub async fn export_json(&self) -> AppResult<String> {
        let store = self.store.read().await;
        Ok(transfer::export_quotes(store.quotes())?)
    }

    pub async fn export_to_file(&self, path: &Path) -> AppResult<()> {
        let store = self.store.read().await;
        Ok(transfer::export_to_file(store.quotes(), path)?)
    }

    /// Replace the store with a validated payload; returns the record count
    pub async fn import_json(&self, json: &str) -> AppResult<usize> {
        let imported = transfer::parse_import(json)?;
        self.replace_store(imported).await
    }

    pub async fn import_from_file(&self, path: &Path) -> AppResult<usize> {
        let imported = transfer::read_import_file(path)?;
        self.replace_store(imported).await
    }

    async fn replace_store(&self, quotes: Vec<Quote>) -> AppResult<usize> {
        let count = quotes.len();
        {
            let mut store = self.store.write().await;
            self.db.save_quotes(&quotes)?;
            store.replace_all(quotes);
        }

        self.session.touch_last_updated().await;
        log::info!("Imported {} quotes", count);
        Ok(count)
    }

    /// Drop every quote and the saved filter
    ///
    /// An empty array is persisted afterwards, so the next start does not
    /// fall back to the default seed set.
    pub async fn clear(&self) -> AppResult<()> {
        {
            let mut store = self.store.write().await;
            self.db.clear_quotes()?;
            self.session.clear().await;
            store.clear();
            self.db.save_quotes(store.quotes())?;
        }
        self.session.touch_last_updated().await;
        *self.filter.write().await = CategoryFilter::All;

        log::info!("All quotes cleared");
        Ok(())
    }

    // ========================================================================
    // Sync
    // ========================================================================

    pub async fn sync_now(&self) -> AppResult<SyncReport> {
        Ok(self.sync_manager.run_cycle().await?)
    }

    pub async fn resolve_conflict(&self, id: i64, choice: ConflictChoice) -> AppResult<Quote> {
        Ok(self.sync_manager.resolve_conflict(id, choice).await?)
    }

    pub async fn pending_conflicts(&self) -> Vec<Conflict> {
        self.sync_manager.pending_conflicts().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync_manager.get_status().await
    }

    pub fn sync_history(&self, limit: i64) -> AppResult<Vec<HistoryEntry>> {
        Ok(self.sync_manager.history().recent(limit)?)
    }

    /// Last acknowledged upload, kept across restarts
    pub fn last_sync(&self) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
        Ok(self.db.last_sync()?)
    }

    pub fn sync_stats(&self) -> AppResult<HistoryStats> {
        Ok(self.sync_manager.history().get_stats()?)
    }

    /// Drop history rows older than `retention_days`
    pub fn prune_history(&self, retention_days: i64) -> AppResult<usize> {
        Ok(self.sync_manager.history().enforce_retention_policy(retention_days)?)
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Load the saved scheduler config and start it when enabled
    ///
    /// Returns whether the scheduler is now running.
    pub async fn start_scheduler(&self) -> AppResult<bool> {
        let fallback = SchedulerConfig {
            interval_secs: self.default_interval_secs,
            ..SchedulerConfig::default()
        };
        self.background_scheduler.load_config(fallback).await?;

        let config = self.background_scheduler.get_config().await;
        if !config.enabled {
            log::info!("Background scheduler disabled in settings");
            return Ok(false);
        }

        log::info!("Starting background scheduler (interval: {} seconds)", config.interval_secs);
        self.background_scheduler.start(self.sync_manager.clone()).await?;
        Ok(true)
    }

    pub async fn stop_scheduler(&self) -> AppResult<()> {
        Ok(self.background_scheduler.stop().await?)
    }

    pub fn scheduler_running(&self) -> bool {
        self.background_scheduler.is_running()
    }

    pub async fn scheduler_config(&self) -> SchedulerConfig {
        self.background_scheduler.get_config().await
    }

    pub async fn update_scheduler(&self, enabled: bool, interval_secs: u64) -> AppResult<()> {
        Ok(self
            .background_scheduler
            .update_config(enabled, interval_secs, self.sync_manager.clone())
            .await?)
    }
}

// ============================================================================
// Tests
// ============================================================================
