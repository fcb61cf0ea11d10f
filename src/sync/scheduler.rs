//! Background Sync Scheduler
//!
//! Provides automatic periodic synchronization at configurable intervals.
//! Uses Tokio tasks for non-blocking background execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use chrono::{DateTime, Utc};
use crate::db::{Database, SCHEDULER_CONFIG_KEY};
use super::manager::{SyncManager, SyncManagerError};

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Scheduler configuration stored in settings table
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_INTERVAL_SECS,
            last_run: None,
        }
    }
}

/// Background scheduler for automatic sync operations
#[derive(Clone)]
pub struct BackgroundScheduler {
    db: Arc<Database>,
    config: Arc<RwLock<SchedulerConfig>>,
    running: Arc<AtomicBool>,
    task_handle: Arc<StdMutex<Option<JoinHandle<()>>>>,
}

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

fn validate_interval(interval_secs: u64) -> Result<(), SchedulerError> {
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval_secs) {
        return Err(SchedulerError::InvalidInterval(format!(
            "Interval must be {}-{} seconds, got {}",
            MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, interval_secs
        )));
    }
    Ok(())
}

impl BackgroundScheduler {
    /// Create new scheduler instance
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            config: Arc::new(RwLock::new(SchedulerConfig::default())),
            running: Arc::new(AtomicBool::new(false)),
            task_handle: Arc::new(StdMutex::new(None)),
        }
    }

    /// Load configuration from database settings table
    ///
    /// Falls back to `default` when nothing was saved yet.
    pub async fn load_config(&self, default: SchedulerConfig) -> Result<(), SchedulerError> {
        let config: SchedulerConfig = self.db
            .get_setting(SCHEDULER_CONFIG_KEY)
            .map_err(|e| SchedulerError::Database(e.to_string()))?
            .unwrap_or(default);

        *self.config.write().await = config;
        Ok(())
    }

    /// Save configuration to database settings table
    pub async fn save_config(&self) -> Result<(), SchedulerError> {
        let config = self.config.read().await.clone();
        self.db
            .set_setting(SCHEDULER_CONFIG_KEY, &config)
            .map_err(|e| SchedulerError::Database(e.to_string()))?;
        Ok(())
    }

    /// Start background scheduler task
    pub async fn start(&self, sync_manager: SyncManager) -> Result<(), SchedulerError> {
        let interval_secs = self.config.read().await.interval_secs;
        validate_interval(interval_secs)?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let running_clone = self.running.clone();
        let db_clone = self.db.clone();
        let config_clone = self.config.clone();

        let handle = tokio::spawn(async move {
            Self::scheduler_loop(running_clone, db_clone, config_clone, sync_manager).await;
        });

        *self.task_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        log::info!("Background scheduler started (interval: {} seconds)", interval_secs);
        Ok(())
    }

    /// Stop background scheduler task
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        if let Some(handle) = self.task_handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }

        log::info!("Background scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get current configuration
    pub async fn get_config(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    /// Update configuration and restart scheduler if needed
    pub async fn update_config(
        &self,
        enabled: bool,
        interval_secs: u64,
        sync_manager: SyncManager,
    ) -> Result<(), SchedulerError> {
        validate_interval(interval_secs)?;

        {
            let mut config = self.config.write().await;
            config.enabled = enabled;
            config.interval_secs = interval_secs;
        }

        self.save_config().await?;

        if self.is_running() {
            // Ignore error if not running (race condition)
            let _ = self.stop().await;
        }

        if enabled {
            self.start(sync_manager).await?;
        }

        log::info!("Scheduler config updated: enabled={}, interval={} seconds", enabled, interval_secs);
        Ok(())
    }

    /// Background scheduler loop (runs in spawned task)
    ///
    /// The first tick fires immediately, so a cycle runs on start.
    async fn scheduler_loop(
        running: Arc<AtomicBool>,
        db: Arc<Database>,
        config: Arc<RwLock<SchedulerConfig>>,
        sync_manager: SyncManager,
    ) {
        let interval_secs = config.read().await.interval_secs;
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Scheduler loop started (interval: {} seconds)", interval_secs);

        loop {
            interval.tick().await;

            if !running.load(Ordering::SeqCst) {
                log::info!("Scheduler loop: stopping (running flag is false)");
                break;
            }

            log::debug!("Background sync triggered by scheduler");

            match sync_manager.run_cycle().await {
                Ok(report) => {
                    log::info!(
                        "Background sync completed: fetched={}, appended={}, conflicts={}, sent={}",
                        report.fetched,
                        report.appended,
                        report.conflicts.len(),
                        report.sent
                    );

                    let snapshot = {
                        let mut cfg = config.write().await;
                        cfg.last_run = Some(Utc::now());
                        cfg.clone()
                    };

                    if let Err(e) = db.set_setting(SCHEDULER_CONFIG_KEY, &snapshot) {
                        log::error!("Failed to save last_run timestamp: {}", e);
                    }
                }
                Err(SyncManagerError::AlreadySyncing) => {
                    log::warn!("Scheduled sync skipped: a cycle is already in progress");
                }
                Err(e) => {
                    // Already surfaced through status and notifier; the next tick tries again
                    log::error!("Background sync failed: {}", e);
                }
            }
        }

        log::info!("Scheduler loop exited");
    }
}

// ============================================================================
// Tests
// ============================================================================
