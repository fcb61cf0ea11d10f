//! Session cache - ephemeral per-run state
//!
//! Holds values that only live as long as the running process:
//! - the time of the last persisted change
//! - the last quote shown to the user
//!
//! Nothing here is written to disk.

use crate::quotes::Quote;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SessionKey {
    LastUpdated,
    LastViewedQuote,
}

#[derive(Debug, Clone)]
enum SessionValue {
    Timestamp(DateTime<Utc>),
    Quote(Box<Quote>),
}

/// Ephemeral session store
#[derive(Clone)]
pub struct SessionCache {
    cache: Arc<Cache<SessionKey, SessionValue>>,
}

impl SessionCache {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(16)
            .build();

        Self {
            cache: Arc::new(cache),
        }
    }

    /// Record that the persisted store just changed
    pub async fn touch_last_updated(&self) {
        self.cache
            .insert(SessionKey::LastUpdated, SessionValue::Timestamp(Utc::now()))
            .await;
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        match self.cache.get(&SessionKey::LastUpdated).await {
            Some(SessionValue::Timestamp(at)) => Some(at),
            _ => None,
        }
    }

    pub async fn set_last_viewed(&self, quote: &Quote) {
        self.cache
            .insert(SessionKey::LastViewedQuote, SessionValue::Quote(Box::new(quote.clone())))
            .await;
    }

    pub async fn last_viewed(&self) -> Option<Quote> {
        match self.cache.get(&SessionKey::LastViewedQuote).await {
            Some(SessionValue::Quote(quote)) => Some(*quote),
            _ => None,
        }
    }

    /// Forget everything (used by clear)
    pub async fn clear(&self) {
        self.cache.invalidate(&SessionKey::LastUpdated).await;
        self.cache.invalidate(&SessionKey::LastViewedQuote).await;
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
