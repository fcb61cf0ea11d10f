//! Quote Store - the collection of quote records
//!
//! Holds the in-memory quote list that every other component reads from or
//! writes to:
//! - Quote records and their sync metadata
//! - Category filtering and random selection
//! - Fresh identifier allocation
//! - Default seed set for a first start

pub mod transfer;

use crate::sync::models::ConflictChoice;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Category assigned to every record pulled from the server
pub const SERVER_CATEGORY: &str = "server";

/// Store handle shared between the controller and the sync manager
pub type SharedStore = Arc<RwLock<QuoteStore>>;

// ============================================================================
// Identifiers
// ============================================================================

static LAST_ISSUED_ID: AtomicI64 = AtomicI64::new(0);

/// Allocate a fresh quote id from the millisecond clock.
///
/// Ids are strictly increasing within the process, so two quotes created in
/// the same millisecond still get distinct ids.
pub fn next_quote_id() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ISSUED_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ISSUED_ID.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(current) => last = current,
        }
    }
}

// ============================================================================
// Quote Record
// ============================================================================

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Local,
    Server,
    Import,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Local => "local",
            QuoteSource::Server => "server",
            QuoteSource::Import => "import",
        }
    }
}

/// A single quote record
///
/// Serialized in camelCase so exported files and the sync payload keep the
/// `lastUpdated` / `lastSynced` field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: i64,
    pub text: String,
    pub category: String,

    /// Sole ordering signal for conflict detection
    pub last_updated: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<QuoteSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,

    /// Set once a sync conflict on this record was settled by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictChoice>,
}

impl Quote {
    /// Create a local quote with a fresh id and current timestamp
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: next_quote_id(),
            text: text.into(),
            category: category.into(),
            last_updated: Utc::now(),
            source: Some(QuoteSource::Local),
            synced: Some(false),
            last_synced: None,
            resolved: None,
            resolution: None,
        }
    }

    /// Update timestamp to now
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Whether this record has changes the server has not seen yet
    pub fn needs_sync(&self) -> bool {
        if !self.synced.unwrap_or(false) {
            return true;
        }
        match self.last_synced {
            Some(last_synced) => self.last_updated > last_synced,
            None => true,
        }
    }
}

/// Quote validation errors
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("Please enter both quote text and category (missing {0})")]
    MissingField(&'static str),
}

// ============================================================================
// Category Filter
// ============================================================================

/// Category selection applied to random display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Category(String),
}

impl CategoryFilter {
    /// Parse user input; only the exact word `all` (or nothing) means all
    ///
    /// Categories are stored trimmed, so surrounding whitespace is dropped.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "all" {
            CategoryFilter::All
        } else {
            CategoryFilter::Category(trimmed.to_string())
        }
    }

    /// The selected category, `None` for all
    pub fn category(&self) -> Option<&str> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Category(category) => Some(category),
        }
    }

    pub fn matches(&self, quote: &Quote) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Category(category) => &quote.category == category,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CategoryFilter::All => "All Categories",
            CategoryFilter::Category(category) => category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("all"),
            CategoryFilter::Category(category) => f.write_str(category),
        }
    }
}

// ============================================================================
// Quote Store
// ============================================================================

/// Ordered collection of quote records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteStore {
    quotes: Vec<Quote>,
}

impl QuoteStore {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self { quotes }
    }

    /// The seed set used when nothing has been persisted yet
    pub fn with_defaults() -> Self {
        let now = Utc::now();
        let seed = [
            (1, "The only way to do great work is to love what you do.", "inspiration"),
            (2, "Innovation distinguishes between a leader and a follower.", "leadership"),
            (3, "Your time is limited, don't waste it living someone else's life.", "life"),
        ];

        let quotes = seed
            .into_iter()
            .map(|(id, text, category)| Quote {
                id,
                text: text.to_string(),
                category: category.to_string(),
                last_updated: now,
                source: Some(QuoteSource::Local),
                synced: None,
                last_synced: None,
                resolved: None,
                resolution: None,
            })
            .collect();

        Self { quotes }
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.id == id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Quote> {
        self.quotes.iter_mut().find(|q| q.id == id)
    }

    /// Validate and append a new local quote
    pub fn add(&mut self, text: &str, category: &str) -> Result<Quote, QuoteError> {
        let text = text.trim();
        let category = category.trim();

        if text.is_empty() {
            return Err(QuoteError::MissingField("text"));
        }
        if category.is_empty() {
            return Err(QuoteError::MissingField("category"));
        }

        let quote = Quote::new(text, category);
        self.quotes.push(quote.clone());
        Ok(quote)
    }

    /// Swap in a whole new record set (import, merge)
    pub fn replace_all(&mut self, quotes: Vec<Quote>) {
        self.quotes = quotes;
    }

    pub fn clear(&mut self) {
        self.quotes.clear();
    }

    /// Distinct categories in first-appearance order
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for quote in &self.quotes {
            if !categories.iter().any(|c| c == &quote.category) {
                categories.push(quote.category.clone());
            }
        }
        categories
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.quotes.iter().any(|q| q.category == category)
    }

    pub fn filtered(&self, filter: &CategoryFilter) -> Vec<&Quote> {
        self.quotes.iter().filter(|q| filter.matches(q)).collect()
    }

    /// Pick a random quote among those matching the filter
    pub fn random<R: Rng + ?Sized>(&self, filter: &CategoryFilter, rng: &mut R) -> Option<&Quote> {
        self.filtered(filter).choose(rng).copied()
    }

    /// Records with changes not yet acknowledged by the server
    pub fn pending_sync(&self) -> Vec<Quote> {
        self.quotes.iter().filter(|q| q.needs_sync()).cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
