use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Database is locked by another process. Is another pagefeed instance running?")]
    InstanceLocked,

    /// Schema creation failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Helper Types
// ============================================================================

/// A feed definition as written by the management side (or an import file).
///
/// Selector fields are optional at rest: the management UI may save a
/// definition before every selector is known. The refresher refuses to fetch
/// a feed until `item`, `title` and `link` are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub item_selector: Option<String>,
    #[serde(default)]
    pub title_selector: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub date_selector: Option<String>,
    #[serde(default)]
    pub description_selector: Option<String>,
}

/// One transformed item ready to be merged into the store.
///
/// `link` is already absolute and `published` already normalized to unix
/// seconds at midnight UTC of the parsed calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpsert {
    pub link: String,
    pub title: String,
    pub description: Option<String>,
    pub published: Option<i64>,
}

/// What an upsert did to the `(feed_id, link)` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the key; a new item was created
    Inserted,
    /// An existing item had its title, description and date refreshed
    Updated,
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed definition from database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedDefinition {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub item_selector: Option<String>,
    pub title_selector: Option<String>,
    pub link_selector: Option<String>,
    pub date_selector: Option<String>,
    pub description_selector: Option<String>,
    /// Unix seconds of the last refresh pass; `None` means never synced
    pub last_synced_at: Option<i64>,
}

/// Feed item from database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedItem {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub published: Option<i64>,
    pub created_at: i64,
}

impl FeedItem {
    /// Calendar date the item was published on, if the page carried one
    pub fn published_date(&self) -> Option<chrono::NaiveDate> {
        self.published
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive())
    }
}
