//! Configuration file parser for ~/.config/pagefeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
//!
//! The same module reads feed import files (`--import`), a TOML list of
//! `[[feed]]` tables.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::FetchLimits;
use crate::storage::NewFeed;

/// Environment variable that overrides `database_path`.
pub const DB_PATH_ENV: &str = "PAGEFEED_DB_PATH";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// File exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `pagefeed.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Minutes between scheduled refresh batches (1 to 10080, one week).
    pub refresh_interval_minutes: u64,

    /// Per-request timeout for page fetches.
    pub request_timeout_secs: u64,

    /// Largest page body accepted, in bytes.
    pub max_page_bytes: usize,

    /// User-Agent header sent with every fetch.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            refresh_interval_minutes: 60,
            request_timeout_secs: 30,
            max_page_bytes: 10 * 1024 * 1024,
            user_agent: format!("pagefeed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

const KNOWN_KEYS: [&str; 5] = [
    "database_path",
    "refresh_interval_minutes",
    "request_timeout_secs",
    "max_page_bytes",
    "user_agent",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Longest refresh interval honored (one week).
    const MAX_REFRESH_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_limited(path)? else {
            return Ok(Self::default());
        };

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Time between scheduled batches, clamped to one minute..one week.
    pub fn refresh_interval(&self) -> Duration {
        let minutes = self
            .refresh_interval_minutes
            .clamp(1, Self::MAX_REFRESH_INTERVAL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            max_bytes: self.max_page_bytes,
        }
    }

    /// Database location: `PAGEFEED_DB_PATH`, then `database_path`, then
    /// `pagefeed.db` inside `config_dir`.
    pub fn resolve_database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path_with(std::env::var(DB_PATH_ENV).ok(), config_dir)
    }

    fn database_path_with(&self, env_override: Option<String>, config_dir: &Path) -> PathBuf {
        env_override
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| config_dir.join("pagefeed.db"))
    }
}

// ============================================================================
// Feed Import Files
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct FeedImport {
    #[serde(default)]
    feed: Vec<NewFeed>,
}

/// Read feed definitions from an import file.
///
/// ```toml
/// [[feed]]
/// name = "Example news"
/// url = "https://example.com/news"
/// item_selector = ".item"
/// title_selector = ".title"
/// link_selector = "a"
/// date_selector = ".date"
/// ```
///
/// Entries without a name or URL are skipped with a warning.
pub fn load_feed_definitions(path: &Path) -> Result<Vec<NewFeed>, ConfigError> {
    let Some(content) = read_limited(path)? else {
        return Ok(Vec::new());
    };

    let import: FeedImport = toml::from_str(&content)?;
    let feeds: Vec<NewFeed> = import
        .feed
        .into_iter()
        .filter(|f| {
            let complete = !f.name.trim().is_empty() && !f.url.trim().is_empty();
            if !complete {
                tracing::warn!(name = %f.name, url = %f.url, "Skipping feed without name or URL");
            }
            complete
        })
        .collect();

    tracing::debug!(path = %path.display(), count = feeds.len(), "Read feed definitions");
    Ok(feeds)
}

/// Read a TOML file under the size cap. `None` for a missing or blank file.
fn read_limited(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > Config::MAX_FILE_SIZE => {
            return Err(ConfigError::TooLarge(format!(
                "{} is {} bytes (max {} bytes)",
                path.display(),
                meta.len(),
                Config::MAX_FILE_SIZE
            )));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "File not found, using defaults");
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::Io(e)),
        Ok(_) => {}
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Deleted between metadata and read
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    if content.trim().is_empty() {
        tracing::debug!(path = %path.display(), "File is empty, using defaults");
        return Ok(None);
    }

    Ok(Some(content))
}

// ============================================================================
// Tests
// ============================================================================
