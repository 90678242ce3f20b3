//! Turning HTML pages into feed items.
//!
//! A feed definition names a page and the CSS selectors that locate items on
//! it. Refreshing a feed runs the same pipeline every time:
//!
//! - [`fetcher`] - one size- and time-bounded GET, reporting the final URL
//! - [`extractor`] - selector matching over the parsed document
//! - [`dates`] / [`links`] - normalization of scraped date text and hrefs
//! - [`refresher`] - per-feed orchestration, upsert and failure isolation
//! - [`scheduler`] - the recurring background task
//!
//! # Example
//!
//! ```ignore
//! use pagefeed::feed::{build_client, FetchLimits, Refresher, Scheduler};
//!
//! let client = build_client("pagefeed", limits.timeout)?;
//! let refresher = Arc::new(Refresher::new(Arc::new(db), client, limits));
//! let handle = Scheduler::new(refresher, interval).start();
//! ```

pub mod dates;
pub mod extractor;
pub mod fetcher;
pub mod links;
pub mod refresher;
pub mod scheduler;

#[cfg(test)]
mod fake_store;

pub use dates::parse_date;
pub use extractor::{
    extract, extract_compiled, CompiledSelectors, ExtractError, RawItem, Selectors,
};
pub use fetcher::{build_client, fetch_page, FetchError, FetchLimits, FetchedPage};
pub use links::resolve_link;
pub use refresher::{BatchSummary, RefreshError, RefreshStats, Refresher};
pub use scheduler::{Scheduler, SchedulerHandle, DEFAULT_INTERVAL, MIN_INTERVAL};
