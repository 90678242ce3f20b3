//! Scrape HTML pages into feeds.
//!
//! Feed definitions pair a page URL with CSS selectors. The [`feed`] module
//! fetches each page, extracts and normalizes items, and merges them into the
//! SQLite store in [`storage`]; [`feed::Scheduler`] repeats that on an
//! interval.

pub mod config;
pub mod feed;
pub mod storage;
