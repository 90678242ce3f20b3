use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

use super::dates::{parse_date, to_timestamp};
use super::extractor::{extract_compiled, ExtractError, RawItem, Selectors};
use super::fetcher::{fetch_page, FetchError, FetchLimits};
use super::links::resolve_link;
use crate::storage::{DatabaseError, FeedDefinition, FeedStore, ItemUpsert, UpsertOutcome};

/// Errors that stop a single feed's refresh.
///
/// Per-item problems (an unparseable date, a failed upsert) never surface
/// here; they are logged and counted in [`RefreshStats`].
#[derive(Debug, Error)]
pub enum RefreshError {
    /// A required selector is not configured; nothing was fetched
    #[error("Feed {feed_id} has no {selector} selector configured")]
    MissingSelector {
        feed_id: i64,
        selector: &'static str,
    },
    /// The source page could not be retrieved; nothing was written
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// A configured selector is not valid CSS; nothing was written
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// No feed definition with this ID
    #[error("Feed {0} not found")]
    FeedNotFound(i64),
    /// Loading the feed definition failed
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Counters for one successful feed refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Nodes matched by the item selector
    pub matched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Items whose upsert failed
    pub failed: usize,
    /// Items stored without a publish date
    pub undated: usize,
}

/// Outcome of one pass over every feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Feeds listed at the start of the pass
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs the fetch → extract → normalize → upsert cycle for feed definitions.
pub struct Refresher {
    store: Arc<dyn FeedStore>,
    client: reqwest::Client,
    limits: FetchLimits,
}

impl Refresher {
    pub fn new(store: Arc<dyn FeedStore>, client: reqwest::Client, limits: FetchLimits) -> Self {
        Self {
            store,
            client,
            limits,
        }
    }

    /// Refresh one feed and merge its items into the store.
    ///
    /// The feed's last-synced timestamp is written once every candidate has
    /// been processed, even when some upserts failed. Failing to write it is
    /// logged only.
    ///
    /// # Errors
    ///
    /// - [`RefreshError::MissingSelector`] - item, title or link selector unset
    /// - [`RefreshError::Fetch`] - transport failure or non-2xx status
    /// - [`RefreshError::Extract`] - a selector is not valid CSS
    ///
    /// None of these leave partial writes behind.
    pub async fn refresh_one(&self, feed: &FeedDefinition) -> Result<RefreshStats, RefreshError> {
        let (items, matched) = self.collect_items(feed).await?;

        let mut stats = RefreshStats {
            matched,
            ..RefreshStats::default()
        };

        for item in &items {
            if item.published.is_none() {
                stats.undated += 1;
            }
            match self.store.upsert_item(feed.id, item).await {
                Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                Ok(UpsertOutcome::Updated) => stats.updated += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        feed_id = feed.id,
                        link = %item.link,
                        error = %e,
                        "Failed to upsert feed item"
                    );
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        if let Err(e) = self.store.set_last_synced_at(feed.id, now).await {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to update last-synced timestamp");
        }

        tracing::info!(
            feed_id = feed.id,
            matched = stats.matched,
            inserted = stats.inserted,
            updated = stats.updated,
            failed = stats.failed,
            "Feed refreshed"
        );

        Ok(stats)
    }

    /// Manual trigger: load a definition by ID and refresh it.
    pub async fn refresh_by_id(&self, feed_id: i64) -> Result<RefreshStats, RefreshError> {
        let feed = self
            .store
            .get_feed(feed_id)
            .await?
            .ok_or(RefreshError::FeedNotFound(feed_id))?;
        self.refresh_one(&feed).await
    }

    /// Fetch and transform a feed's items without writing anything.
    pub async fn preview(&self, feed: &FeedDefinition) -> Result<Vec<ItemUpsert>, RefreshError> {
        let (items, _) = self.collect_items(feed).await?;
        Ok(items)
    }

    /// Refresh every feed once, sequentially, in listing order.
    pub async fn refresh_all(&self) -> BatchSummary {
        self.refresh_feeds(None).await
    }

    /// Like [`Refresher::refresh_all`], but stops before the next feed once
    /// `shutdown` reads `true`. The feed in flight always completes.
    pub async fn refresh_all_until(&self, shutdown: &watch::Receiver<bool>) -> BatchSummary {
        self.refresh_feeds(Some(shutdown)).await
    }

    async fn refresh_feeds(&self, shutdown: Option<&watch::Receiver<bool>>) -> BatchSummary {
        let feeds = match self.store.list_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list feeds");
                return BatchSummary::default();
            }
        };

        let mut summary = BatchSummary {
            total: feeds.len(),
            ..BatchSummary::default()
        };

        for feed in &feeds {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!(
                    remaining = summary.total - summary.succeeded - summary.failed,
                    "Shutdown requested, stopping batch"
                );
                break;
            }

            match self.refresh_one(feed).await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(feed_id = feed.id, url = %feed.url, error = %e, "Feed refresh failed");
                }
            }
        }

        summary
    }

    /// Steps shared by refresh and preview: validate, compile, fetch, extract,
    /// normalize. Selector problems fail before the page is requested.
    ///
    /// Returns the transformed items and the number of matched item nodes.
    async fn collect_items(
        &self,
        feed: &FeedDefinition,
    ) -> Result<(Vec<ItemUpsert>, usize), RefreshError> {
        let selectors = selectors_of(feed)?.compile()?;

        let page = fetch_page(&self.client, &feed.url, &self.limits).await?;

        // The parsed document is not Send; keep it out of any await.
        let raw = extract_compiled(&page.body, &selectors);
        let matched = raw.len();
        tracing::debug!(feed_id = feed.id, matched = matched, "Extracted candidate items");

        let items = raw
            .into_iter()
            .map(|r| transform(feed.id, r, &page.final_url))
            .collect();

        Ok((items, matched))
    }
}

fn required<'a>(
    feed_id: i64,
    selector: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, RefreshError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RefreshError::MissingSelector { feed_id, selector })
}

/// Item, title and link selectors are required and checked in that order.
fn selectors_of(feed: &FeedDefinition) -> Result<Selectors<'_>, RefreshError> {
    Ok(Selectors {
        item: required(feed.id, "item", &feed.item_selector)?,
        title: required(feed.id, "title", &feed.title_selector)?,
        link: required(feed.id, "link", &feed.link_selector)?,
        date: feed.date_selector.as_deref(),
        description: feed.description_selector.as_deref(),
    })
}

fn transform(feed_id: i64, raw: RawItem, base: &Url) -> ItemUpsert {
    let published = if raw.date_text.is_empty() {
        None
    } else {
        let date = parse_date(&raw.date_text);
        if date.is_none() {
            tracing::warn!(feed_id = feed_id, text = %raw.date_text, "Unrecognized date format");
        }
        date.map(to_timestamp)
    };

    ItemUpsert {
        link: resolve_link(&raw.link, base),
        title: raw.title,
        description: Some(raw.description).filter(|d| !d.is_empty()),
        published,
    }
}
