//! In-memory `FeedStore` for refresher and scheduler tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::storage::{DatabaseError, FeedDefinition, FeedStore, ItemUpsert, UpsertOutcome};

#[derive(Default)]
pub(crate) struct FakeStore {
    pub feeds: Vec<FeedDefinition>,
    pub items: Mutex<Vec<(i64, ItemUpsert)>>,
    pub synced: Mutex<Vec<(i64, i64)>>,
    pub list_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
    /// 1-based upsert call that returns an error
    pub fail_upsert_call: Option<usize>,
    pub fail_timestamp: bool,
}

impl FakeStore {
    pub fn with_feeds(feeds: Vec<FeedDefinition>) -> Self {
        Self {
            feeds,
            ..Default::default()
        }
    }

    pub fn items(&self) -> Vec<(i64, ItemUpsert)> {
        self.items.lock().unwrap().clone()
    }

    pub fn synced(&self) -> Vec<(i64, i64)> {
        self.synced.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn injected_failure() -> DatabaseError {
    DatabaseError::Other(sqlx::Error::Protocol("injected failure".to_string()))
}

#[async_trait]
impl FeedStore for FakeStore {
    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, DatabaseError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.feeds.clone())
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Option<FeedDefinition>, DatabaseError> {
        Ok(self.feeds.iter().find(|f| f.id == feed_id).cloned())
    }

    async fn upsert_item(
        &self,
        feed_id: i64,
        item: &ItemUpsert,
    ) -> Result<UpsertOutcome, DatabaseError> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upsert_call == Some(call) {
            return Err(injected_failure());
        }

        let mut items = self.items.lock().unwrap();
        match items
            .iter_mut()
            .find(|(id, existing)| *id == feed_id && existing.link == item.link)
        {
            Some(existing) => {
                existing.1 = item.clone();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                items.push((feed_id, item.clone()));
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn set_last_synced_at(&self, feed_id: i64, timestamp: i64) -> Result<(), DatabaseError> {
        if self.fail_timestamp {
            return Err(injected_failure());
        }
        self.synced.lock().unwrap().push((feed_id, timestamp));
        Ok(())
    }
}

/// A feed definition with the usual `.item` / `.title` / `a` selectors.
pub(crate) fn feed(id: i64, url: &str) -> FeedDefinition {
    FeedDefinition {
        id,
        name: format!("Feed {}", id),
        url: url.to_string(),
        item_selector: Some(".item".to_string()),
        title_selector: Some(".title".to_string()),
        link_selector: Some("a".to_string()),
        date_selector: Some(".date".to_string()),
        description_selector: None,
        last_synced_at: None,
    }
}
