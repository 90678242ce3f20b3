use async_trait::async_trait;

use super::schema::Database;
use super::types::{DatabaseError, FeedDefinition, ItemUpsert, UpsertOutcome};

/// The slice of the record store the refresher depends on.
///
/// `Database` is the production implementation; refresher and scheduler tests
/// substitute in-memory fakes.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// All feed definitions, in the order a batch should visit them
    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, DatabaseError>;

    async fn get_feed(&self, feed_id: i64) -> Result<Option<FeedDefinition>, DatabaseError>;

    /// Merge one item keyed on `(feed_id, item.link)`
    async fn upsert_item(
        &self,
        feed_id: i64,
        item: &ItemUpsert,
    ) -> Result<UpsertOutcome, DatabaseError>;

    async fn set_last_synced_at(&self, feed_id: i64, timestamp: i64) -> Result<(), DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, DatabaseError> {
        Database::list_feeds(self).await
    }

    async fn get_feed(&self, feed_id: i64) -> Result<Option<FeedDefinition>, DatabaseError> {
        Database::get_feed(self, feed_id).await
    }

    async fn upsert_item(
        &self,
        feed_id: i64,
        item: &ItemUpsert,
    ) -> Result<UpsertOutcome, DatabaseError> {
        Database::upsert_item(self, feed_id, item).await
    }

    async fn set_last_synced_at(&self, feed_id: i64, timestamp: i64) -> Result<(), DatabaseError> {
        Database::set_last_synced_at(self, feed_id, timestamp).await
    }
}
