use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, FeedDefinition, NewFeed};

const FEED_COLUMNS: &str = "id, name, url, item_selector, title_selector, link_selector, \
                            date_selector, description_selector, last_synced_at";

/// Empty strings from forms and import files mean "not configured".
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a feed definition, returning its ID.
    ///
    /// A definition with the same URL is updated in place and keeps its ID
    /// and items.
    pub async fn insert_feed(&self, feed: &NewFeed) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (name, url, item_selector, title_selector, link_selector,
                               date_selector, description_selector, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                item_selector = excluded.item_selector,
                title_selector = excluded.title_selector,
                link_selector = excluded.link_selector,
                date_selector = excluded.date_selector,
                description_selector = excluded.description_selector
            RETURNING id
        "#,
        )
        .bind(feed.name.trim())
        .bind(feed.url.trim())
        .bind(non_empty(&feed.item_selector))
        .bind(non_empty(&feed.title_selector))
        .bind(non_empty(&feed.link_selector))
        .bind(non_empty(&feed.date_selector))
        .bind(non_empty(&feed.description_selector))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Sync feed definitions from an import file (upsert by URL)
    ///
    /// Batched INSERT in chunks of 100; 8 columns * 100 stays under SQLite's
    /// 999 parameter limit.
    pub async fn sync_feeds(&self, feeds: &[NewFeed]) -> Result<()> {
        if feeds.is_empty() {
            return Ok(());
        }

        const BATCH_SIZE: usize = 100;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for chunk in feeds.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO feeds (name, url, item_selector, title_selector, link_selector, \
                 date_selector, description_selector, created_at) ",
            );

            builder.push_values(chunk, |mut b, feed| {
                b.push_bind(feed.name.trim())
                    .push_bind(feed.url.trim())
                    .push_bind(non_empty(&feed.item_selector))
                    .push_bind(non_empty(&feed.title_selector))
                    .push_bind(non_empty(&feed.link_selector))
                    .push_bind(non_empty(&feed.date_selector))
                    .push_bind(non_empty(&feed.description_selector))
                    .push_bind(now);
            });

            builder.push(
                " ON CONFLICT(url) DO UPDATE SET name = excluded.name, \
                 item_selector = excluded.item_selector, \
                 title_selector = excluded.title_selector, \
                 link_selector = excluded.link_selector, \
                 date_selector = excluded.date_selector, \
                 description_selector = excluded.description_selector",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace name, URL and selectors of an existing feed.
    ///
    /// Returns `false` when no feed has the given ID. `last_synced_at` and the
    /// feed's items are left untouched.
    pub async fn update_feed(&self, feed_id: i64, feed: &NewFeed) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                name = ?, url = ?, item_selector = ?, title_selector = ?,
                link_selector = ?, date_selector = ?, description_selector = ?
            WHERE id = ?
        "#,
        )
        .bind(feed.name.trim())
        .bind(feed.url.trim())
        .bind(non_empty(&feed.item_selector))
        .bind(non_empty(&feed.title_selector))
        .bind(non_empty(&feed.link_selector))
        .bind(non_empty(&feed.date_selector))
        .bind(non_empty(&feed.description_selector))
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a single feed definition by ID
    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<FeedDefinition>, DatabaseError> {
        let feed = sqlx::query_as::<_, FeedDefinition>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(feed)
    }

    /// Get all feed definitions in ID order
    pub async fn list_feeds(&self) -> Result<Vec<FeedDefinition>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedDefinition>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Delete a feed and (by cascade) all of its items.
    ///
    /// Returns the number of items removed. Deleting an unknown ID is a no-op.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let removed: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_items WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed.0.max(0) as u64)
    }

    /// Record the time of the last refresh pass for a feed
    pub async fn set_last_synced_at(&self, feed_id: i64, timestamp: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET last_synced_at = ? WHERE id = ?")
            .bind(timestamp)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewFeed};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_feed(id: i64) -> NewFeed {
        NewFeed {
            name: format!("Test Feed {}", id),
            url: format!("https://site{}.example.com/news", id),
            item_selector: Some(".item".to_string()),
            title_selector: Some(".title".to_string()),
            link_selector: Some("a".to_string()),
            date_selector: None,
            description_selector: None,
        }
    }

    #[tokio::test]
    async fn test_insert_feed_appears_in_list() {
        let db = test_db().await;
        let id = db.insert_feed(&test_feed(1)).await.unwrap();
        assert!(id > 0);

        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].id, id);
        assert_eq!(feeds[0].name, "Test Feed 1");
        assert_eq!(feeds[0].item_selector.as_deref(), Some(".item"));
        assert_eq!(feeds[0].last_synced_at, None);
    }

    #[tokio::test]
    async fn test_insert_feed_blank_selectors_stored_as_null() {
        let db = test_db().await;
        let mut feed = test_feed(1);
        feed.title_selector = Some("   ".to_string());
        feed.date_selector = Some(String::new());

        let id = db.insert_feed(&feed).await.unwrap();
        let stored = db.get_feed(id).await.unwrap().unwrap();
        assert_eq!(stored.title_selector, None);
        assert_eq!(stored.date_selector, None);
    }

    #[tokio::test]
    async fn test_insert_feed_duplicate_url_keeps_id() {
        let db = test_db().await;
        let id1 = db.insert_feed(&test_feed(1)).await.unwrap();

        let mut renamed = test_feed(1);
        renamed.name = "Renamed".to_string();
        let id2 = db.insert_feed(&renamed).await.unwrap();

        assert_eq!(id1, id2);
        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "Renamed");
    }

    #[tokio::test]
    async fn test_sync_feeds_batch_chunking() {
        let db = test_db().await;

        let feeds: Vec<NewFeed> = (0..250).map(test_feed).collect();
        db.sync_feeds(&feeds).await.unwrap();

        let result = db.list_feeds().await.unwrap();
        assert_eq!(result.len(), 250);
        assert!(result.iter().any(|f| f.name == "Test Feed 0"));
        assert!(result.iter().any(|f| f.name == "Test Feed 249"));
    }

    #[tokio::test]
    async fn test_sync_feeds_updates_selectors() {
        let db = test_db().await;
        db.sync_feeds(&[test_feed(1)]).await.unwrap();

        let mut changed = test_feed(1);
        changed.item_selector = Some("article".to_string());
        changed.date_selector = Some("time".to_string());
        db.sync_feeds(&[changed]).await.unwrap();

        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].item_selector.as_deref(), Some("article"));
        assert_eq!(feeds[0].date_selector.as_deref(), Some("time"));
    }

    #[tokio::test]
    async fn test_sync_feeds_empty() {
        let db = test_db().await;
        db.sync_feeds(&[]).await.unwrap();
        assert!(db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_feed() {
        let db = test_db().await;
        let id = db.insert_feed(&test_feed(1)).await.unwrap();
        db.set_last_synced_at(id, 1_700_000_000).await.unwrap();

        let mut edited = test_feed(2);
        edited.description_selector = Some(".body".to_string());
        assert!(db.update_feed(id, &edited).await.unwrap());

        let stored = db.get_feed(id).await.unwrap().unwrap();
        assert_eq!(stored.url, "https://site2.example.com/news");
        assert_eq!(stored.description_selector.as_deref(), Some(".body"));
        assert_eq!(stored.last_synced_at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_update_unknown_feed_returns_false() {
        let db = test_db().await;
        assert!(!db.update_feed(42, &test_feed(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_feed_missing() {
        let db = test_db().await;
        assert!(db.get_feed(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_last_synced_at() {
        let db = test_db().await;
        let id = db.insert_feed(&test_feed(1)).await.unwrap();

        db.set_last_synced_at(id, 1_723_161_600).await.unwrap();

        let stored = db.get_feed(id).await.unwrap().unwrap();
        assert_eq!(stored.last_synced_at, Some(1_723_161_600));
    }

    #[tokio::test]
    async fn test_list_feeds_in_id_order() {
        let db = test_db().await;
        let a = db.insert_feed(&test_feed(3)).await.unwrap();
        let b = db.insert_feed(&test_feed(1)).await.unwrap();
        let c = db.insert_feed(&test_feed(2)).await.unwrap();

        let ids: Vec<i64> = db.list_feeds().await.unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_feed_is_idempotent() {
        let db = test_db().await;
        assert_eq!(db.delete_feed(99999).await.unwrap(), 0);
    }
}
