use super::schema::Database;
use super::types::{DatabaseError, FeedItem, ItemUpsert, UpsertOutcome};

/// Maximum number of items returned from a single listing (OOM protection)
const MAX_ITEMS: i64 = 2000;

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Insert or refresh one item, keyed on `(feed_id, link)`.
    ///
    /// Two-phase write inside a single transaction: `INSERT OR IGNORE` creates
    /// the row if the key is new, otherwise an `UPDATE` refreshes title,
    /// description and date. `created_at` keeps its first-seen value.
    pub async fn upsert_item(
        &self,
        feed_id: i64,
        item: &ItemUpsert,
    ) -> Result<UpsertOutcome, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let description = item.description.as_deref().filter(|d| !d.is_empty());
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO feed_items (feed_id, title, link, description, published, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(feed_id)
        .bind(&item.title)
        .bind(&item.link)
        .bind(description)
        .bind(item.published)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let outcome = if inserted.rows_affected() > 0 {
            UpsertOutcome::Inserted
        } else {
            sqlx::query(
                r#"
                UPDATE feed_items SET title = ?, description = ?, published = ?
                WHERE feed_id = ? AND link = ?
            "#,
            )
            .bind(&item.title)
            .bind(description)
            .bind(item.published)
            .bind(feed_id)
            .bind(&item.link)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated
        };

        tx.commit().await?;
        Ok(outcome)
    }

    // ========================================================================
    // Item Queries
    // ========================================================================

    /// Items of one feed, newest publish date first.
    ///
    /// Undated items sort last; ties keep insertion order. Capped at
    /// `MAX_ITEMS`.
    pub async fn list_items_for_feed(&self, feed_id: i64) -> Result<Vec<FeedItem>, DatabaseError> {
        let items = sqlx::query_as::<_, FeedItem>(
            r#"
            SELECT id, feed_id, title, link, description, published, created_at
            FROM feed_items
            WHERE feed_id = ?
            ORDER BY published IS NULL, published DESC, id ASC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(MAX_ITEMS)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn count_items_for_feed(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_items WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Purge every item of a feed (the "reset" action). The definition and its
    /// last-synced timestamp stay.
    ///
    /// Returns the number of items deleted.
    pub async fn delete_items_for_feed(&self, feed_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_items WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, ItemUpsert, NewFeed, UpsertOutcome};
    use pretty_assertions::assert_eq;

    async fn test_db_with_feed() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let feed_id = db
            .insert_feed(&NewFeed {
                name: "Blog".to_string(),
                url: "https://example.com/blog".to_string(),
                item_selector: Some(".item".to_string()),
                title_selector: Some(".title".to_string()),
                link_selector: Some("a".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        (db, feed_id)
    }

    fn item(link: &str, title: &str, published: Option<i64>) -> ItemUpsert {
        ItemUpsert {
            link: link.to_string(),
            title: title.to_string(),
            description: Some(format!("<p>{}</p>", title)),
            published,
        }
    }

    #[tokio::test]
    async fn test_upsert_new_item_inserts() {
        let (db, feed_id) = test_db_with_feed().await;

        let outcome = db
            .upsert_item(feed_id, &item("https://example.com/a", "A", Some(1_703_462_400)))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Inserted);
        let items = db.list_items_for_feed(feed_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A");
        assert_eq!(items[0].description.as_deref(), Some("<p>A</p>"));
        assert_eq!(
            items[0].published_date(),
            chrono::NaiveDate::from_ymd_opt(2023, 12, 25)
        );
    }

    #[tokio::test]
    async fn test_upsert_same_link_updates_in_place() {
        let (db, feed_id) = test_db_with_feed().await;
        let link = "https://example.com/a";

        db.upsert_item(feed_id, &item(link, "Old title", None))
            .await
            .unwrap();
        let first = db.list_items_for_feed(feed_id).await.unwrap().remove(0);

        let outcome = db
            .upsert_item(feed_id, &item(link, "New title", Some(1_703_548_800)))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        let items = db.list_items_for_feed(feed_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, first.id);
        assert_eq!(items[0].title, "New title");
        assert_eq!(items[0].published, Some(1_703_548_800));
        assert_eq!(items[0].created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_same_link_in_different_feeds_is_two_items() {
        let (db, feed_a) = test_db_with_feed().await;
        let feed_b = db
            .insert_feed(&NewFeed {
                name: "Other".to_string(),
                url: "https://other.example.com/".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let shared = item("https://example.com/shared", "Shared", None);
        assert_eq!(db.upsert_item(feed_a, &shared).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(db.upsert_item(feed_b, &shared).await.unwrap(), UpsertOutcome::Inserted);

        assert_eq!(db.count_items_for_feed(feed_a).await.unwrap(), 1);
        assert_eq!(db.count_items_for_feed(feed_b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_description_stored_as_null() {
        let (db, feed_id) = test_db_with_feed().await;
        let mut entry = item("https://example.com/a", "A", None);
        entry.description = Some(String::new());

        db.upsert_item(feed_id, &entry).await.unwrap();

        let items = db.list_items_for_feed(feed_id).await.unwrap();
        assert_eq!(items[0].description, None);
    }

    #[tokio::test]
    async fn test_upsert_into_unknown_feed_fails() {
        let (db, _) = test_db_with_feed().await;
        let result = db.upsert_item(9999, &item("https://example.com/a", "A", None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_items_newest_first_undated_last() {
        let (db, feed_id) = test_db_with_feed().await;
        db.upsert_item(feed_id, &item("https://example.com/undated", "U", None))
            .await
            .unwrap();
        db.upsert_item(feed_id, &item("https://example.com/old", "Old", Some(1_000)))
            .await
            .unwrap();
        db.upsert_item(feed_id, &item("https://example.com/new", "New", Some(2_000)))
            .await
            .unwrap();

        let titles: Vec<String> = db
            .list_items_for_feed(feed_id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old", "U"]);
    }

    #[tokio::test]
    async fn test_delete_items_for_feed_keeps_definition() {
        let (db, feed_id) = test_db_with_feed().await;
        db.upsert_item(feed_id, &item("https://example.com/a", "A", None))
            .await
            .unwrap();
        db.upsert_item(feed_id, &item("https://example.com/b", "B", None))
            .await
            .unwrap();
        db.set_last_synced_at(feed_id, 1_700_000_000).await.unwrap();

        assert_eq!(db.delete_items_for_feed(feed_id).await.unwrap(), 2);

        assert_eq!(db.count_items_for_feed(feed_id).await.unwrap(), 0);
        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(feed.last_synced_at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_delete_feed_cascades_items() {
        let (db, feed_id) = test_db_with_feed().await;
        db.upsert_item(feed_id, &item("https://example.com/a", "A", None))
            .await
            .unwrap();

        assert_eq!(db.delete_feed(feed_id).await.unwrap(), 1);

        assert!(db.get_feed(feed_id).await.unwrap().is_none());
        let orphans: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_items")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(orphans.0, 0);
    }
}
