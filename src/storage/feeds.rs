use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedSummary};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Registration
    // ========================================================================

    /// Register a feed owned by `user_id`.
    ///
    /// Returns `DatabaseError::DuplicateFeed` if the URL is already registered.
    pub async fn insert_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = chrono::Utc::now().timestamp_micros();
        let result: Result<Feed, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(feed) => Ok(feed),
            Err(e) if DatabaseError::is_unique_violation(&e) => Err(DatabaseError::DuplicateFeed {
                url: url.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed, DatabaseError> {
        sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {feed_id}")))
    }

    /// All feeds with their owner's name, ordered by name.
    pub async fn list_feeds(&self) -> Result<Vec<FeedSummary>, DatabaseError> {
        let feeds = sqlx::query_as(
            r#"
                SELECT f.id, f.name, f.url, u.name AS user_name, f.last_fetched_at
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.name, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    // ========================================================================
    // Polling Rotation
    // ========================================================================

    /// The feed that has gone longest without being polled.
    ///
    /// Never-fetched feeds come before any fetched one; ties are broken by id.
    /// Returns `DatabaseError::NotFound` when no feeds are registered.
    pub async fn next_feed_to_fetch(&self) -> Result<Feed, DatabaseError> {
        sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, id
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("no feeds registered".to_string()))
    }

    /// Stamp `feed_id` as polled now. Called before the fetch, so a failing
    /// feed moves to the back of the rotation like any other.
    pub async fn mark_feed_fetched(&self, feed_id: i64) -> Result<(), DatabaseError> {
        self.mark_feed_fetched_at(feed_id, chrono::Utc::now().timestamp_micros())
            .await
    }

    /// Stamp `feed_id` as polled at `at` (Unix microseconds).
    ///
    /// The stored value never decreases, so a clock step backwards cannot
    /// reorder the rotation.
    pub async fn mark_feed_fetched_at(&self, feed_id: i64, at: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE feeds
             SET last_fetched_at = MAX(COALESCE(last_fetched_at, ?1), ?1),
                 updated_at = MAX(updated_at, ?1)
             WHERE id = ?2",
        )
        .bind(at)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed {feed_id}")));
        }
        Ok(())
    }
}
