use super::schema::Database;
use super::types::{DatabaseError, NewPost, Post};

const POST_COLUMNS: &str = "id, feed_id, title, description, url, published_at, created_at";

impl Database {
    /// Insert a post.
    ///
    /// A post URL that already exists (in any feed) is reported as
    /// `DatabaseError::DuplicatePost`, which callers treat as "already
    /// ingested" rather than as a failure.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let now = chrono::Utc::now().timestamp_micros();
        let result: Result<Post, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO posts (feed_id, title, description, url, published_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {POST_COLUMNS}"
        ))
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.url)
        .bind(post.published_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(e) if DatabaseError::is_unique_violation(&e) => Err(DatabaseError::DuplicatePost {
                url: post.url.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Posts of one feed in insertion order.
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ? ORDER BY id"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Most recent posts across the feeds owned by `user_id`.
    ///
    /// Newest `published_at` first; undated posts sort last.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as(
            r#"
                SELECT p.id, p.feed_id, p.title, p.description, p.url, p.published_at, p.created_at
                FROM posts p
                JOIN feeds f ON f.id = p.feed_id
                WHERE f.user_id = ?
                ORDER BY p.published_at IS NULL, p.published_at DESC, p.id DESC
                LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.ensure_user("gator").await.unwrap();
        let feed = db
            .insert_feed("Example", "https://example.com/rss", user.id)
            .await
            .unwrap();
        (db, user.id, feed.id)
    }

    fn new_post(feed_id: i64, url: &str, published_at: Option<i64>) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Title of {url}"),
            description: "desc".to_string(),
            url: url.to_string(),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_create_post() {
        let (db, _, feed_id) = test_db().await;
        let post = db
            .create_post(&new_post(feed_id, "https://example.com/1", Some(1_700_000_000)))
            .await
            .unwrap();
        assert_eq!(post.feed_id, feed_id);
        assert_eq!(post.url, "https://example.com/1");
        assert_eq!(post.published_at, Some(1_700_000_000));
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_url_is_distinct_error() {
        let (db, _, feed_id) = test_db().await;
        db.create_post(&new_post(feed_id, "https://example.com/1", None))
            .await
            .unwrap();

        let err = db
            .create_post(&new_post(feed_id, "https://example.com/1", None))
            .await
            .unwrap_err();
        match err {
            DatabaseError::DuplicatePost { url } => assert_eq!(url, "https://example.com/1"),
            e => panic!("Expected DuplicatePost, got {e:?}"),
        }
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_scope_is_global() {
        let (db, user_id, feed_id) = test_db().await;
        let other = db
            .insert_feed("Mirror", "https://mirror.example/rss", user_id)
            .await
            .unwrap();

        db.create_post(&new_post(feed_id, "https://example.com/shared", None))
            .await
            .unwrap();
        let err = db
            .create_post(&new_post(other.id, "https://example.com/shared", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicatePost { .. }));
    }

    #[tokio::test]
    async fn test_unknown_feed_is_other_error() {
        let (db, _, _) = test_db().await;
        let err = db
            .create_post(&new_post(999, "https://example.com/1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Other(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_posts_for_user_ordering() {
        let (db, user_id, feed_id) = test_db().await;
        db.create_post(&new_post(feed_id, "https://example.com/old", Some(100)))
            .await
            .unwrap();
        db.create_post(&new_post(feed_id, "https://example.com/undated", None))
            .await
            .unwrap();
        db.create_post(&new_post(feed_id, "https://example.com/new", Some(200)))
            .await
            .unwrap();

        let posts = db.get_posts_for_user(user_id, 10).await.unwrap();
        let urls: Vec<&str> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/new",
                "https://example.com/old",
                "https://example.com/undated"
            ]
        );

        let limited = db.get_posts_for_user(user_id, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_posts_for_user_excludes_other_users() {
        let (db, user_id, feed_id) = test_db().await;
        let other_user = db.ensure_user("lane").await.unwrap();
        let other_feed = db
            .insert_feed("Other", "https://other.example/rss", other_user.id)
            .await
            .unwrap();

        db.create_post(&new_post(feed_id, "https://example.com/mine", Some(1)))
            .await
            .unwrap();
        db.create_post(&new_post(other_feed.id, "https://other.example/theirs", Some(2)))
            .await
            .unwrap();

        let posts = db.get_posts_for_user(user_id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://example.com/mine");
        assert_eq!(db.get_posts_for_feed(other_feed.id).await.unwrap().len(), 1);
    }
}
