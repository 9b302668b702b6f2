use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The gator database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The requested row does not exist (also: no feed registered to select)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A post with this URL was already ingested. Expected during normal polling.
    #[error("Post already exists: {url}")]
    DuplicatePost { url: String },

    /// A feed with this URL is already registered
    #[error("Feed already exists: {url}")]
    DuplicateFeed { url: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Whether the error came from a UNIQUE constraint.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Owner of feeds. Only the name is meaningful to the ingestion path.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

/// A registered feed.
///
/// `last_fetched_at` is `None` until the feed has been selected for polling
/// once. Timestamps are Unix microseconds, fine enough that feeds marked
/// in quick succession still rotate in order.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed row joined with its owner's name, for listing.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FeedSummary {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_name: String,
    pub last_fetched_at: Option<i64>,
}

/// A stored post. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

/// Insert payload for [`Database::create_post`](super::Database::create_post).
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<i64>,
}
