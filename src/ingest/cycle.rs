use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::feed::{dates, markup, FeedFetcher, FetchError, RawItem};
use crate::storage::{Database, DatabaseError, Feed, NewPost};

use super::CancellationToken;

/// Why a cycle ended before any item was processed.
///
/// Item-level problems never show up here; they are logged and counted in
/// the [`CycleReport`].
#[derive(Debug, Error)]
pub enum CycleError {
    /// No feed could be selected (including "no feeds registered").
    #[error("Failed to select next feed: {0}")]
    Select(#[source] DatabaseError),

    #[error("Failed to mark feed {feed_id} as fetched: {source}")]
    MarkFetched {
        feed_id: i64,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to fetch feed {feed_id} ({url}): {source}")]
    Fetch {
        feed_id: i64,
        url: String,
        #[source]
        source: FetchError,
    },
}

impl CycleError {
    /// True when the store simply has nothing to poll yet.
    pub fn is_idle(&self) -> bool {
        matches!(self, CycleError::Select(DatabaseError::NotFound(_)))
    }
}

/// Outcome of one completed ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    /// Items in the fetched document.
    pub items: usize,
    /// New posts stored.
    pub created: usize,
    /// Items whose URL was already stored.
    pub duplicates: usize,
    /// Items skipped because of an empty link or a storage failure.
    pub failed: usize,
    /// Stored posts without a usable publication date.
    pub undated: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} items, {} new, {} already stored, {} failed, {} undated",
            self.feed_name, self.items, self.created, self.duplicates, self.failed, self.undated
        )
    }
}

/// An item with entities decoded and its publication date resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    /// The raw `pubDate` text when present but not in any known layout.
    pub unparsed_date: Option<String>,
}

/// Decode markup in every text field and parse the publication date.
///
/// Never fails: an unrecognized date leaves `published_at` empty and is
/// reported through `unparsed_date`.
pub fn normalize_item(raw: &RawItem) -> NormalizedItem {
    let pub_date = raw
        .pub_date
        .as_deref()
        .map(markup::unescape)
        .filter(|s| !s.trim().is_empty());

    let (published_at, unparsed_date) = match pub_date {
        None => (None, None),
        Some(text) => match dates::parse(&text) {
            Ok(at) => (Some(at), None),
            Err(_) => (None, Some(text.into_owned())),
        },
    };

    NormalizedItem {
        title: markup::unescape(&raw.title).into_owned(),
        url: markup::unescape(&raw.link).trim().to_string(),
        description: markup::unescape(&raw.description).into_owned(),
        published_at,
        unparsed_date,
    }
}

/// Run one ingestion cycle: select the stalest feed, mark it fetched, fetch
/// it, then normalize and store each item in document order.
///
/// The feed is marked before the fetch, so a failing feed is not retried
/// until it comes round again. Item failures are logged and counted; they
/// never stop the remaining items.
pub async fn run_cycle(
    db: &Database,
    fetcher: &FeedFetcher,
    cancel: &CancellationToken,
) -> Result<CycleReport, CycleError> {
    let feed = db.next_feed_to_fetch().await.map_err(CycleError::Select)?;

    db.mark_feed_fetched(feed.id)
        .await
        .map_err(|source| CycleError::MarkFetched {
            feed_id: feed.id,
            source,
        })?;

    tracing::info!(feed_id = feed.id, feed = %feed.name, url = %feed.url, "Fetching feed");

    let document = fetcher
        .fetch(&feed.url, cancel)
        .await
        .map_err(|source| CycleError::Fetch {
            feed_id: feed.id,
            url: feed.url.clone(),
            source,
        })?;

    tracing::debug!(
        feed_id = feed.id,
        channel_title = %markup::unescape(&document.title),
        channel_link = %markup::unescape(&document.link),
        channel_description = %markup::unescape(&document.description),
        "Decoded channel"
    );

    let mut report = CycleReport {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        items: document.items.len(),
        ..CycleReport::default()
    };

    for raw in &document.items {
        store_item(db, &feed, normalize_item(raw), &mut report).await;
    }

    tracing::info!(
        feed_id = report.feed_id,
        feed = %report.feed_name,
        items = report.items,
        created = report.created,
        duplicates = report.duplicates,
        failed = report.failed,
        undated = report.undated,
        "Ingestion cycle finished"
    );
    Ok(report)
}

async fn store_item(db: &Database, feed: &Feed, item: NormalizedItem, report: &mut CycleReport) {
    if item.url.is_empty() {
        tracing::warn!(feed_id = feed.id, title = %item.title, "Skipping item without a link");
        report.failed += 1;
        return;
    }

    match (&item.published_at, &item.unparsed_date) {
        (None, Some(raw)) => {
            tracing::warn!(feed_id = feed.id, url = %item.url, pub_date = %raw, "Unrecognized publication date, storing post undated");
        }
        (None, None) => {
            tracing::debug!(feed_id = feed.id, url = %item.url, "Item has no publication date");
        }
        _ => {}
    }

    let new_post = NewPost {
        feed_id: feed.id,
        title: item.title,
        description: item.description,
        url: item.url,
        published_at: item.published_at.map(|at| at.timestamp_micros()),
    };

    match db.create_post(&new_post).await {
        Ok(post) => {
            tracing::info!(feed_id = feed.id, post_id = post.id, url = %post.url, "Stored new post");
            report.created += 1;
            if post.published_at.is_none() {
                report.undated += 1;
            }
        }
        Err(DatabaseError::DuplicatePost { url }) => {
            tracing::debug!(feed_id = feed.id, url = %url, "Post already stored");
            report.duplicates += 1;
        }
        Err(e) => {
            tracing::warn!(feed_id = feed.id, url = %new_post.url, error = %e, "Failed to store post");
            report.failed += 1;
        }
    }
}
