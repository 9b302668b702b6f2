//! Feed retrieval and normalization.
//!
//! - [`fetcher`] - one cancellable HTTP GET per call, decoded into a [`RawFeed`]
//! - [`parser`] - event-based decoding of the RSS 2.0 subset we consume
//! - [`markup`] - HTML entity decoding for text fields
//! - [`dates`] - ordered multi-layout parsing of publication dates
//!
//! Nothing here touches the database; see [`crate::ingest`] for how the
//! pieces are combined into an ingestion cycle.

pub mod dates;
mod fetcher;
pub mod markup;
mod parser;

pub use dates::DateParseError;
pub use fetcher::{
    FeedFetcher, FetchError, DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use parser::{parse_rss, DecodeError, RawFeed, RawItem};
