//! gator: a personal RSS aggregator.
//!
//! The ingestion pipeline polls one feed per tick: [`storage`] picks the
//! least recently fetched feed, [`feed`] fetches and normalizes its items,
//! and [`ingest`] ties the steps together and stores new posts.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
