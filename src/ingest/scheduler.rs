use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::config::ConfigError;
use crate::feed::FeedFetcher;
use crate::storage::Database;

use super::cycle::{run_cycle, CycleError, CycleReport};
use super::CancellationToken;

/// Drives ingestion: one cycle immediately, then one per interval, until
/// cancelled.
///
/// Exactly one feed is processed per tick, so the interval also paces how
/// often any single host is contacted. Cycles never overlap.
pub struct Scheduler {
    db: Database,
    fetcher: FeedFetcher,
    interval: Duration,
}

impl Scheduler {
    /// Rejects a zero interval before any work starts.
    pub fn new(db: Database, fetcher: FeedFetcher, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval(format!("{interval:?}")));
        }
        Ok(Self {
            db,
            fetcher,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single ingestion cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        run_cycle(&self.db, &self.fetcher, cancel).await
    }

    /// Tick until `cancel` fires. Returns the number of cycles started.
    ///
    /// Cycle failures are logged and the loop waits for the next tick. If a
    /// cycle overruns the interval the missed ticks are skipped rather than
    /// replayed.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = ?self.interval, "Collecting feeds");

        let mut cycles = 0u64;
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    cycles += 1;
                    match self.run_cycle(&cancel).await {
                        Ok(_) => {}
                        Err(e) if e.is_idle() => {
                            tracing::info!("No feeds registered, waiting for the next tick");
                        }
                        Err(_) if cancel.is_cancelled() => {
                            tracing::debug!("Cycle interrupted by shutdown");
                        }
                        Err(CycleError::Fetch { feed_id, url, source }) => {
                            tracing::warn!(
                                feed_id,
                                url = %url,
                                transient = source.is_transient(),
                                error = %source,
                                "Failed to fetch feed"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Ingestion cycle failed");
                        }
                    }
                }
            }
        }

        tracing::info!(cycles, "Scheduler stopped");
        cycles
    }
}
