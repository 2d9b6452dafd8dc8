//! Periodic refresh of the stats cache.
//!
//! One cycle = fetch all signature pages, aggregate, store the new snapshot.
//! The scheduler runs a cycle once at startup and then on a fixed interval.
//! A failed cycle leaves the previous snapshot untouched (stale but
//! available); an in-flight guard keeps cycles from overlapping if one runs
//! longer than the interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;

use crate::cache::StatsCache;
use crate::indexer::HeliusIndexer;
use crate::stats::{self, StatsSnapshot};

/// Default period between refresh cycles.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3_600;

/// Run one complete refresh cycle and store the result on success.
///
/// On failure the cache keeps its previous snapshot; the error propagates to
/// the caller for logging/metrics only and is never surfaced to readers.
pub async fn refresh_cycle(
    indexer: &HeliusIndexer,
    cache: &StatsCache,
    address: &str,
) -> Result<StatsSnapshot> {
    let started = Instant::now();
    let records = match indexer.fetch_all_signatures(address).await {
        Ok(records) => records,
        Err(e) => {
            crate::metrics::record_refresh_cycle(false, started.elapsed().as_millis() as u64);
            return Err(e);
        }
    };
    let snapshot = stats::aggregate(&records, stats::now_ms());
    cache.store(snapshot.clone());

    crate::metrics::record_refresh_cycle(true, started.elapsed().as_millis() as u64);
    tracing::info!(
        total_tx = snapshot.total_tx,
        last_24h_tx = snapshot.last_24h_tx,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "refresh cycle complete"
    );
    Ok(snapshot)
}

/// Spawn the repeating refresh task.
///
/// Callers are expected to have already run one cycle synchronously at
/// startup; the first tick fires after a full period. Ticks that land while
/// a cycle is still in flight are skipped rather than racing to replace the
/// cache.
pub fn spawn_refresh_task(
    indexer: Arc<HeliusIndexer>,
    cache: StatsCache,
    address: String,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    let in_flight = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; consume the first tick since the
        // startup cycle already ran.
        timer.tick().await;

        loop {
            timer.tick().await;

            if in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::warn!("previous refresh cycle still running, skipping tick");
                continue;
            }

            let indexer = Arc::clone(&indexer);
            let cache = cache.clone();
            let address = address.clone();
            let guard = InFlightGuard(Arc::clone(&in_flight));

            tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = refresh_cycle(&indexer, &cache, &address).await {
                    tracing::warn!(error = %e, "refresh cycle failed, serving stale snapshot");
                }
            });
        }
    })
}

/// Clears the in-flight flag when the cycle task finishes, panics included.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_flight_flag_clears_when_cycle_task_panics() {
        let flag = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn({
            let guard = InFlightGuard(Arc::clone(&flag));
            async move {
                let _guard = guard;
                panic!("cycle blew up");
            }
        });

        assert!(handle.await.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn in_flight_flag_clears_after_normal_completion() {
        let flag = Arc::new(AtomicBool::new(true));
        {
            let _guard = InFlightGuard(Arc::clone(&flag));
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
