//! Transaction statistics types and aggregation.
//!
//! A refresh cycle fetches the full signature history for the program
//! address and reduces it to a [`StatsSnapshot`]: the total count plus the
//! count inside the trailing 24-hour window.

use serde::{Deserialize, Serialize};

/// Seconds in the trailing aggregation window.
pub const WINDOW_SECS: i64 = 86_400;

/// One transaction signature as returned by `getSignaturesForAddress`.
///
/// `block_time` is absent when the upstream has not indexed the slot yet.
/// Records are ephemeral: fetched fresh each cycle and discarded after
/// aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signature: String,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
}

/// Cached aggregate over the full signature history.
///
/// Exactly one snapshot is live at a time; each successful refresh cycle
/// replaces it wholesale. `last_updated` (milliseconds) is the only
/// staleness signal consumers get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_tx: u64,
    pub last_24h_tx: u64,
    pub last_updated: i64,
}

impl StatsSnapshot {
    /// Zero-valued placeholder used until the first cycle succeeds.
    pub fn zero() -> Self {
        Self {
            total_tx: 0,
            last_24h_tx: 0,
            last_updated: 0,
        }
    }
}

/// Reduce a fetched signature set to a snapshot, as of `now_ms`.
///
/// The 24-hour window is `[now_ms/1000 - 86400, ..)` in whole seconds.
/// Records missing `block_time` count toward the total but never toward the
/// window; a record with a future `block_time` still counts (no upper
/// bound is applied).
pub fn aggregate(records: &[SignatureRecord], now_ms: i64) -> StatsSnapshot {
    let window_start = now_ms / 1000 - WINDOW_SECS;
    let last_24h_tx = records
        .iter()
        .filter(|r| r.block_time.is_some_and(|t| t >= window_start))
        .count() as u64;

    StatsSnapshot {
        total_tx: records.len() as u64,
        last_24h_tx,
        last_updated: now_ms,
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
