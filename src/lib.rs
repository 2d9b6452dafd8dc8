//! solcodes — redemption code backend with cached Solana program stats
//!
//! Two responsibilities:
//!
//! - Persist redemption codes keyed by wallet address in SQLite, exposed as
//!   thin CRUD endpoints.
//! - Keep a process-wide cached count of transactions against one fixed
//!   program-derived address, refreshed hourly from paginated
//!   `getSignaturesForAddress` calls to an upstream RPC provider.
//!
//! The cache is best-effort and single-instance: a failed refresh cycle
//! serves the last good snapshot, and `lastUpdated` is the only staleness
//! signal exposed to consumers.

pub mod cache;
pub mod config;
pub mod db;
pub mod indexer;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod stats;
