//! Upstream signature fetcher.
//!
//! Raw JSON-RPC calls against a Helius-style Solana RPC endpoint to pull the
//! full signature history for the program address, 100 records per page,
//! following `before` cursors until a partial page.

use std::time::Instant;

use eyre::{Result, WrapErr};

use crate::stats::SignatureRecord;

/// Upstream page size. A full page means more records may exist; a partial
/// page terminates pagination. This is a heuristic policy, not an upstream
/// exhaustion guarantee.
pub const PAGE_SIZE: usize = 100;

/// Per-request timeout on upstream calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// JSON-RPC client for the upstream signature provider.
pub struct HeliusIndexer {
    rpc_url: String,
    client: reqwest::Client,
}

impl HeliusIndexer {
    /// Create a new indexer against the given RPC URL (API key included in
    /// the URL query string, Helius-style).
    pub fn new(rpc_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            rpc_url: rpc_url.to_string(),
            client,
        }
    }

    /// Current slot height. Used by the health endpoint as a connectivity
    /// probe.
    pub async fn current_slot(&self) -> Result<u64> {
        let resp = self.rpc_call("getSlot", serde_json::json!([])).await?;
        resp.as_u64()
            .ok_or_else(|| eyre::eyre!("invalid getSlot response: {}", resp))
    }

    /// Fetch one page of signatures for `address`, optionally starting after
    /// the `before` cursor.
    ///
    /// A missing or non-array `result` field is treated as an empty page,
    /// not an error; a JSON-RPC `error` member or transport failure aborts.
    pub async fn signatures_page(
        &self,
        address: &str,
        before: Option<&str>,
    ) -> Result<Vec<SignatureRecord>> {
        let mut opts = serde_json::json!({ "limit": PAGE_SIZE });
        if let Some(cursor) = before {
            opts["before"] = serde_json::Value::String(cursor.to_string());
        }

        let result = self
            .rpc_call("getSignaturesForAddress", serde_json::json!([address, opts]))
            .await?;

        match result {
            serde_json::Value::Array(entries) => entries
                .into_iter()
                .map(|v| {
                    serde_json::from_value(v).wrap_err("malformed signature entry in response")
                })
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Fetch the complete signature history for `address`, most-recent-first.
    ///
    /// Issues sequential paged requests until a page comes back with fewer
    /// than [`PAGE_SIZE`] records. There is no depth limit; a pathologically
    /// active address means many sequential requests. Any page failure
    /// aborts the whole fetch.
    pub async fn fetch_all_signatures(&self, address: &str) -> Result<Vec<SignatureRecord>> {
        let mut all: Vec<SignatureRecord> = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let page = self.signatures_page(address, before.as_deref()).await?;
            let page_len = page.len();
            all.extend(page);

            if page_len < PAGE_SIZE {
                break;
            }
            // Cursor is the last signature of the page just fetched.
            before = all.last().map(|r| r.signature.clone());
        }

        tracing::debug!(address, total = all.len(), "fetched signature history");
        Ok(all)
    }

    /// Make a JSON-RPC call and unwrap the `result` member.
    ///
    /// A missing `result` surfaces as `Value::Null`; callers decide whether
    /// that is tolerable.
    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let started = Instant::now();
        let outcome: Result<serde_json::Value> = async {
            let resp = self
                .client
                .post(&self.rpc_url)
                .json(&body)
                .send()
                .await
                .wrap_err("RPC request failed")?;

            let json: serde_json::Value =
                resp.json().await.wrap_err("failed to parse RPC response")?;

            if let Some(error) = json.get("error") {
                eyre::bail!("RPC error from {}: {}", method, error);
            }

            Ok(json.get("result").cloned().unwrap_or(serde_json::Value::Null))
        }
        .await;

        crate::metrics::record_rpc_call(
            method,
            outcome.is_ok(),
            started.elapsed().as_millis() as u64,
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_policy_constant() {
        // Pagination terminates on the first page shorter than this.
        assert_eq!(PAGE_SIZE, 100);
    }

    #[test]
    fn signature_entry_parses_with_extra_fields() {
        let entry = serde_json::json!({
            "signature": "3GJjBzXU",
            "slot": 289_113_004,
            "err": null,
            "blockTime": 1_700_000_000
        });
        let record: SignatureRecord = serde_json::from_value(entry).unwrap();
        assert_eq!(record.signature, "3GJjBzXU");
        assert_eq!(record.block_time, Some(1_700_000_000));
    }

    #[test]
    fn entry_without_block_time_parses() {
        let entry = serde_json::json!({ "signature": "9xYz", "slot": 1 });
        let record: SignatureRecord = serde_json::from_value(entry).unwrap();
        assert_eq!(record.block_time, None);
    }
}
