//! Configuration for solcodes.
//!
//! Loads optional TOML from `~/.config/solcodes/config.toml`, then applies
//! process environment overrides. The upstream API key and program address
//! are deployment-fixed and normally come from the environment.

use serde::Deserialize;

/// Helius mainnet RPC base; the API key is appended as a query parameter.
const DEFAULT_RPC_BASE: &str = "https://mainnet.helius-rpc.com";

/// Application configuration.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Upstream provider API key.
    pub helius_api_key: Option<String>,
    /// Program-derived address whose transaction history is counted.
    pub program_address: Option<String>,
    /// Full RPC URL override (takes precedence over the key-derived URL).
    pub rpc_url: Option<String>,
    /// Server bind address (e.g., "127.0.0.1:8080").
    pub bind: Option<String>,
    /// Path to the SQLite code database.
    pub database_path: Option<String>,
    /// Seconds between refresh cycles.
    pub refresh_interval_secs: Option<u64>,
    /// Rate limit in requests per minute per IP (0 = no limit).
    pub rate_limit_rpm: Option<u32>,
    /// Allowed CORS origins (None/empty = allow any).
    pub allowed_origins: Option<Vec<String>>,
    /// API keys for the code endpoints (None/empty = no auth).
    pub api_keys: Option<Vec<String>>,
}

impl Config {
    /// Load config from the default path and environment.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env();
        config
    }

    fn load_file() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_default()
            .join("solcodes")
            .join("config.toml");
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
                Self::default()
            }
        }
    }

    /// Environment variables override file values.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("HELIUS_API_KEY") {
            self.helius_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("PROGRAM_ADDRESS") {
            self.program_address = Some(v);
        }
        if let Ok(v) = std::env::var("RPC_URL") {
            self.rpc_url = Some(v);
        }
        if let Ok(v) = std::env::var("BIND") {
            self.bind = Some(v);
        }
        if let Ok(v) = std::env::var("DATABASE_PATH") {
            self.database_path = Some(v);
        }
        if let Ok(v) = std::env::var("REFRESH_INTERVAL_SECS") {
            match v.parse() {
                Ok(secs) => self.refresh_interval_secs = Some(secs),
                Err(_) => tracing::warn!(value = %v, "invalid REFRESH_INTERVAL_SECS, ignoring"),
            }
        }
    }

    /// Resolve the upstream RPC URL from the explicit override or the
    /// Helius API key.
    pub fn resolved_rpc_url(&self) -> Option<String> {
        if let Some(url) = &self.rpc_url {
            return Some(url.clone());
        }
        self.helius_api_key
            .as_ref()
            .map(|key| format!("{}/?api-key={}", DEFAULT_RPC_BASE, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_url_override_wins() {
        let config = Config {
            rpc_url: Some("http://127.0.0.1:9000".into()),
            helius_api_key: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_rpc_url().as_deref(),
            Some("http://127.0.0.1:9000")
        );
    }

    #[test]
    fn rpc_url_derived_from_api_key() {
        let config = Config {
            helius_api_key: Some("k3y".into()),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_rpc_url().as_deref(),
            Some("https://mainnet.helius-rpc.com/?api-key=k3y")
        );
    }

    #[test]
    fn no_key_no_url() {
        assert!(Config::default().resolved_rpc_url().is_none());
    }
}
