//! SQLite-backed redemption code storage.
//!
//! One table keyed by wallet address. Codes are written with
//! `INSERT OR REPLACE` so re-submitting a wallet updates its code in place.

use std::path::Path;

use eyre::{Result, WrapErr};
use sqlx::{FromRow, SqlitePool};

/// A stored redemption code.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CodeRecord {
    pub wallet: String,
    pub code: String,
    pub updated_at: String,
}

#[derive(FromRow)]
struct CodeRow {
    wallet: String,
    code: String,
    updated_at: String,
}

/// Database wrapper for redemption codes.
#[derive(Clone)]
pub struct CodeStore {
    pool: SqlitePool,
}

impl CodeStore {
    /// Open or create the database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // SQLx requires the file to exist for SQLite.
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let url = format!("sqlite:{}", path.display());
        Self::connect(&url).await
    }

    /// Connect to an arbitrary SQLite URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .wrap_err("failed to open code database")?;

        // WAL + busy timeout to avoid SQLITE_BUSY under concurrent handlers.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS redemption_codes (
                wallet TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update the code for a wallet.
    pub async fn upsert_code(&self, wallet: &str, code: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO redemption_codes (wallet, code, updated_at)
             VALUES (?, ?, datetime('now'))",
        )
        .bind(wallet)
        .bind(code)
        .execute(&self.pool)
        .await
        .wrap_err("failed to upsert redemption code")?;

        crate::metrics::record_code_upsert();
        Ok(())
    }

    /// Look up the stored code for a wallet.
    pub async fn get_code(&self, wallet: &str) -> Result<Option<CodeRecord>> {
        let row: Option<CodeRow> = sqlx::query_as(
            "SELECT wallet, code, updated_at FROM redemption_codes WHERE wallet = ?",
        )
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("failed to query redemption code")?;

        Ok(row.map(|r| CodeRecord {
            wallet: r.wallet,
            code: r.code,
            updated_at: r.updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // File-backed stores: pooled in-memory SQLite connections do not share
    // a database.
    async fn store() -> (tempfile::TempDir, CodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeStore::open(&dir.path().join("codes.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn missing_wallet_returns_none() {
        let (_dir, store) = store().await;
        assert!(store.get_code("So1anaWa11et").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_then_lookup() {
        let (_dir, store) = store().await;
        store.upsert_code("So1anaWa11et", "CODE-123").await.unwrap();

        let record = store.get_code("So1anaWa11et").await.unwrap().unwrap();
        assert_eq!(record.wallet, "So1anaWa11et");
        assert_eq!(record.code, "CODE-123");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_code() {
        let (_dir, store) = store().await;
        store.upsert_code("wallet-a", "OLD").await.unwrap();
        store.upsert_code("wallet-a", "NEW").await.unwrap();

        let record = store.get_code("wallet-a").await.unwrap().unwrap();
        assert_eq!(record.code, "NEW");
    }

    #[tokio::test]
    async fn open_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("codes.db");

        let store = CodeStore::open(&path).await.unwrap();
        store.upsert_code("wallet-a", "AAA").await.unwrap();

        assert!(path.exists());
        assert_eq!(store.get_code("wallet-a").await.unwrap().unwrap().code, "AAA");
    }

    #[tokio::test]
    async fn wallets_are_independent() {
        let (_dir, store) = store().await;
        store.upsert_code("wallet-a", "AAA").await.unwrap();
        store.upsert_code("wallet-b", "BBB").await.unwrap();

        assert_eq!(store.get_code("wallet-a").await.unwrap().unwrap().code, "AAA");
        assert_eq!(store.get_code("wallet-b").await.unwrap().unwrap().code, "BBB");
    }
}
