use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};
use tracing::warn;

/// Fixed storage keys. Whole-value JSON, one row per key.
pub const USER_KEY: &str = "cf_user";
pub const CONNECT_PROFILES_KEY: &str = "cf_connect_profiles";

/// Key/value store of whole-value JSON documents. This is the persistence
/// layer for the session user and the user-added directory profiles; a
/// missing, corrupt, or old-shaped value always reads back as `None`, never
/// as an error.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Read and deserialize the value under `key`. An absent row, a value
    /// that is not valid JSON, or JSON of the wrong shape all read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read from store")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.try_get("value")?;
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Discarding malformed value under key '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    /// Serialize `value` and write it under `key`, replacing any prior value.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).context("Failed to serialize value")?;

        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await
        .context("Failed to write to store")?;

        Ok(())
    }

    /// Delete the value under `key`, if any.
    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to delete from store")?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn put_raw(&self, key: &str, raw: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    async fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).await.unwrap();
        store.init().await.unwrap();
        (dir, store)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn round_trips_whole_values() {
        let (_dir, store) = open_store().await;

        let doc = Doc {
            name: "kate".into(),
            count: 3,
        };
        store.set("doc", &doc).await.unwrap();

        let back: Option<Doc> = store.get("doc").await.unwrap();
        assert_eq!(back, Some(doc));
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let (_dir, store) = open_store().await;
        let back: Option<Doc> = store.get("nope").await.unwrap();
        assert!(back.is_none());
    }

    #[tokio::test]
    async fn corrupt_value_reads_as_none() {
        let (_dir, store) = open_store().await;
        store.put_raw("doc", "{not json at all").await.unwrap();

        let back: Option<Doc> = store.get("doc").await.unwrap();
        assert!(back.is_none());
    }

    #[tokio::test]
    async fn wrong_shape_reads_as_none() {
        let (_dir, store) = open_store().await;
        store.put_raw("doc", r#"["a","list"]"#).await.unwrap();

        let back: Option<Doc> = store.get("doc").await.unwrap();
        assert!(back.is_none());
    }

    #[tokio::test]
    async fn remove_clears_the_key() {
        let (_dir, store) = open_store().await;
        let doc = Doc {
            name: "kate".into(),
            count: 1,
        };
        store.set("doc", &doc).await.unwrap();
        store.remove("doc").await.unwrap();

        let back: Option<Doc> = store.get("doc").await.unwrap();
        assert!(back.is_none());
    }
}
