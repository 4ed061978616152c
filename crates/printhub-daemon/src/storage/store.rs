//! Namespaced key-value store over SQLite.
//!
//! The store carries everything the hub must remember across reboots. A
//! schema-version bump erases all namespaces and reinitializes, returning
//! the hub to the unprovisioned state.

use std::path::Path;
use std::time::Duration;

use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use printhub_core::db::{open_pool, open_pool_in_memory, StoreError};

/// Current on-disk schema version. Bumping this wipes stored data on the
/// next open.
const SCHEMA_VERSION: i64 = 1;

/// How many times `open` retries pool creation.
const OPEN_ATTEMPTS: u32 = 3;

/// Delay between open attempts.
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Handle to the persistent store. Cheap to clone.
#[derive(Clone)]
pub struct ConfigStore {
    pool: Pool<Sqlite>,
}

impl ConfigStore {
    /// Open (or create) the store at the given path. Pool creation is
    /// retried up to 3 times with a 100 ms delay.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let mut last_err = None;
        for attempt in 0..OPEN_ATTEMPTS {
            match open_pool(path).await {
                Ok(pool) => {
                    init_schema(&pool).await?;
                    return Ok(Self { pool });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Config store open failed");
                    last_err = Some(e);
                    tokio::time::sleep(OPEN_RETRY_DELAY).await;
                }
            }
        }
        Err(last_err.expect("at least one open attempt"))
    }

    /// Open an in-memory store (for testing).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = open_pool_in_memory().await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Scoped handle for one namespace.
    pub fn namespace(&self, ns: &str) -> Namespace {
        Namespace {
            pool: self.pool.clone(),
            ns: ns.to_string(),
        }
    }
}

/// Create tables and enforce the schema version. A mismatch erases every
/// namespace and reinitializes.
async fn init_schema(pool: &Pool<Sqlite>) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            schema_version INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS kv (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        )",
    )
    .execute(pool)
    .await?;

    let stored: Option<(i64,)> = sqlx::query_as("SELECT schema_version FROM meta WHERE id = 0")
        .fetch_optional(pool)
        .await?;

    match stored {
        None => {
            sqlx::query("INSERT INTO meta (id, schema_version) VALUES (0, ?)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await?;
        }
        Some((version,)) if version != SCHEMA_VERSION => {
            warn!(
                stored = version,
                current = SCHEMA_VERSION,
                "Schema version changed, erasing stored configuration"
            );
            sqlx::query("DELETE FROM kv").execute(pool).await?;
            sqlx::query("UPDATE meta SET schema_version = ? WHERE id = 0")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await?;
            info!("Config store reinitialized, hub is unprovisioned");
        }
        Some(_) => {}
    }

    Ok(())
}

/// Typed accessors scoped to one namespace. Reads return the caller's
/// default when the key is absent; writes are retried once before the error
/// is surfaced.
#[derive(Clone)]
pub struct Namespace {
    pool: Pool<Sqlite>,
    ns: String,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.ns
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv WHERE namespace = ? AND key = ?")
                .bind(&self.ns)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn put_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut last_err = None;
        for attempt in 0..2 {
            let result = sqlx::query(
                "INSERT INTO kv (namespace, key, value) VALUES (?, ?, ?)
                 ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value",
            )
            .bind(&self.ns)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await;
            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(namespace = %self.ns, key, attempt, error = %e, "Store write failed");
                    last_err = Some(e.into());
                }
            }
        }
        Err(last_err.expect("write attempted"))
    }

    pub async fn get_string(&self, key: &str, default: &str) -> Result<String, StoreError> {
        Ok(self.get_raw(key).await?.unwrap_or_else(|| default.to_string()))
    }

    pub async fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put_raw(key, value).await
    }

    pub async fn get_i64(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        Ok(self
            .get_raw(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    pub async fn put_i64(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put_raw(key, &value.to_string()).await
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        Ok(self
            .get_raw(key)
            .await?
            .map(|v| v == "1")
            .unwrap_or(default))
    }

    pub async fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put_raw(key, if value { "1" } else { "0" }).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE namespace = ? AND key = ?")
            .bind(&self.ns)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every key in this namespace.
    pub async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE namespace = ?")
            .bind(&self.ns)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_round_trip_and_default() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let ns = store.namespace("hub_config");

        assert_eq!(ns.get_string("hub_id", "").await.unwrap(), "");
        ns.put_string("hub_id", "HUB-AABBCC112233").await.unwrap();
        assert_eq!(
            ns.get_string("hub_id", "").await.unwrap(),
            "HUB-AABBCC112233"
        );
    }

    #[tokio::test]
    async fn bool_and_int_round_trip() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let ns = store.namespace("tunnel");

        assert!(!ns.get_bool("registered", false).await.unwrap());
        ns.put_bool("registered", true).await.unwrap();
        assert!(ns.get_bool("registered", false).await.unwrap());

        assert_eq!(ns.get_i64("port", 8883).await.unwrap(), 8883);
        ns.put_i64("port", 1883).await.unwrap();
        assert_eq!(ns.get_i64("port", 8883).await.unwrap(), 1883);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let a = store.namespace("printer0");
        let b = store.namespace("printer1");

        a.put_string("serial", "S1").await.unwrap();
        assert_eq!(b.get_string("serial", "").await.unwrap(), "");
    }

    #[tokio::test]
    async fn clear_only_touches_own_namespace() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let a = store.namespace("printer0");
        let b = store.namespace("printer1");

        a.put_string("serial", "S1").await.unwrap();
        b.put_string("serial", "S2").await.unwrap();
        a.clear().await.unwrap();

        assert_eq!(a.get_string("serial", "").await.unwrap(), "");
        assert_eq!(b.get_string("serial", "").await.unwrap(), "S2");
    }

    #[tokio::test]
    async fn remove_deletes_single_key() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let ns = store.namespace("tunnel");
        ns.put_string("claim_token", "ct").await.unwrap();
        ns.put_string("tenant_id", "t-1").await.unwrap();
        ns.remove("claim_token").await.unwrap();
        assert_eq!(ns.get_string("claim_token", "").await.unwrap(), "");
        assert_eq!(ns.get_string("tenant_id", "").await.unwrap(), "t-1");
    }
}
