//! SQLite-backed [`KvStore`] implementation.
//!
//! Every namespace lives in the `kv` table as one row per key with a JSON
//! text value. `save` replaces a whole namespace inside one transaction, so
//! a reader never observes a half-written cache tier.

use async_trait::async_trait;
use handbook_assistant_core::error::StoreError;
use handbook_assistant_core::store::{KvStore, Namespace};
use sqlx::{Row, SqlitePool};

/// SQLite implementation of the [`KvStore`] trait.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Distinct namespaces with at least one row.
    pub async fn namespaces(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT namespace, COUNT(*) AS n FROM kv GROUP BY namespace ORDER BY namespace",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| load_error("*", e))?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("namespace"), row.get::<i64, _>("n")))
            .collect())
    }
}

fn load_error(namespace: &str, e: sqlx::Error) -> StoreError {
    StoreError::Load {
        namespace: namespace.to_string(),
        reason: e.to_string(),
    }
}

fn save_error(namespace: &str, e: sqlx::Error) -> StoreError {
    StoreError::Save {
        namespace: namespace.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn load(&self, namespace: &str) -> Result<Namespace, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM kv WHERE namespace = ?")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| load_error(namespace, e))?;

        let mut entries = Namespace::new();
        for row in rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            entries.insert(key, serde_json::from_str(&value)?);
        }
        Ok(entries)
    }

    async fn save(&self, namespace: &str, entries: &Namespace) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| save_error(namespace, e))?;

        sqlx::query("DELETE FROM kv WHERE namespace = ?")
            .bind(namespace)
            .execute(&mut *tx)
            .await
            .map_err(|e| save_error(namespace, e))?;

        for (key, value) in entries {
            let text = serde_json::to_string(value)?;
            sqlx::query("INSERT INTO kv (namespace, key, value, updated_at) VALUES (?, ?, ?, ?)")
                .bind(namespace)
                .bind(key)
                .bind(&text)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| save_error(namespace, e))?;
        }

        tx.commit().await.map_err(|e| save_error(namespace, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteKvStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteKvStore::new(pool)
    }

    #[tokio::test]
    async fn test_missing_namespace_loads_empty() {
        let store = store().await;
        assert!(store.load("cache_exact").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_namespace() {
        let store = store().await;
        let mut first = Namespace::new();
        first.insert("a".into(), json!({"response": "one"}));
        first.insert("b".into(), json!(2));
        store.save("cache_exact", &first).await.unwrap();

        let mut second = Namespace::new();
        second.insert("c".into(), json!("three"));
        store.save("cache_exact", &second).await.unwrap();

        let loaded = store.load("cache_exact").await.unwrap();
        assert_eq!(loaded, second);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = store().await;
        let mut entries = Namespace::new();
        entries.insert("k".into(), json!(true));
        store.save("metrics", &entries).await.unwrap();
        store.save("sessions", &entries).await.unwrap();
        store.save("sessions", &Namespace::new()).await.unwrap();

        assert_eq!(store.load("metrics").await.unwrap(), entries);
        assert!(store.load("sessions").await.unwrap().is_empty());
        assert_eq!(store.namespaces().await.unwrap(), vec![("metrics".to_string(), 1)]);
    }
}
