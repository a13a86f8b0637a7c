use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::StoreError;

/// Open the SQLite pool behind the experiment store.
///
/// File databases run in WAL mode so readers proceed while one writer holds
/// the lock; the busy timeout lets concurrent writers from different users
/// queue instead of failing. In-memory databases get exactly one connection
/// that is never recycled, since each connection would otherwise see its own
/// empty database.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parse database url {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    pool_options
        .connect_with(options)
        .await
        .context("connect to database")
}

pub async fn migrate(db: &SqlitePool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(db).await?;
    Ok(())
}

/// Fresh in-memory store with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let db = connect("sqlite::memory:", 1).await.expect("in-memory pool");
    migrate(&db).await.expect("migrations apply");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let db = test_pool().await;
        for table in ["users", "synthesis", "reaction", "results"] {
            let found: Option<(String,)> =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
                    .bind(table)
                    .fetch_optional(&db)
                    .await
                    .unwrap();
            assert!(found.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_pool().await;
        migrate(&db).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = test_pool().await;
        let err = sqlx::query(
            "INSERT INTO synthesis (user_id, date, name, memo, created_at)
             VALUES (999, '2024-01-01', 'x', '', '2024-01-01 00:00:00')",
        )
        .execute(&db)
        .await;
        assert!(err.is_err(), "dangling user_id must be rejected");
    }

    #[tokio::test]
    async fn file_database_is_created_on_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.db");
        let url = format!("sqlite://{}", path.display());
        let db = connect(&url, 2).await.unwrap();
        migrate(&db).await.unwrap();
        assert!(path.exists());
    }
}
