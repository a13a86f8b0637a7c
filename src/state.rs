use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db;
use crate::experiments::ResultPolicy;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config.database.url, config.database.max_connections).await?;
        Ok(Self::from_parts(db, config))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    pub fn result_policy(&self) -> ResultPolicy {
        ResultPolicy::from_config(self.config.allow_multiple_results_per_reaction)
    }

    #[cfg(test)]
    pub fn test_config(secret: &str, issuer: &str, audience: &str) -> AppConfig {
        AppConfig {
            database: crate::config::DatabaseConfig {
                url: "sqlite::memory:".into(),
                max_connections: 1,
            },
            jwt: crate::config::JwtConfig {
                secret: secret.into(),
                issuer: issuer.into(),
                audience: audience.into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            allow_multiple_results_per_reaction: false,
            upload: crate::config::UploadConfig::default(),
        }
    }

    /// State with a lazily connecting pool, for tests that never touch the database.
    #[cfg(test)]
    pub fn fake_with_jwt(secret: &str, issuer: &str, audience: &str) -> Self {
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .expect("lazy pool ok");
        Self::from_parts(db, Arc::new(Self::test_config(secret, issuer, audience)))
    }

    /// State over a migrated in-memory database.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let db = db::test_pool().await;
        Self::from_parts(db, Arc::new(Self::test_config("test", "test", "test")))
    }
}
