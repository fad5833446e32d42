//! Database connection pool, migrations, and health check.
//!
//! The Postgres-backed queue lives in [`pgmq`]; producer and consumer each
//! hold their own pool against the same database.

pub mod pgmq;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Queue timing for the pgmq backend.
#[derive(Debug, Clone, Copy)]
pub struct PgmqSettings {
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout: Duration,
    /// Window within which identical bodies are suppressed.
    pub dedup_window: Duration,
}

impl Default for PgmqSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            dedup_window: Duration::from_secs(300),
        }
    }
}

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
    settings: PgmqSettings,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            settings: PgmqSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: PgmqSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run all pending migrations (pgmq extension, dedup table).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
