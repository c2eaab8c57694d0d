//! Postgres query runner.
//!
//! [`PgQueryRunner`] executes resolver queries in each user's database. The
//! connection URL is derived per user from the configured URL template and
//! every user gets one lazily connected pool, created on first use and kept
//! for the lifetime of the runner. Reconnection and connection limits are
//! the pool's business.
//!
//! Only compiled with the `database` feature.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::{MapsError, Result};
use crate::sql::{QueryRunner, Row};

/// [`QueryRunner`] over per-user `sqlx` Postgres pools.
pub struct PgQueryRunner {
    config: DatabaseConfig,
    pools: DashMap<String, PgPool>,
}

impl std::fmt::Debug for PgQueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgQueryRunner")
            .field("config", &self.config)
            .field("pools", &self.pools.len())
            .finish()
    }
}

impl PgQueryRunner {
    /// Create a runner. No connection is made until the first query.
    ///
    /// # Errors
    ///
    /// [`MapsError::Config`] when no `url_template` is configured.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        if config.url_template.is_none() {
            return Err(MapsError::Config {
                message: "database.url_template is not set".to_string(),
            });
        }
        Ok(Self {
            config,
            pools: DashMap::new(),
        })
    }

    fn pool_for(&self, user: &str) -> Result<PgPool> {
        if let Some(pool) = self.pools.get(user) {
            return Ok(pool.clone());
        }

        let url = self.config.url_for(user).ok_or_else(|| MapsError::Config {
            message: "database.url_template is not set".to_string(),
        })?;
        let pool = self
            .pools
            .entry(user.to_string())
            .or_try_insert_with(|| {
                info!("Creating connection pool for {}", mask_database_url(&url));
                PgPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .acquire_timeout(self.config.acquire_timeout())
                    .connect_lazy(&url)
                    .map_err(|e| MapsError::Config {
                        message: format!("invalid database url for user '{user}': {e}"),
                    })
            })?
            .clone();
        Ok(pool)
    }
}

#[async_trait]
impl QueryRunner for PgQueryRunner {
    async fn run(&self, user: &str, query: &str) -> Result<Vec<Row>> {
        let pool = self.pool_for(user)?;
        debug!(user, "Running query");

        let rows = sqlx::query(query)
            .fetch_all(&pool)
            .await
            .map_err(|e| MapsError::collaborator("database", database_message(&e)))?;

        rows.iter().map(text_row).collect()
    }
}

/// Convert a row whose columns are all text (or NULL).
fn text_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let value: Option<String> = row
                .try_get(column.ordinal())
                .map_err(|e| MapsError::collaborator("database", e))?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

/// Prefer the server's own message over sqlx's wrapper text.
fn database_message(error: &sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

/// Mask the password in a database URL for logging.
fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return "***".to_string();
    };
    let rest = &url[scheme_end..];
    let Some(at) = rest.rfind('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!("{}{}:***{}", &url[..scheme_end], &rest[..colon], &rest[at..]),
        None => url.to_string(),
    }
}
