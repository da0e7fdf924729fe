use serde::Deserialize;
use std::time::Duration;

use crate::merge::MergeOptions;

/// Log filter used by the server and the CLI when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "rust_people_merge_api=debug,tower_http=debug";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub merge_lock_ttl_secs: u64,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a positive number"))
                .and_then(|n: u32| {
                    if n == 0 {
                        anyhow::bail!("DB_MAX_CONNECTIONS must be greater than 0");
                    }
                    Ok(n)
                })?,
            merge_lock_ttl_secs: std::env::var("MERGE_LOCK_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MERGE_LOCK_TTL_SECS must be a number of seconds"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("MERGE_LOCK_TTL_SECS must be greater than 0");
                    }
                    Ok(secs)
                })?,
            run_migrations: std::env::var("RUN_MIGRATIONS")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database URL: {}...", url_prefix(&config.database_url));
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!("Merge lock TTL: {}s", config.merge_lock_ttl_secs);

        Ok(config)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            lock_ttl: Duration::from_secs(self.merge_lock_ttl_secs),
        }
    }
}

/// First characters of the connection URL, safe to log.
fn url_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}
