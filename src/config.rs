use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

/// Connection settings for the hosted Postgres instance.
#[derive(Debug, Clone, Args)]
pub struct DbConfig {
    /// Postgres endpoint, e.g. postgres://postgres@db.<project>.supabase.co:5432/postgres
    #[arg(long = "db-url", env = "SUPABASE_DB_URL", global = true, hide_env_values = true)]
    pub url: Option<String>,

    /// Database password for the endpoint above
    #[arg(
        long = "db-password",
        env = "SUPABASE_DB_PASSWORD",
        global = true,
        hide_env_values = true
    )]
    pub password: Option<String>,

    #[arg(long, default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, default_value_t = 10, global = true)]
    pub acquire_timeout_secs: u64,
}

impl DbConfig {
    /// Builds a lazily connecting pool, or `None` when not configured.
    pub fn pool(&self) -> anyhow::Result<Option<PgPool>> {
        let (Some(url), Some(password)) = (
            non_empty(self.url.as_deref()),
            non_empty(self.password.as_deref()),
        ) else {
            return Ok(None);
        };

        let options = PgConnectOptions::from_str(url)
            .context("SUPABASE_DB_URL is not a valid Postgres URL")?
            .password(password);

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .connect_lazy_with(options);

        Ok(Some(pool))
    }

    /// Like [`DbConfig::pool`] but fails when not configured.
    pub fn require_pool(&self) -> anyhow::Result<PgPool> {
        self.pool()?
            .context("SUPABASE_DB_URL and SUPABASE_DB_PASSWORD must both be set")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
