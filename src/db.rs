use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::config::AppConfig;

/// Builds a lazily connecting pool, or `None` when the endpoint or the
/// credential is missing.
pub fn build_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let (Some(url), Some(password)) = (
        config.supabase_db_url.as_deref(),
        config.supabase_db_password.as_deref(),
    ) else {
        tracing::warn!(
            "SUPABASE_DB_URL or SUPABASE_DB_PASSWORD is not set; reads return empty data and writes fail"
        );
        return Ok(None);
    };

    let options = PgConnectOptions::from_str(url)?.password(password);
    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections.max(1))
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy_with(options);

    Ok(Some(pool))
}
