//! Connection pool construction.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::{DbError, DbResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool size scaled to the machine, with a floor for small hosts.
pub fn default_max_connections() -> u32 {
    (4 * num_cpus::get() as u32).max(10)
}

/// Build and verify the shared connection pool.
///
/// The startup ping must succeed before the service accepts any work, so
/// a misconfigured database fails fast instead of on the first request.
pub async fn connect_pool(database_url: &str) -> DbResult<PgPool> {
    let max_connections = default_max_connections();

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .max_lifetime(Duration::from_secs(15 * 60))
        .idle_timeout(Duration::from_secs(5 * 60))
        .acquire_timeout(CONNECT_TIMEOUT)
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    tokio::time::timeout(CONNECT_TIMEOUT, sqlx::query("SELECT 1").execute(&pool))
        .await
        .map_err(|_| {
            DbError::Database(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "database verification timeout",
            )))
        })??;

    info!(max_connections, "database pool created and verified");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_connections_has_a_floor_of_ten() {
        assert!(default_max_connections() >= 10);
    }
}
