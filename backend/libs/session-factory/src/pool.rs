//! Connection pool creation and verification

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{SessionError, SessionResult};
use crate::settings::{ConnectionSettings, Settings};

/// Parse the connection URL and apply credential overrides
pub(crate) fn connect_options(connection: &ConnectionSettings) -> SessionResult<PgConnectOptions> {
    let mut options = PgConnectOptions::from_str(&connection.url)
        .map_err(|e| SessionError::Configuration(format!("Invalid connection URL: {e}")))?;
    if let Some(username) = &connection.username {
        options = options.username(username);
    }
    if let Some(password) = &connection.password {
        options = options.password(password);
    }
    Ok(options)
}

/// Create the pool and verify it with `SELECT 1` under the connect timeout
pub(crate) async fn create_pool(settings: &Settings) -> SessionResult<PgPool> {
    let options = connect_options(&settings.connection)?;
    let pool_settings = &settings.pool;

    debug!(
        factory = %settings.name,
        max = pool_settings.max_size,
        min = pool_settings.min_size,
        acquire_timeout_secs = pool_settings.acquire_timeout_secs,
        "Creating connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(pool_settings.max_size)
        .min_connections(pool_settings.min_size)
        .acquire_timeout(Duration::from_secs(pool_settings.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(pool_settings.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(pool_settings.max_lifetime_secs))
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .map_err(|e| {
            error!(factory = %settings.name, error = %e, "Database connection failed");
            SessionError::Database(e)
        })?;

    match tokio::time::timeout(
        Duration::from_secs(pool_settings.connect_timeout_secs),
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(Ok(_)) => {
            info!(factory = %settings.name, "Connection pool created and verified");
            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                factory = %settings.name,
                error = %e,
                "Database connection verification failed"
            );
            pool.close().await;
            Err(SessionError::Database(e))
        }
        Err(_) => {
            error!(
                factory = %settings.name,
                timeout_secs = pool_settings.connect_timeout_secs,
                "Database connection verification timeout"
            );
            pool.close().await;
            Err(SessionError::VerificationTimeout(
                pool_settings.connect_timeout_secs,
            ))
        }
    }
}
