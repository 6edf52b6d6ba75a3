//! Prometheus metrics for the session factory connection pool
//!
//! Tracks pool size, unit-of-work acquisition latency, and acquisition errors

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

lazy_static::lazy_static! {
    /// Pool connection count by state (idle/active/max)
    static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "session_factory_pool_connections",
        "Session factory pool connection count by state",
        &["factory", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Time to begin a unit of work (connection acquisition + BEGIN)
    static ref POOL_ACQUIRE_DURATION: HistogramVec = register_histogram_vec!(
        "session_factory_acquire_duration_seconds",
        "Time to acquire a connection and begin a unit of work",
        &["factory"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Acquisition errors by type
    static ref POOL_ACQUIRE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "session_factory_acquire_errors_total",
        "Connection acquisition errors",
        &["factory", "error_type"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub(crate) fn update_pool_metrics(pool: &PgPool, factory: &str) {
    let size = pool.size() as i64;
    let idle = pool.num_idle() as i64;

    POOL_CONNECTIONS
        .with_label_values(&[factory, "idle"])
        .set(idle);
    POOL_CONNECTIONS
        .with_label_values(&[factory, "active"])
        .set(size - idle);
    POOL_CONNECTIONS
        .with_label_values(&[factory, "max"])
        .set(pool.options().get_max_connections() as i64);
}

/// Refresh pool gauges every 30 seconds until the handle is aborted
pub(crate) fn spawn_pool_metrics_updater(pool: PgPool, factory: String) -> JoinHandle<()> {
    update_pool_metrics(&pool, &factory);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if pool.is_closed() {
                break;
            }
            update_pool_metrics(&pool, &factory);
        }
    })
}

/// Begin a transaction and record acquisition latency and errors
pub(crate) async fn begin_with_metrics(
    pool: &PgPool,
    factory: &str,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.begin().await;

    POOL_ACQUIRE_DURATION
        .with_label_values(&[factory])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        let error_type = match e {
            sqlx::Error::PoolTimedOut => "timeout",
            sqlx::Error::PoolClosed => "closed",
            _ => "other",
        };
        POOL_ACQUIRE_ERRORS
            .with_label_values(&[factory, error_type])
            .inc();
    }

    result
}
