pub mod retry;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub type DbPool = DatabaseConnection;

/// Pool tuning, derived from `AppConfig`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// An in-memory SQLite database lives only as long as its connection,
    /// so more than one pooled connection would see different databases.
    fn effective_max_connections(&self) -> u32 {
        if self.is_sqlite() && self.url.contains(":memory:") && self.max_connections > 1 {
            warn!(
                requested = self.max_connections,
                "in-memory sqlite uses a single connection"
            );
            1
        } else {
            self.max_connections
        }
    }
}

/// Opens the connection pool shared by the ledger and every service on
/// top of it.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let max_connections = config.effective_max_connections();
    let min_connections = config.min_connections.min(max_connections);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("order_ledger.db.max_connections", max_connections as f64);
    info!(
        max_connections,
        min_connections,
        sqlite = config.is_sqlite(),
        "Connecting to database"
    );

    let pool = Database::connect(opt).await.map_err(|e| {
        counter!("order_ledger.db.connection_failures", 1);
        error!("Database connection failed: {}", e);
        ServiceError::DatabaseError(e)
    })?;

    info!("Database pool ready");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending schema migration.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    match &result {
        Ok(()) => info!(elapsed = ?start.elapsed(), "Schema migrations applied"),
        Err(e) => error!(elapsed = ?start.elapsed(), "Schema migrations failed: {}", e),
    }
    result
}

/// Pings the database; used by the readiness and detailed health probes.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    match &result {
        Ok(()) => {
            debug!(elapsed = ?start.elapsed(), "Database ping ok");
            gauge!(
                "order_ledger.db.ping_latency_ms",
                start.elapsed().as_millis() as f64
            );
        }
        Err(e) => {
            error!(elapsed = ?start.elapsed(), "Database ping failed: {}", e);
            counter!("order_ledger.db.connection_failures", 1);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sqlite_is_capped_at_one_connection() {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 8,
            ..DbConfig::default()
        };
        assert!(config.is_sqlite());
        assert_eq!(config.effective_max_connections(), 1);

        let postgres = DbConfig {
            url: "postgres://localhost/ledger".to_string(),
            max_connections: 8,
            ..DbConfig::default()
        };
        assert_eq!(postgres.effective_max_connections(), 8);
    }
}
