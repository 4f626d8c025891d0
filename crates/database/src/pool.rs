use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use tracing::info;

/// Connection pool type alias
pub type DbPool = Pool;

/// Create a connection pool from application configuration
pub async fn create_pool(config: &config::DatabaseConfig) -> anyhow::Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.username.clone());
    cfg.password = Some(config.password.clone());
    cfg.pool = Some(PoolConfig::new(config.max_connections as usize));

    if config.tls_enabled {
        create_pool_with_native_tls(cfg, config.tls_accept_invalid_certs)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {e}"))
    }
}

/// Create pool using native-tls (simpler for accepting self-signed certificates)
pub fn create_pool_with_native_tls(
    cfg: Config,
    accept_invalid_certs: bool,
) -> anyhow::Result<Pool> {
    use native_tls::TlsConnector;
    use postgres_native_tls::MakeTlsConnector;

    let mut builder = TlsConnector::builder();
    if accept_invalid_certs {
        info!("Configuring TLS to accept self-signed certificates");
        builder.danger_accept_invalid_certs(true);
    }

    let connector = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create TLS connector: {e}"))?;
    let tls = MakeTlsConnector::new(connector);

    cfg.create_pool(Some(Runtime::Tokio1), tls)
        .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> config::DatabaseConfig {
        config::DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "barbersites".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 5,
            tls_enabled: false,
            tls_accept_invalid_certs: false,
        }
    }

    #[test]
    fn test_tls_disabled_by_default() {
        let config = local_config();
        assert!(!config.tls_enabled);
    }

    #[tokio::test]
    async fn test_create_pool_without_database_running() {
        // Pool construction is lazy; no connection is attempted here
        let pool = create_pool(&local_config()).await;
        assert!(pool.is_ok());
    }

    #[test]
    fn test_create_pool_with_tls() {
        let cfg = Config::new();

        let result = create_pool_with_native_tls(cfg, true);
        assert!(result.is_ok());
    }
}
