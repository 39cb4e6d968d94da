//! Environment-driven configuration, parsed and validated eagerly at
//! startup so a missing or malformed variable is a startup failure
//! (non-zero exit) rather than a surprise deep in a session handler.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Transport tunables for the Socket.IO-compatible layer (ping/pong,
/// upgrade timeout, max message size). Defaults match §6's glossary;
/// the bulk tunables are overridden upward so large CSV chunk payloads
/// don't trip the transport's own framing limits.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub upgrade_timeout: Duration,
    pub max_buffer_size: usize,
}

/// Tunables for the bulk/CSV bootstrap path.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub full_sync_batch_size: usize,
    pub full_sync_timeout: Duration,
    pub full_sync_retry_attempts: u32,
}

/// Everything the server needs to start, assembled once from the
/// environment in [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub transport: TransportConfig,
    pub bulk: BulkConfig,

    /// MySQL/MariaDB host hosting every tenant database.
    pub target_store_host: String,
    pub target_store_port: u16,
    pub target_store_username: String,
    pub target_store_password: String,
    pub target_store_max_connections: u32,

    /// Path to the static tenant-directory mapping file. Mutually
    /// exclusive with `tenant_directory_database_url` in practice, but
    /// both may be set; the binary picks file-backed unless the DSN is
    /// present, per the design doc.
    pub tenant_directory_path: Option<PathBuf>,
    pub tenant_directory_database_url: Option<String>,

    /// Per-server directory holding in-flight and completed CSV
    /// uploads, deleted after import.
    pub uploads_dir: PathBuf,
    /// `secure_file_priv` directory for the `LOAD DATA INFILE`
    /// fallback, when local-infile isn't available.
    pub secure_file_priv_dir: Option<PathBuf>,

    pub log_filter: String,
}

impl Config {
    /// Read and validate every environment variable named in design doc
    /// §6. Returns a descriptive error on the first problem so the
    /// binary can exit non-zero with a useful message.
    pub fn from_env() -> ServerResult<Self> {
        let host = env_or("HOST", "0.0.0.0")?
            .parse::<IpAddr>()
            .map_err(|e| ServerError::Config(format!("HOST: {e}")))?;
        let port = env_parse("PORT", 3031)?;

        let transport = TransportConfig {
            ping_interval: Duration::from_millis(env_parse("SOCKETIO_PING_INTERVAL", 25_000)?),
            ping_timeout: Duration::from_millis(env_parse("SOCKETIO_PING_TIMEOUT", 60_000)?),
            upgrade_timeout: Duration::from_millis(env_parse("SOCKETIO_UPGRADE_TIMEOUT", 10_000)?),
            max_buffer_size: env_parse("SOCKETIO_MAX_BUFFER_SIZE", 10_000_000)?,
        };

        let bulk = BulkConfig {
            full_sync_batch_size: env_parse("FULL_SYNC_BATCH_SIZE", 1000)?,
            full_sync_timeout: Duration::from_millis(env_parse("FULL_SYNC_TIMEOUT", 300_000)?),
            full_sync_retry_attempts: env_parse("FULL_SYNC_RETRY_ATTEMPTS", 3)?,
        };

        let tenant_directory_path = std::env::var("TENANT_DIRECTORY_PATH").ok().map(PathBuf::from);
        let tenant_directory_database_url = std::env::var("TENANT_DIRECTORY_DATABASE_URL").ok();
        if tenant_directory_path.is_none() && tenant_directory_database_url.is_none() {
            return Err(ServerError::Config(
                "one of TENANT_DIRECTORY_PATH or TENANT_DIRECTORY_DATABASE_URL is required".into(),
            ));
        }

        Ok(Self {
            host,
            port,
            transport,
            bulk,
            target_store_host: env_required("TARGET_STORE_HOST")?,
            target_store_port: env_parse("TARGET_STORE_PORT", 3306)?,
            target_store_username: env_required("TARGET_STORE_USERNAME")?,
            target_store_password: env_required("TARGET_STORE_PASSWORD")?,
            target_store_max_connections: env_parse("TARGET_STORE_MAX_CONNECTIONS", 10)?,
            tenant_directory_path,
            tenant_directory_database_url,
            uploads_dir: PathBuf::from(env_or("UPLOADS_DIR", "uploads")?),
            secure_file_priv_dir: std::env::var("SECURE_FILE_PRIV_DIR").ok().map(PathBuf::from),
            log_filter: env_or("RUST_LOG", "info")?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> ServerResult<String> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        Ok(_) | Err(std::env::VarError::NotPresent) => Ok(default.to_string()),
        Err(e) => Err(ServerError::Config(format!("{key}: {e}"))),
    }
}

fn env_required(key: &str) -> ServerResult<String> {
    std::env::var(key).map_err(|_| ServerError::Config(format!("{key} is required")))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> ServerResult<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| ServerError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tenant_directory_source_is_a_config_error() {
        // Guard against environment leakage between tests: clear the
        // two mutually-acceptable variables.
        std::env::remove_var("TENANT_DIRECTORY_PATH");
        std::env::remove_var("TENANT_DIRECTORY_DATABASE_URL");
        std::env::set_var("TARGET_STORE_HOST", "localhost");
        std::env::set_var("TARGET_STORE_USERNAME", "root");
        std::env::set_var("TARGET_STORE_PASSWORD", "secret");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
