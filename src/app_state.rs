//! Process-wide shared state: the tenant directory, the target-store
//! access layer, and configuration. Per the design doc's concurrency
//! model, this is the *only* global mutable state besides connection
//! pools (which `replbridge_store::PoolManager` already owns); all
//! per-client tenancy state lives on the session.

use std::sync::Arc;

use replbridge_store::TargetStore;
use replbridge_tenant::TenantDirectory;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tenant: Arc<dyn TenantDirectory>,
    pub store: Arc<dyn TargetStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("port", &self.config.port)
            .finish()
    }
}

impl AppState {
    pub fn new(
        config: Config,
        tenant: Arc<dyn TenantDirectory>,
        store: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tenant,
            store,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// An `AppState` wired to stub backends, for tests that exercise
    /// server-side orchestration (session wiring, upload framing)
    /// without reaching a real tenant directory or target store.
    pub fn test_fixture() -> Self {
        Self::new(
            test_support::test_config(),
            std::sync::Arc::new(test_support::StubTenantDirectory),
            std::sync::Arc::new(test_support::StubTargetStore),
        )
    }
}

#[cfg(test)]
pub mod test_support {
    use std::net::IpAddr;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use async_trait::async_trait;
    use replbridge_core::pk_policy::BusinessType;
    use replbridge_core::row_op::Statement;
    use replbridge_core::schema::TableSchema;
    use replbridge_store::{BulkLoadOptions, BulkLoadOutcome, ExecuteOutcome, StoreError, TargetStore};
    use replbridge_tenant::{TenantDirectory, TenantError, Validation};

    use crate::config::{BulkConfig, Config, TransportConfig};

    pub fn test_config() -> Config {
        Config {
            host: "0.0.0.0".parse::<IpAddr>().unwrap(),
            port: 0,
            transport: TransportConfig {
                ping_interval: Duration::from_secs(25),
                ping_timeout: Duration::from_secs(60),
                upgrade_timeout: Duration::from_secs(10),
                max_buffer_size: 10_000_000,
            },
            bulk: BulkConfig {
                full_sync_batch_size: 1000,
                full_sync_timeout: Duration::from_secs(300),
                full_sync_retry_attempts: 3,
            },
            target_store_host: "localhost".to_string(),
            target_store_port: 3306,
            target_store_username: "root".to_string(),
            target_store_password: "secret".to_string(),
            target_store_max_connections: 10,
            tenant_directory_path: Some(PathBuf::from("tenants.csv")),
            tenant_directory_database_url: None,
            uploads_dir: PathBuf::from("/tmp/uploads"),
            secure_file_priv_dir: None,
            log_filter: "info".to_string(),
        }
    }

    /// `validate` is never exercised by tests using this stub; `database_for`
    /// mirrors the real `appId == database` rule so dispatcher tests can
    /// exercise per-op routing without a real tenant backend.
    #[derive(Debug)]
    pub struct StubTenantDirectory;

    #[async_trait]
    impl TenantDirectory for StubTenantDirectory {
        async fn validate(
            &self,
            _store_id: &str,
            _app_id: &str,
        ) -> Result<Validation, TenantError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn database_for(
            &self,
            _store_id: &str,
            app_id: &str,
        ) -> Result<Option<String>, TenantError> {
            Ok(Some(app_id.to_string()))
        }

        async fn health_check(&self) -> Result<(), TenantError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TenantError> {
            Ok(())
        }
    }

    #[derive(Debug)]
    pub struct StubTargetStore;

    #[async_trait]
    impl TargetStore for StubTargetStore {
        async fn execute(
            &self,
            _database: &str,
            _statement: &Statement,
        ) -> Result<ExecuteOutcome, StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn execute_in_transaction(
            &self,
            _database: &str,
            _statements: &[String],
        ) -> Result<(), StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn introspect_columns(
            &self,
            _database: &str,
            _table: &str,
        ) -> Result<Vec<String>, StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn row_count(&self, _database: &str, _table: &str) -> Result<u64, StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn create_table_from_schema(
            &self,
            _database: &str,
            _table: &str,
            _schema: &TableSchema,
            _business_type: Option<BusinessType>,
        ) -> Result<(), StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn clear_tables(&self, _database: &str, _tables: &[String]) -> Result<(), StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }

        async fn health_check(&self, _database: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn close(&self) {}

        async fn import_csv(
            &self,
            _database: &str,
            _table: &str,
            _file_path: &Path,
            _options: &BulkLoadOptions,
        ) -> Result<BulkLoadOutcome, StoreError> {
            unimplemented!("not exercised by tests using this stub")
        }
    }
}
