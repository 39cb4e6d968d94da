use std::sync::Arc;

use replbridge_server::{AppState, Config};
use replbridge_store::{MySqlTargetStore, PoolManager, PoolManagerConfig};
use replbridge_tenant::{FileTenantDirectory, SqlTenantDirectory, TenantDirectory};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter.clone()))
        .init();

    let tenant: Arc<dyn TenantDirectory> = build_tenant_directory(&config).await?;
    tenant.health_check().await?;

    let pools = PoolManager::new(PoolManagerConfig {
        host: config.target_store_host.clone(),
        port: config.target_store_port,
        username: config.target_store_username.clone(),
        password: config.target_store_password.clone(),
        max_connections: config.target_store_max_connections,
    });
    let store = Arc::new(MySqlTargetStore::new(pools));

    tokio::fs::create_dir_all(&config.uploads_dir).await?;

    let state = AppState::new(config.clone(), tenant, store);
    replbridge_server::lifecycle::run(config, state).await?;

    Ok(())
}

async fn build_tenant_directory(config: &Config) -> anyhow::Result<Arc<dyn TenantDirectory>> {
    if let Some(dsn) = &config.tenant_directory_database_url {
        let pool = sqlx::mysql::MySqlPoolOptions::new().connect(dsn).await?;
        return Ok(Arc::new(SqlTenantDirectory::new(pool)));
    }
    let path = config
        .tenant_directory_path
        .as_ref()
        .expect("Config::from_env guarantees one tenant directory source is set");
    let directory = FileTenantDirectory::load(path.to_string_lossy().to_string()).await?;
    Ok(Arc::new(directory))
}
