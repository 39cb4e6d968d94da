//! Connection pools keyed by physical database name.
//!
//! Creation is idempotent under concurrent first-use, and a pool is
//! evicted and rebuilt when a liveness probe fails, per the design
//! doc's concurrency & resource model. Structurally this generalises
//! the teacher's one-`MySqlPool`-per-store-instance pattern
//! (`tower_sessions_sqlx_store::MySqlStore`) to *many* pools, one per
//! tenant database.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};

/// How to reach the MySQL/MariaDB server that hosts every tenant
/// database (one schema per tenant, one server).
#[derive(Debug, Clone)]
pub struct PoolManagerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
}

/// Lazily creates and caches one [`MySqlPool`] per physical database
/// name, rebuilding a pool whose liveness probe fails.
#[derive(Clone)]
pub struct PoolManager {
    config: PoolManagerConfig,
    pools: Arc<Mutex<HashMap<String, MySqlPool>>>,
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}

impl PoolManager {
    pub fn new(config: PoolManagerConfig) -> Self {
        Self {
            config,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn connect_options(&self, database: &str) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(database)
    }

    async fn build_pool(&self, database: &str) -> Result<MySqlPool> {
        MySqlPoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect_with(self.connect_options(database))
            .await
            .map_err(|e| StoreError::PoolUnavailable {
                database: database.to_string(),
                source: e,
            })
    }

    /// Get the pool for `database`, creating it on first use. Concurrent
    /// first-use is serialised by the pools mutex, which is held only
    /// across the (rare) pool-construction path.
    pub async fn get(&self, database: &str) -> Result<MySqlPool> {
        {
            let pools = self.pools.lock().await;
            if let Some(pool) = pools.get(database) {
                return Ok(pool.clone());
            }
        }

        let pool = self.build_pool(database).await?;
        let mut pools = self.pools.lock().await;
        // Another task may have raced us; prefer whichever landed first
        // so we don't leak a redundant pool.
        Ok(pools.entry(database.to_string()).or_insert(pool).clone())
    }

    /// Probe the pool's liveness with `SELECT 1`; on failure, evict and
    /// rebuild it once.
    pub async fn get_healthy(&self, database: &str) -> Result<MySqlPool> {
        let pool = self.get(database).await?;
        if sqlx::query("SELECT 1").execute(&pool).await.is_ok() {
            return Ok(pool);
        }

        tracing::warn!(database, "pool liveness probe failed, rebuilding");
        {
            let mut pools = self.pools.lock().await;
            pools.remove(database);
        }
        self.get(database).await
    }

    pub async fn evict(&self, database: &str) {
        self.pools.lock().await.remove(database);
    }

    pub async fn close_all(&self) {
        let mut pools = self.pools.lock().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
    }
}
