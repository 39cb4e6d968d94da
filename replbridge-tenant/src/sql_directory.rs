//! A tenant directory backed by a SQL table, for deployments that keep
//! the tenant directory itself in a shared database rather than a flat
//! file. Mirrors `tower_sessions_sqlx_store::MySqlStore`'s shape:
//! one pool, plain `sqlx::query_as` lookups, no caching layer.

use async_trait::async_trait;
use sqlx::MySqlPool;
use time::OffsetDateTime;

use crate::{evaluate, Result, TenantDirectory, TenantError, TenantRecord, Validation};

#[derive(Clone, Debug)]
pub struct SqlTenantDirectory {
    pool: MySqlPool,
    table_name: String,
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    store_id: String,
    store_name: String,
    app_id: String,
    license_expire: OffsetDateTime,
}

impl SqlTenantDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            table_name: "tenant_directory".to_string(),
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    async fn fetch(&self, store_id: &str, app_id: &str) -> Result<Option<TenantRecord>> {
        let query = format!(
            "SELECT store_id, store_name, app_id, license_expire FROM `{table}` WHERE store_id = ? AND app_id = ?",
            table = self.table_name
        );
        let row: Option<TenantRow> = sqlx::query_as(&query)
            .bind(store_id)
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TenantError::Backend(e.to_string()))?;

        Ok(row.map(|r| TenantRecord {
            store_id: r.store_id,
            store_name: r.store_name,
            app_id: r.app_id,
            license_expire: r.license_expire,
        }))
    }
}

#[async_trait]
impl TenantDirectory for SqlTenantDirectory {
    async fn validate(&self, store_id: &str, app_id: &str) -> Result<Validation> {
        let record = self.fetch(store_id, app_id).await?;
        Ok(evaluate(record, OffsetDateTime::now_utc()))
    }

    async fn database_for(&self, store_id: &str, app_id: &str) -> Result<Option<String>> {
        Ok(self
            .fetch(store_id, app_id)
            .await?
            .map(|record| record.app_id))
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| TenantError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
