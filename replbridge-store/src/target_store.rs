//! The Target-Store Access Layer's trait and MySQL implementation:
//! parameterised execute, a connection-with-transaction entry point, and
//! schema introspection. Bulk-load and schema-create live in sibling
//! modules that build on the same pool manager.

use std::path::Path;

use async_trait::async_trait;
use replbridge_core::row_op::Statement;
use replbridge_core::schema::{self, TableSchema};
use sqlx::Row;

use crate::bulk_load::{self, BulkLoadOptions, BulkLoadOutcome};
use crate::error::{Result, StoreError};
use crate::pool::PoolManager;

/// The outcome of executing one parameterised statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOutcome {
    pub rows_affected: u64,
}

/// Abstraction over the physical target database, keyed by database
/// name. Object-safe so the server can hold `Arc<dyn TargetStore>`.
#[async_trait]
pub trait TargetStore: Send + Sync + std::fmt::Debug + 'static {
    async fn execute(&self, database: &str, statement: &Statement) -> Result<ExecuteOutcome>;

    /// Execute every statement in one transaction; rolls back on any
    /// failure. Used by `clear_database_tables`.
    async fn execute_in_transaction(&self, database: &str, statements: &[String]) -> Result<()>;

    /// Ordered column names for `table` (case-insensitive resolution of
    /// the actual table name), via `SHOW COLUMNS`.
    async fn introspect_columns(&self, database: &str, table: &str) -> Result<Vec<String>>;

    /// Row count for `table`, used to answer `verify_and_sync_table`.
    async fn row_count(&self, database: &str, table: &str) -> Result<u64>;

    /// Create `table` from the client-supplied schema descriptor, then
    /// apply the business-type secondary-index bundle when
    /// `business_type` is given.
    async fn create_table_from_schema(
        &self,
        database: &str,
        table: &str,
        schema: &TableSchema,
        business_type: Option<replbridge_core::pk_policy::BusinessType>,
    ) -> Result<()>;

    /// Truncate every named table inside one transaction, with foreign
    /// key checks disabled for the duration.
    async fn clear_tables(&self, database: &str, tables: &[String]) -> Result<()>;

    async fn health_check(&self, database: &str) -> Result<()>;

    async fn close(&self);

    /// Run the full CSV bootstrap import for one already-reassembled
    /// file: introspect the target table's column order, then execute
    /// the bulk-load attempt sequence from §4.6.
    async fn import_csv(
        &self,
        database: &str,
        table: &str,
        file_path: &Path,
        options: &BulkLoadOptions,
    ) -> Result<BulkLoadOutcome>;
}

#[derive(Clone, Debug)]
pub struct MySqlTargetStore {
    pools: PoolManager,
}

impl MySqlTargetStore {
    pub fn new(pools: PoolManager) -> Self {
        Self { pools }
    }

    /// Retry an operation exactly once, rebuilding the pool in between,
    /// when the first attempt failed with a retryable `StoreError`.
    async fn with_retry<T, F, Fut>(&self, database: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match op().await {
            Ok(v) => Ok(v),
            Err(e) if e.is_retryable() => {
                tracing::warn!(database, error = %e, "retrying after pool rebuild");
                self.pools.evict(database).await;
                op().await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TargetStore for MySqlTargetStore {
    async fn execute(&self, database: &str, statement: &Statement) -> Result<ExecuteOutcome> {
        self.with_retry(database, || async {
            let pool = self.pools.get_healthy(database).await?;
            let mut query = sqlx::query(&statement.sql);
            for param in &statement.params {
                query = query.bind(param);
            }
            let result = query
                .execute(&pool)
                .await
                .map_err(|e| StoreError::from_execute_error(database, e))?;
            Ok(ExecuteOutcome {
                rows_affected: result.rows_affected(),
            })
        })
        .await
    }

    async fn execute_in_transaction(&self, database: &str, statements: &[String]) -> Result<()> {
        let pool = self.pools.get_healthy(database).await?;
        let mut tx = pool.begin().await?;

        sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
            .execute(&mut *tx)
            .await?;

        for sql in statements {
            if let Err(e) = sqlx::query(sql).execute(&mut *tx).await {
                tx.rollback().await.ok();
                return Err(StoreError::from_execute_error(database, e));
            }
        }

        sqlx::query("SET FOREIGN_KEY_CHECKS = 1")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn introspect_columns(&self, database: &str, table: &str) -> Result<Vec<String>> {
        let pool = self.pools.get_healthy(database).await?;
        let actual_name = resolve_table_name(&pool, database, table).await?;

        let show_sql = format!("SHOW COLUMNS FROM `{actual_name}`");
        let rows = match sqlx::query(&show_sql).fetch_all(&pool).await {
            Ok(rows) => rows,
            Err(_) => {
                // Fall back to the information schema when SHOW COLUMNS
                // isn't available under the connected privileges.
                let info_sql = "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
                     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";
                sqlx::query(info_sql)
                    .bind(database)
                    .bind(&actual_name)
                    .fetch_all(&pool)
                    .await?
            }
        };

        let columns = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    async fn row_count(&self, database: &str, table: &str) -> Result<u64> {
        let pool = self.pools.get_healthy(database).await?;
        let actual_name = resolve_table_name(&pool, database, table).await?;
        let sql = format!("SELECT COUNT(*) FROM `{actual_name}`");
        let row = sqlx::query(&sql).fetch_one(&pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn create_table_from_schema(
        &self,
        database: &str,
        table: &str,
        table_schema: &TableSchema,
        business_type: Option<replbridge_core::pk_policy::BusinessType>,
    ) -> Result<()> {
        let pool = self.pools.get_healthy(database).await?;

        let create_sql = schema::render_create_table(database, table, table_schema);
        sqlx::query(&create_sql).execute(&pool).await?;

        for index_sql in schema::render_indexes(database, table, table_schema) {
            if let Err(e) = sqlx::query(&index_sql).execute(&pool).await {
                tracing::warn!(table, %index_sql, error = %e, "skipping failed index statement");
            }
        }

        if let Some(business_type) = business_type {
            for statement in schema::secondary_index_bundle(table, business_type) {
                if let Err(e) = sqlx::query(statement).execute(&pool).await {
                    tracing::warn!(table, statement, error = %e, "skipping failed bundle statement");
                }
            }
        }

        Ok(())
    }

    async fn clear_tables(&self, database: &str, tables: &[String]) -> Result<()> {
        let statements: Vec<String> = tables
            .iter()
            .map(|t| format!("TRUNCATE TABLE `{t}`"))
            .collect();
        self.execute_in_transaction(database, &statements).await
    }

    async fn health_check(&self, database: &str) -> Result<()> {
        self.pools.get_healthy(database).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pools.close_all().await;
    }

    async fn import_csv(
        &self,
        database: &str,
        table: &str,
        file_path: &Path,
        options: &BulkLoadOptions,
    ) -> Result<BulkLoadOutcome> {
        self.with_retry(database, || async {
            let pool = self.pools.get_healthy(database).await?;
            let actual_name = resolve_table_name(&pool, database, table).await?;
            let columns = self.introspect_columns(database, &actual_name).await?;
            bulk_load::import_csv(&pool, database, &actual_name, &columns, file_path, options)
                .await
        })
        .await
    }
}

async fn resolve_table_name(
    pool: &sqlx::MySqlPool,
    database: &str,
    table: &str,
) -> Result<String> {
    let sql = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = ? AND LOWER(TABLE_NAME) = LOWER(?)";
    let row = sqlx::query(sql)
        .bind(database)
        .bind(table)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(row.try_get::<String, _>(0)?),
        None => Err(StoreError::Validation(format!(
            "table `{table}` does not exist in database `{database}`"
        ))),
    }
}
