//! Translates inbound wire events into `replbridge-core` statement
//! builders and `replbridge-store` execution calls. This is the
//! "produces and executes the correct parameterised statement" half of
//! the Row-Op Dispatcher (§4.3), the DDL Translator's execution side
//! (§4.4), and the Schema Materialiser's execution side (§4.5).

use replbridge_core::ddl::{self, DdlOperation};
use replbridge_core::payload::{self, FlatRow, PayloadEncoding};
use replbridge_core::pk_policy::BusinessType;
use replbridge_core::row_op::{self, InsertMode, RowOp, RowOperation};
use replbridge_core::schema::{ColumnDescriptor, IndexDescriptor, TableSchema};
use replbridge_core::CoreError;
use replbridge_store::StoreError;
use replbridge_tenant::TenantDirectory;

use crate::app_state::AppState;
use crate::error::{ServerError, ServerResult};
use crate::events::{
    ColumnSchemaWire, CreateTableFromSchema, IndexSchemaWire, SyncDdlOperation, TableSchemaWire,
};

/// Resolve `(store_id, app_id)` to a physical database, reporting a
/// routing failure the same way for both row-ops and DDL-ops (§4.3 step
/// 2, §7's "Routing" category).
async fn resolve_database(
    state: &AppState,
    store_id: &str,
    app_id: &str,
) -> ServerResult<String> {
    state
        .tenant
        .database_for(store_id, app_id)
        .await?
        .ok_or_else(|| {
            ServerError::Core(CoreError::Unrouted {
                store_id: store_id.to_string(),
                app_id: app_id.to_string(),
            })
        })
}

fn encoding_of(tag: &str) -> PayloadEncoding {
    if tag.eq_ignore_ascii_case("xml") {
        PayloadEncoding::Xml
    } else {
        PayloadEncoding::Json
    }
}

/// Build one `RowOp` from its wire shape, decoding `record_data` into
/// the flat column map per §4.3 step 1 and resolving `(store_id, app_id)`
/// to a physical database per step 2. Each call re-resolves routing
/// rather than trusting a session-level cache, so a batch whose items
/// carry different `(store_id, app_id)` pairs routes each item
/// correctly.
#[allow(clippy::too_many_arguments)]
pub async fn build_row_op(
    state: &AppState,
    store_id: &str,
    app_id: &str,
    table_name: String,
    operation: &str,
    record_data: &str,
    record_encoding: &str,
    business_type: &str,
    sync_id: String,
) -> ServerResult<RowOp> {
    let op = RowOperation::parse(operation).ok_or_else(|| {
        ServerError::Core(CoreError::MalformedPayload(format!(
            "unknown row operation `{operation}`"
        )))
    })?;
    let business_type = BusinessType::parse(business_type).ok_or_else(|| {
        ServerError::Core(CoreError::MalformedPayload(format!(
            "unknown business type `{business_type}`"
        )))
    })?;
    let payload: FlatRow = payload::decode(record_data, encoding_of(record_encoding))?;
    let database = resolve_database(state, store_id, app_id).await?;

    Ok(RowOp {
        store_id: store_id.to_string(),
        app_id: app_id.to_string(),
        database,
        table_name,
        op,
        payload,
        business_type,
        sync_id,
    })
}

/// Execute one row-op against the target store, applying the
/// incremental-path upsert/duplicate-upgrade semantics.
pub async fn execute_row_op(state: &AppState, row_op: &RowOp) -> ServerResult<u64> {
    execute_row_op_with_mode(state, row_op, InsertMode::Upsert).await
}

/// Execute one row-op using `insert_mode`, used by both the incremental
/// path (`Upsert`) and the row-bootstrap path (`InsertOrSkip`, §4.7)
/// where a duplicate key on INSERT is silently skipped rather than
/// upgraded to an UPDATE, preserving idempotence of repeated bootstraps.
pub async fn execute_row_op_with_mode(
    state: &AppState,
    row_op: &RowOp,
    insert_mode: InsertMode,
) -> ServerResult<u64> {
    let statement = row_op::build_statement(row_op, insert_mode)?;
    match state.store.execute(&row_op.database, &statement).await {
        Ok(outcome) => Ok(outcome.rows_affected),
        Err(StoreError::Integrity(_))
            if matches!(row_op.op, RowOperation::Insert)
                && matches!(insert_mode, InsertMode::InsertOrSkip) =>
        {
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

/// Translate and execute a `sync_ddl_operation`. Resolves `event`'s own
/// `store_id`/`app_id` to a database per §4.3 step 2 (a DDL-op is routed
/// the same way a row-op is), then returns `Ok(Some(sql))` on an applied
/// statement, `Ok(None)` when the shape was skipped (e.g.
/// `LOCK_ESCALATION`), and `Err` on an unrouted pair, an unsupported
/// operation tag, or a target-store failure.
pub async fn execute_ddl(
    state: &AppState,
    event: &SyncDdlOperation,
) -> ServerResult<Option<String>> {
    let database = resolve_database(state, &event.store_id, &event.app_id).await?;

    let operation = DdlOperation::parse(&event.operation).ok_or_else(|| {
        ServerError::Core(CoreError::UnsupportedDdl(format!(
            "unknown DDL operation `{}`",
            event.operation
        )))
    })?;

    let Some(translated) = ddl::translate(&event.sql_command, operation, &event.table_name) else {
        return Ok(None);
    };

    state
        .store
        .execute(
            &database,
            &row_op::Statement {
                sql: translated.clone(),
                params: Vec::new(),
            },
        )
        .await?;

    Ok(Some(translated))
}

fn wire_column_to_core(col: &ColumnSchemaWire) -> ColumnDescriptor {
    ColumnDescriptor {
        column_name: col.column_name.clone(),
        data_type: col.data_type.clone(),
        character_maximum_length: col.character_maximum_length,
        numeric_precision: col.numeric_precision,
        numeric_scale: col.numeric_scale,
        is_nullable: col.is_nullable.eq_ignore_ascii_case("yes"),
        column_default: col.column_default.clone(),
        is_identity: col.is_identity != 0,
        column_key: col.column_key.clone(),
    }
}

fn wire_index_to_core(idx: &IndexSchemaWire) -> IndexDescriptor {
    IndexDescriptor {
        index_name: idx.index_name.clone(),
        columns: idx.columns.clone(),
        unique: idx.unique,
    }
}

pub fn wire_schema_to_core(schema: &TableSchemaWire) -> TableSchema {
    TableSchema {
        columns: schema.columns.iter().map(wire_column_to_core).collect(),
        primary_keys: schema.primary_keys.clone(),
        indexes: schema.indexes.iter().map(wire_index_to_core).collect(),
    }
}

/// Execute `create_table_from_schema`: render and run `CREATE TABLE`,
/// then the supplied indexes, then the business-type secondary-index
/// bundle when `database_type` names one.
pub async fn execute_create_table(
    state: &AppState,
    database: &str,
    event: &CreateTableFromSchema,
) -> ServerResult<()> {
    let table_schema = wire_schema_to_core(&event.schema);
    let business_type = event
        .database_type
        .as_deref()
        .and_then(BusinessType::parse);

    state
        .store
        .create_table_from_schema(database, &event.table_name, &table_schema, business_type)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::test_support;
    use crate::events::{ColumnSchemaWire, IndexSchemaWire, TableSchemaWire};
    use async_trait::async_trait;
    use replbridge_tenant::{TenantError, Validation};
    use std::sync::Arc;

    /// A tenant directory that never routes anything, for exercising the
    /// per-op routing-failure path independent of the happy-path stub.
    #[derive(Debug)]
    struct UnroutedTenant;

    #[async_trait]
    impl TenantDirectory for UnroutedTenant {
        async fn validate(&self, _store_id: &str, _app_id: &str) -> Result<Validation, TenantError> {
            unimplemented!("not exercised by this stub")
        }

        async fn database_for(
            &self,
            _store_id: &str,
            _app_id: &str,
        ) -> Result<Option<String>, TenantError> {
            Ok(None)
        }

        async fn health_check(&self) -> Result<(), TenantError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TenantError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn build_row_op_decodes_json_payload_and_routes_per_op() {
        let state = AppState::test_fixture();
        let row_op = build_row_op(
            &state,
            "store1",
            "tenant_db",
            "Stock".to_string(),
            "INSERT",
            r#"{"StockId": "000123", "Description": "Widget"}"#,
            "json",
            "retail",
            "sync-1".to_string(),
        )
        .await
        .expect("well-formed row op");

        assert_eq!(row_op.store_id, "store1");
        assert_eq!(row_op.app_id, "tenant_db");
        assert_eq!(row_op.database, "tenant_db");
        assert_eq!(row_op.table_name, "Stock");
        assert!(matches!(row_op.op, RowOperation::Insert));
        assert_eq!(
            row_op.payload.get("StockId").map(String::as_str),
            Some("000123")
        );
    }

    #[tokio::test]
    async fn build_row_op_reports_unrouted_store_and_app() {
        let state = AppState::new(
            test_support::test_config(),
            Arc::new(UnroutedTenant),
            Arc::new(test_support::StubTargetStore),
        );

        let err = build_row_op(
            &state,
            "store1",
            "tenant_db",
            "Stock".to_string(),
            "INSERT",
            "{}",
            "json",
            "retail",
            "sync-1".to_string(),
        )
        .await
        .unwrap_err();

        assert!(err.is_routing());
    }

    #[tokio::test]
    async fn build_row_op_rejects_unknown_operation() {
        let state = AppState::test_fixture();
        let err = build_row_op(
            &state,
            "store1",
            "tenant_db",
            "Stock".to_string(),
            "UPSERT_ALL",
            "{}",
            "json",
            "retail",
            "sync-1".to_string(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::Core(_)));
    }

    #[tokio::test]
    async fn build_row_op_rejects_unknown_business_type() {
        let state = AppState::test_fixture();
        let err = build_row_op(
            &state,
            "store1",
            "tenant_db",
            "Stock".to_string(),
            "INSERT",
            "{}",
            "json",
            "not_a_real_business_type",
            "sync-1".to_string(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::Core(_)));
    }

    #[test]
    fn wire_schema_to_core_preserves_shape() {
        let wire = TableSchemaWire {
            columns: vec![ColumnSchemaWire {
                column_name: "StockId".to_string(),
                data_type: "varchar".to_string(),
                character_maximum_length: Some(20),
                numeric_precision: None,
                numeric_scale: None,
                is_nullable: "NO".to_string(),
                column_default: None,
                is_identity: 0,
                column_key: Some("PRI".to_string()),
            }],
            primary_keys: vec!["StockId".to_string()],
            indexes: vec![IndexSchemaWire {
                index_name: "idx_description".to_string(),
                columns: vec!["Description".to_string()],
                unique: false,
            }],
        };

        let core = wire_schema_to_core(&wire);

        assert_eq!(core.columns.len(), 1);
        assert!(!core.columns[0].is_nullable);
        assert_eq!(core.primary_keys, vec!["StockId".to_string()]);
        assert_eq!(core.indexes.len(), 1);
        assert!(!core.indexes[0].unique);
    }
}
