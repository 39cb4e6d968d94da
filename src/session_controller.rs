//! The Session Controller (design doc §4.2): one task per accepted
//! Socket.IO connection, driving `replbridge_core::session::SessionState`
//! through `New -> Identifying -> Ready -> Closed` and routing every
//! `READY`-phase event to the dispatcher, CSV bootstrap pipeline, or
//! schema materialiser.
//!
//! Per §9's design note, log statements here key on the session's own
//! `store_id`/`app_id` rather than the reference implementation's
//! unbound `machineName`.

use std::sync::Arc;
use std::time::Duration;

use replbridge_core::pk_policy::BusinessType;
use replbridge_core::row_op::InsertMode;
use socketioxide::extract::{Data, SocketRef};
use socketioxide::socket::DisconnectReason;
use socketioxide::SocketIo;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::app_state::AppState;
use crate::csv_bootstrap;
use crate::dispatcher;
use crate::error::ServerError;
use crate::events::*;
use crate::session_state::{BoundTenant, ServerSession, SharedSession};

/// Register the `/` namespace's connection handler against `io`,
/// closing over `state` so every per-socket event closure can reach the
/// tenant directory and target store.
pub fn register(io: &SocketIo, state: AppState) {
    io.ns("/", move |socket: SocketRef| {
        let state = state.clone();
        async move { on_connect(socket, state).await }
    });
}

async fn on_connect(socket: SocketRef, state: AppState) {
    let socket_id = socket.id.to_string();
    tracing::info!(socket_id, "socket connected");

    let session: SharedSession = Arc::new(Mutex::new(ServerSession::new(
        socket_id.clone(),
        &state.config.uploads_dir,
    )));

    register_identify(&socket, state.clone(), session.clone());
    register_ready_events(&socket, state.clone(), session.clone());

    let disconnect_session = session.clone();
    socket.on_disconnect(move |_socket: SocketRef, reason: DisconnectReason| {
        let session = disconnect_session.clone();
        async move {
            let mut guard = session.lock().await;
            tracing::info!(
                socket_id = %guard.core.socket_id,
                reason = ?reason,
                "socket disconnected"
            );
            // Cancellation rule (§5): drop pending chunk uploads and the
            // full-sync flag immediately; any in-flight database call
            // may still complete, but nothing further is emitted to this
            // (now closed) peer.
            guard.cancel();
        }
    });
}

fn register_identify(socket: &SocketRef, state: AppState, session: SharedSession) {
    socket.on(
        "identify",
        move |socket: SocketRef, Data::<Identify>(event)| {
            let state = state.clone();
            let session = session.clone();
            async move {
                handle_identify(socket, state, session, event).await;
            }
        },
    );
}

async fn handle_identify(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    event: Identify,
) {
    let mut guard = session.lock().await;
    guard.core.phase = replbridge_core::session::SessionPhase::Identifying;

    let requires_gate = event.service_type == "advanced_online_report";

    if !requires_gate {
        // Legacy sessions bind tenant fields only; routing still has to
        // resolve a database or the session can never reach the
        // dispatcher (the session invariant in §3).
        match state.tenant.database_for(&event.store_id, &event.app_id).await {
            Ok(Some(database)) => {
                bind(&mut guard, &event, database, None);
                socket.emit("identified", &Identified {
                    store_id: event.store_id.clone(),
                    app_id: event.app_id.clone(),
                }).ok();
                tracing::info!(store_id = %event.store_id, app_id = %event.app_id, "session identified (legacy)");
            }
            _ => {
                emit_identification_error(&socket, &event);
                drop(guard);
                disconnect_after_grace(socket).await;
            }
        }
        return;
    }

    match state.tenant.validate(&event.store_id, &event.app_id).await {
        Ok(validation) if validation.valid => {
            let database = validation
                .store_info
                .as_ref()
                .map(|r| r.app_id.clone())
                .unwrap_or_else(|| event.app_id.clone());
            bind(&mut guard, &event, database, validation.days_remaining);
            socket
                .emit(
                    "identified",
                    &Identified {
                        store_id: event.store_id.clone(),
                        app_id: event.app_id.clone(),
                    },
                )
                .ok();
            tracing::info!(store_id = %event.store_id, app_id = %event.app_id, "session identified");
        }
        Ok(validation) if validation.expired => {
            socket
                .emit(
                    "license_expired",
                    &LicenseExpired {
                        code: 410,
                        message: validation
                            .error
                            .unwrap_or_else(|| "license expired".to_string()),
                        days_remaining: validation.days_remaining,
                    },
                )
                .ok();
            tracing::warn!(store_id = %event.store_id, app_id = %event.app_id, "license expired");
            drop(guard);
            disconnect_after_grace(socket).await;
        }
        Ok(validation) => {
            socket
                .emit(
                    "license_error",
                    &LicenseError {
                        code: 400,
                        message: validation
                            .error
                            .unwrap_or_else(|| "invalid license".to_string()),
                    },
                )
                .ok();
            drop(guard);
            disconnect_after_grace(socket).await;
        }
        Err(e) => {
            tracing::error!(store_id = %event.store_id, app_id = %event.app_id, error = %e, "tenant lookup failed");
            socket
                .emit(
                    "license_error",
                    &LicenseError {
                        code: 400,
                        message: "store not found or invalid app".to_string(),
                    },
                )
                .ok();
            drop(guard);
            disconnect_after_grace(socket).await;
        }
    }
}

fn bind(
    guard: &mut ServerSession,
    event: &Identify,
    database: String,
    days_remaining: Option<i64>,
) {
    guard.bound = Some(BoundTenant {
        store_id: event.store_id.clone(),
        app_id: event.app_id.clone(),
        database,
        days_remaining,
    });
    guard.core.phase = replbridge_core::session::SessionPhase::Ready;
}

fn emit_identification_error(socket: &SocketRef, event: &Identify) {
    socket
        .emit(
            "identification_error",
            &LicenseError {
                code: 400,
                message: format!(
                    "store `{}` / app `{}` could not be routed",
                    event.store_id, event.app_id
                ),
            },
        )
        .ok();
}

/// Close after a short grace period so the peer can observe the reason
/// before the transport drops, per the state machine in §4.2.
async fn disconnect_after_grace(socket: SocketRef) {
    tokio::time::sleep(Duration::from_secs(1)).await;
    socket.disconnect().ok();
}

fn register_ready_events(socket: &SocketRef, state: AppState, session: SharedSession) {
    // Each event's wire shape is fixed by design doc §6, so the event
    // type is named explicitly at each registration rather than
    // inferred, matching how extractor-based handlers are registered
    // throughout the socketioxide ecosystem.
    macro_rules! on_ready {
        ($event:literal, $ty:ty, $handler:expr) => {{
            let state = state.clone();
            let session = session.clone();
            socket.on($event, move |socket: SocketRef, data: Data<$ty>| {
                let state = state.clone();
                let session = session.clone();
                async move {
                    if !require_ready(&session).await {
                        return;
                    }
                    $handler(socket, state, session, data).await;
                }
            });
        }};
    }

    on_ready!("sync_data", SyncData, handle_sync_data);
    on_ready!("batch_sync", BatchSync, handle_batch_sync);
    on_ready!("sync_ddl_operation", SyncDdlOperation, handle_ddl);
    on_ready!(
        "verify_and_sync_table",
        VerifyAndSyncTable,
        handle_verify_and_sync_table
    );
    on_ready!(
        "create_table_from_schema",
        CreateTableFromSchema,
        handle_create_table_from_schema
    );
    on_ready!(
        "table_schema_response",
        TableSchemaResponse,
        handle_table_schema_response
    );
    on_ready!(
        "full_data_sync_response",
        FullDataSyncResponse,
        handle_full_data_sync_response
    );
    on_ready!(
        "initial_sync_data_response",
        InitialSyncDataResponse,
        handle_full_data_sync_response
    );
    on_ready!(
        "force_sync_request",
        ForceSyncRequest,
        handle_force_sync_request
    );
    on_ready!(
        "clear_database_tables",
        ClearDatabaseTables,
        handle_clear_database_tables
    );
    on_ready!("csv_bulk_upload", CsvBulkUpload, handle_csv_bulk_upload);
    on_ready!(
        "csv_bulk_upload_start",
        CsvBulkUploadStart,
        handle_csv_bulk_upload_start
    );
    on_ready!(
        "csv_bulk_upload_chunk",
        CsvBulkUploadChunk,
        handle_csv_bulk_upload_chunk
    );

    let ping_session = session.clone();
    socket.on("ping", move |socket: SocketRef| {
        let session = ping_session.clone();
        async move {
            if require_ready(&session).await {
                socket.emit("pong", &()).ok();
            }
        }
    });
}

/// Every event besides `identify` is rejected until the session is
/// `READY` and bound to a tenant (the invariant in §3).
async fn require_ready(session: &SharedSession) -> bool {
    session.lock().await.is_ready()
}

async fn handle_sync_data(socket: SocketRef, state: AppState, session: SharedSession, Data(event): Data<SyncData>) {
    let bound = match bound_tenant(&session).await {
        Some(b) => b,
        None => return,
    };
    let sync_id = event.sync_id.clone();

    let result = build_and_execute(&state, &bound, &event).await;
    emit_sync_response(&socket, sync_id, result);
}

/// Resolves `event`'s own `store_id`/`app_id` to a database (§4.3 step
/// 2), falling back to the session's identify-time binding only when
/// the event omits them, per `sync_data`'s optional `storeId`/`appId`.
async fn build_and_execute(
    state: &AppState,
    bound: &BoundTenant,
    event: &SyncData,
) -> Result<u64, ServerError> {
    let store_id = event.store_id.as_deref().unwrap_or(&bound.store_id);
    let app_id = event.app_id.as_deref().unwrap_or(&bound.app_id);
    let row_op = dispatcher::build_row_op(
        state,
        store_id,
        app_id,
        event.table_name.clone(),
        &event.operation,
        &event.record_data,
        &event.record_encoding,
        &event.business_type,
        event.sync_id.clone(),
    )
    .await?;
    dispatcher::execute_row_op(state, &row_op).await
}

fn emit_sync_response(socket: &SocketRef, sync_id: String, result: Result<u64, ServerError>) {
    let response = match result {
        Ok(rows) => SyncResponse {
            sync_id,
            success: true,
            result: Some(serde_json::json!({ "rowsAffected": rows })),
            error: None,
            timestamp: OffsetDateTime::now_utc(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "sync_data failed");
            SyncResponse {
                sync_id,
                success: false,
                result: None,
                error: Some(e.to_string()),
                timestamp: OffsetDateTime::now_utc(),
            }
        }
    };
    socket.emit("sync_response", &response).ok();
}

async fn handle_batch_sync(socket: SocketRef, state: AppState, session: SharedSession, Data(event): Data<BatchSync>) {
    let bound = match bound_tenant(&session).await {
        Some(b) => b,
        None => return,
    };

    // Operations from a single session are applied in arrival order per
    // (table, primary key); a sequential loop over one socket's batch
    // already gives us that ordering for free. Each item still resolves
    // its own database, since a batch is not guaranteed to be routed
    // uniformly.
    let mut responses = Vec::with_capacity(event.operations.len());
    for op in &event.operations {
        let result = build_and_execute(&state, &bound, op).await;
        if let Err(e) = &result {
            tracing::warn!(sync_id = %op.sync_id, error = %e, "batch_sync item failed");
        }
        responses.push(SyncResponse {
            sync_id: op.sync_id.clone(),
            success: result.is_ok(),
            result: result.as_ref().ok().map(|rows| serde_json::json!({ "rowsAffected": rows })),
            error: result.err().map(|e| e.to_string()),
            timestamp: OffsetDateTime::now_utc(),
        });
    }
    socket.emit("batch_sync_response", &responses).ok();
}

async fn handle_ddl(socket: SocketRef, state: AppState, _session: SharedSession, Data(event): Data<SyncDdlOperation>) {
    // `require_ready` (in the `on_ready!` registration) already confirmed
    // the session is bound; routing itself is resolved per-op below from
    // the event's own store_id/app_id (§4.3 step 2), same as a row-op,
    // rather than reused from the identify-time binding.
    let sync_id = event.sync_id.clone();

    match dispatcher::execute_ddl(&state, &event).await {
        Ok(Some(_sql)) => {
            socket
                .emit("ddl_sync_success", &DdlSyncSuccess { sync_id, skipped: None })
                .ok();
        }
        Ok(None) => {
            socket
                .emit(
                    "ddl_sync_success",
                    &DdlSyncSuccess {
                        sync_id,
                        skipped: Some(true),
                    },
                )
                .ok();
        }
        Err(e) => {
            tracing::warn!(table = %event.table_name, error = %e, "ddl translation/execution failed");
            socket
                .emit(
                    "ddl_sync_error",
                    &DdlSyncError {
                        sync_id,
                        error: e.to_string(),
                    },
                )
                .ok();
        }
    }
}

async fn handle_verify_and_sync_table(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<VerifyAndSyncTable>,
) {
    let database = match bound_database(&session).await {
        Some(db) => db,
        None => return,
    };

    let columns = state.store.introspect_columns(&database, &event.table_name).await;
    let (exists, row_count) = match columns {
        Ok(cols) if !cols.is_empty() => {
            let count = state
                .store
                .row_count(&database, &event.table_name)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(table = %event.table_name, error = %e, "row count query failed");
                    0
                });
            (true, count)
        }
        _ => (false, 0u64),
    };

    socket
        .emit(
            "verify_and_sync_response",
            &VerifyAndSyncResponse {
                table_name: event.table_name.clone(),
                exists,
                needs_sync: !exists,
                row_count,
                use_csv_sync: !exists,
            },
        )
        .ok();

    if !exists {
        socket
            .emit(
                "request_table_schema",
                &serde_json::json!({
                    "tableName": event.table_name,
                    "originalSyncId": uuid::Uuid::new_v4().to_string(),
                }),
            )
            .ok();
    }
}

async fn handle_create_table_from_schema(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<CreateTableFromSchema>,
) {
    let database = match bound_database(&session).await {
        Some(db) => db,
        None => return,
    };
    let table_name = event.table_name.clone();
    let is_initial = event.is_initial_sync;

    match dispatcher::execute_create_table(&state, &database, &event).await {
        Ok(()) => {
            socket
                .emit(
                    "table_created",
                    &TableCreated {
                        table_name: table_name.clone(),
                        success: true,
                        error: None,
                    },
                )
                .ok();
            if is_initial {
                socket
                    .emit(
                        "request_full_data_sync",
                        &serde_json::json!({
                            "tableName": table_name,
                            "originalSyncId": uuid::Uuid::new_v4().to_string(),
                            "batchSize": state.config.bulk.full_sync_batch_size,
                        }),
                    )
                    .ok();
            }
        }
        Err(e) => {
            tracing::warn!(table = %table_name, error = %e, "create_table_from_schema failed");
            socket
                .emit(
                    "table_created",
                    &TableCreated {
                        table_name,
                        success: false,
                        error: Some(e.to_string()),
                    },
                )
                .ok();
        }
    }
}

/// A client's asynchronous answer to `request_table_schema`: create the
/// table then kick off a full sync, same as the synchronous path above.
async fn handle_table_schema_response(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<TableSchemaResponse>,
) {
    let wrapped = CreateTableFromSchema {
        table_name: event.table_name,
        schema: event.schema,
        is_initial_sync: true,
        database_type: None,
    };
    handle_create_table_from_schema(socket, state, session, Data(wrapped)).await;
}

async fn handle_full_data_sync_response(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<FullDataSyncResponse>,
) {
    let bound = match bound_tenant(&session).await {
        Some(b) => b,
        None => return,
    };
    let business_type = event
        .business_type
        .as_deref()
        .and_then(BusinessType::parse)
        .unwrap_or(BusinessType::Retail);

    session.lock().await.core.full_sync_active = true;

    let mut imported = 0u64;
    for row in &event.data {
        let Some(object) = row.as_object() else {
            continue;
        };
        let mut payload = replbridge_core::payload::FlatRow::new();
        for (k, v) in object {
            payload.insert(k.clone(), json_scalar_to_string(v));
        }
        let row_op = replbridge_core::row_op::RowOp {
            store_id: bound.store_id.clone(),
            app_id: bound.app_id.clone(),
            database: bound.database.clone(),
            table_name: event.table_name.clone(),
            op: replbridge_core::row_op::RowOperation::Insert,
            payload,
            business_type,
            sync_id: event.original_sync_id.clone(),
        };
        match dispatcher::execute_row_op_with_mode(&state, &row_op, InsertMode::InsertOrSkip).await {
            Ok(_) => imported += 1,
            Err(e) => tracing::warn!(table = %event.table_name, error = %e, "bootstrap row failed"),
        }
    }

    socket
        .emit(
            "full_data_sync_progress",
            &FullDataSyncProgress {
                table_name: event.table_name.clone(),
                current_batch: event.current_batch,
                total_batches: event.total_batches,
                rows_imported: imported,
            },
        )
        .ok();

    if event.is_last_batch {
        session.lock().await.core.full_sync_active = false;
        socket
            .emit(
                "full_data_sync_complete",
                &FullDataSyncComplete {
                    table_name: event.table_name,
                    total_rows: event.total_rows,
                },
            )
            .ok();
    }
}

fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// `force_sync_request{action:"drop_all_tables"}`. The reference
/// implementation's log lines for this path reference an unbound
/// `machineName`; this reimplementation logs the session's own
/// `store_id`/`app_id` instead, per §9's design note.
async fn handle_force_sync_request(
    socket: SocketRef,
    _state: AppState,
    session: SharedSession,
    Data(event): Data<ForceSyncRequest>,
) {
    let guard = session.lock().await;
    let Some(bound) = &guard.bound else { return };
    tracing::info!(
        store_id = %bound.store_id,
        app_id = %bound.app_id,
        action = %event.action,
        "force sync requested; client must re-run verify_and_sync_table per table"
    );
    drop(guard);
    socket
        .emit("force_sync_response", &ForceSyncResponse { success: true, error: None })
        .ok();
}

async fn handle_clear_database_tables(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<ClearDatabaseTables>,
) {
    let database = match bound_database(&session).await {
        Some(db) => db,
        None => return,
    };

    let response = match state.store.clear_tables(&database, &event.tables).await {
        Ok(()) => ClearDatabaseResponse { success: true, error: None },
        Err(e) => {
            tracing::warn!(error = %e, "clear_database_tables failed, transaction rolled back");
            ClearDatabaseResponse {
                success: false,
                error: Some(e.to_string()),
            }
        }
    };
    socket.emit("clear_database_response", &response).ok();
}

async fn handle_csv_bulk_upload(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<CsvBulkUpload>,
) {
    let (database, app_id) = match bound_database_and_app(&session).await {
        Some(v) => v,
        None => return,
    };
    let _ = app_id;
    let file_name = event.file_name.clone();
    let table_name = event.table_name.clone();

    let mut guard = session.lock().await;
    let result = csv_bootstrap::handle_single_shot(&state, &mut guard, &database, event).await;
    drop(guard);

    match result {
        Ok(outcome) => {
            socket
                .emit(
                    "csv_bulk_upload_response",
                    &CsvBulkUploadResponse {
                        file_name: file_name.clone(),
                        success: true,
                        error: None,
                    },
                )
                .ok();
            socket
                .emit(
                    "csv_file_import_complete",
                    &CsvFileImportComplete {
                        table_name,
                        file_name,
                        affected_rows: outcome.affected_rows,
                        skipped_rows: outcome.skipped_rows,
                    },
                )
                .ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "csv_bulk_upload failed");
            socket
                .emit(
                    "csv_bulk_upload_response",
                    &CsvBulkUploadResponse {
                        file_name,
                        success: false,
                        error: Some(e.to_string()),
                    },
                )
                .ok();
        }
    }
}

async fn handle_csv_bulk_upload_start(
    socket: SocketRef,
    _state: AppState,
    session: SharedSession,
    Data(event): Data<CsvBulkUploadStart>,
) {
    let Some((_, app_id)) = bound_database_and_app(&session).await else {
        return;
    };
    let mut guard = session.lock().await;
    if let Err(e) = csv_bootstrap::handle_chunk_start(&mut guard, &app_id, event) {
        tracing::warn!(error = %e, "csv_bulk_upload_start failed");
        socket
            .emit(
                "csv_bulk_upload_response",
                &CsvBulkUploadResponse {
                    file_name: String::new(),
                    success: false,
                    error: Some(e.to_string()),
                },
            )
            .ok();
    }
}

async fn handle_csv_bulk_upload_chunk(
    socket: SocketRef,
    state: AppState,
    session: SharedSession,
    Data(event): Data<CsvBulkUploadChunk>,
) {
    let Some((database, app_id)) = bound_database_and_app(&session).await else {
        return;
    };
    let file_name = event.file_name.clone();
    let received = event.chunk_index + 1;
    let total = event.total_chunks;

    let mut guard = session.lock().await;
    let result = csv_bootstrap::handle_chunk(&state, &mut guard, &database, &app_id, event).await;
    drop(guard);

    match result {
        Ok(None) => {
            socket
                .emit(
                    "csv_bulk_import_progress",
                    &CsvBulkImportProgress {
                        file_name,
                        received_chunks: received,
                        total_chunks: total,
                    },
                )
                .ok();
        }
        Ok(Some((table_name, outcome))) => {
            socket
                .emit(
                    "csv_bulk_upload_response",
                    &CsvBulkUploadResponse {
                        file_name: file_name.clone(),
                        success: true,
                        error: None,
                    },
                )
                .ok();
            socket
                .emit(
                    "csv_file_import_complete",
                    &CsvFileImportComplete {
                        table_name,
                        file_name,
                        affected_rows: outcome.affected_rows,
                        skipped_rows: outcome.skipped_rows,
                    },
                )
                .ok();
        }
        Err(e) => {
            tracing::warn!(error = %e, "csv_bulk_upload_chunk failed");
            socket
                .emit(
                    "csv_bulk_upload_response",
                    &CsvBulkUploadResponse {
                        file_name,
                        success: false,
                        error: Some(e.to_string()),
                    },
                )
                .ok();
        }
    }
}

async fn bound_database(session: &SharedSession) -> Option<String> {
    session.lock().await.bound.as_ref().map(|b| b.database.clone())
}

/// The session's identify-time tenant binding, used as the fallback
/// routing identity for ops that omit their own `store_id`/`app_id`.
async fn bound_tenant(session: &SharedSession) -> Option<BoundTenant> {
    session.lock().await.bound.clone()
}

async fn bound_database_and_app(session: &SharedSession) -> Option<(String, String)> {
    let guard = session.lock().await;
    guard.bound.as_ref().map(|b| (b.database.clone(), b.app_id.clone()))
}
