//! The CSV Bootstrap Pipeline's server-side orchestration: single-shot
//! and chunked upload ingress, file persistence under the per-session
//! uploads directory, and driving the target store's `import_csv` once
//! a file is fully on disk. Design doc §4.6.

use std::path::{Path, PathBuf};

use base64::Engine;
use replbridge_core::session::ChunkAccumulator;
use replbridge_store::BulkLoadOptions;
use time::OffsetDateTime;

use crate::app_state::AppState;
use crate::error::{ServerError, ServerResult};
use crate::events::{CsvBulkUpload, CsvBulkUploadChunk, CsvBulkUploadStart};
use crate::session_state::ServerSession;

/// The outcome of a completed import, used to build the
/// `csv_file_import_complete` event.
pub struct ImportOutcome {
    pub affected_rows: u64,
    pub skipped_rows: u64,
}

async fn ensure_uploads_dir(dir: &Path) -> ServerResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

fn decode_base64(content: &str) -> ServerResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(content)
        .map_err(|e| ServerError::Upload(format!("invalid base64 content: {e}")))
}

/// Single-shot ingress: decode, persist, verify size, then import.
pub async fn handle_single_shot(
    state: &AppState,
    session: &mut ServerSession,
    database: &str,
    event: CsvBulkUpload,
) -> ServerResult<ImportOutcome> {
    ensure_uploads_dir(&session.uploads_dir).await?;
    let bytes = decode_base64(&event.file_content)?;

    if bytes.len() as u64 != event.file_size_bytes {
        tracing::warn!(
            file_name = %event.file_name,
            declared = event.file_size_bytes,
            actual = bytes.len(),
            "csv upload size mismatch"
        );
    }

    let file_path = session.uploads_dir.join(&event.file_name);
    tokio::fs::write(&file_path, &bytes).await?;

    let outcome = run_import(state, database, &event.table_name, &file_path).await;
    cleanup(&file_path).await;
    outcome
}

/// `csv_bulk_upload_start`: create the chunk accumulator keyed by
/// `(app_id, file_name)`.
pub fn handle_chunk_start(
    session: &mut ServerSession,
    app_id: &str,
    event: CsvBulkUploadStart,
) -> ServerResult<()> {
    let key = (app_id.to_string(), event.file_name.clone());
    let accumulator = ChunkAccumulator::new(
        app_id.to_string(),
        event.table_name,
        event.file_name,
        event.total_chunks,
        event.file_size_bytes,
        event.row_count,
        OffsetDateTime::now_utc(),
    );
    session.core.pending_chunk_uploads.insert(key, accumulator);
    Ok(())
}

/// `csv_bulk_upload_chunk`: store one chunk; when the accumulator is
/// complete, reassemble to disk, destroy the accumulator, and import.
/// Returns `Some` once the file has been fully imported.
pub async fn handle_chunk(
    state: &AppState,
    session: &mut ServerSession,
    database: &str,
    app_id: &str,
    event: CsvBulkUploadChunk,
) -> ServerResult<Option<(String, ImportOutcome)>> {
    let key = (app_id.to_string(), event.file_name.clone());
    let table_name = {
        let accumulator = session
            .core
            .pending_chunk_uploads
            .get_mut(&key)
            .ok_or_else(|| {
                ServerError::Upload(format!(
                    "no pending upload for file `{}`",
                    event.file_name
                ))
            })?;

        let bytes = decode_base64(&event.chunk_content)?;
        accumulator
            .receive(event.chunk_index, bytes)
            .map_err(|e| ServerError::Upload(e.to_string()))?;

        if !accumulator.is_complete() {
            return Ok(None);
        }
        accumulator.table_name.clone()
    };

    // Invariant above confirmed completeness; take ownership of the
    // accumulator so its bytes can be reassembled and the map entry
    // destroyed, matching the lifecycle in the design doc.
    let accumulator = session.core.pending_chunk_uploads.remove(&key).unwrap();
    ensure_uploads_dir(&session.uploads_dir).await?;
    let file_path = session.uploads_dir.join(&event.file_name);
    tokio::fs::write(&file_path, accumulator.reassemble()).await?;

    let outcome = run_import(state, database, &table_name, &file_path).await;
    cleanup(&file_path).await;
    outcome.map(|o| Some((table_name, o)))
}

/// Drives `import_csv`, retrying transient pool failures up to
/// `full_sync_retry_attempts` times (design doc §6/§7); a non-retryable
/// error or the final attempt's error is returned as-is.
async fn run_import(
    state: &AppState,
    database: &str,
    table: &str,
    file_path: &PathBuf,
) -> ServerResult<ImportOutcome> {
    let options = BulkLoadOptions {
        secure_file_priv_dir: state.config.secure_file_priv_dir.clone(),
    };
    let attempts = state.config.bulk.full_sync_retry_attempts.max(1);

    let mut last_err = None;
    for attempt in 1..=attempts {
        match state.store.import_csv(database, table, file_path, &options).await {
            Ok(outcome) => {
                return Ok(ImportOutcome {
                    affected_rows: outcome.affected_rows,
                    skipped_rows: outcome.skipped_rows,
                });
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    table,
                    attempt,
                    attempts,
                    error = %e,
                    "bulk import failed on a retryable error, retrying"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_err.expect("loop always runs at least once").into())
}

/// Bootstrap never implicitly truncates; it only ever unlinks its own
/// staged upload after import, success or failure.
async fn cleanup(file_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(file_path).await {
        tracing::warn!(path = %file_path.display(), error = %e, "failed to unlink uploaded csv file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CsvBulkUploadChunk;

    #[test]
    fn decode_base64_rejects_garbage() {
        let err = decode_base64("not valid base64 !!!").unwrap_err();
        assert!(matches!(err, ServerError::Upload(_)));
    }

    #[test]
    fn decode_base64_accepts_round_trip() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"hello");
        let decoded = decode_base64(&encoded).expect("valid base64");
        assert_eq!(decoded, b"hello");
    }

    #[tokio::test]
    async fn handle_chunk_start_registers_accumulator() {
        let mut session = ServerSession::new("socket-1".to_string(), Path::new("/tmp/uploads"));
        handle_chunk_start(
            &mut session,
            "app-1",
            CsvBulkUploadStart {
                table_name: "Stock".to_string(),
                file_name: "stock.csv".to_string(),
                total_chunks: 2,
                file_size_bytes: 100,
                row_count: 10,
            },
        )
        .expect("registers accumulator");

        assert!(session
            .core
            .pending_chunk_uploads
            .contains_key(&("app-1".to_string(), "stock.csv".to_string())));
    }

    #[tokio::test]
    async fn handle_chunk_rejects_unknown_upload() {
        let state = AppState::test_fixture();
        let mut session = ServerSession::new("socket-1".to_string(), Path::new("/tmp/uploads"));

        let err = handle_chunk(
            &state,
            &mut session,
            "tenant_db",
            "app-1",
            CsvBulkUploadChunk {
                table_name: "Stock".to_string(),
                file_name: "never-started.csv".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                chunk_content: base64::engine::general_purpose::STANDARD.encode(b"a,b\n1,2\n"),
                is_last_chunk: true,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::Upload(_)));
    }

    #[tokio::test]
    async fn handle_chunk_waits_for_remaining_chunks() {
        let state = AppState::test_fixture();
        let mut session = ServerSession::new("socket-1".to_string(), Path::new("/tmp/uploads"));
        handle_chunk_start(
            &mut session,
            "app-1",
            CsvBulkUploadStart {
                table_name: "Stock".to_string(),
                file_name: "stock.csv".to_string(),
                total_chunks: 2,
                file_size_bytes: 16,
                row_count: 1,
            },
        )
        .unwrap();

        let outcome = handle_chunk(
            &state,
            &mut session,
            "tenant_db",
            "app-1",
            CsvBulkUploadChunk {
                table_name: "Stock".to_string(),
                file_name: "stock.csv".to_string(),
                chunk_index: 0,
                total_chunks: 2,
                chunk_content: base64::engine::general_purpose::STANDARD.encode(b"a,b\n"),
                is_last_chunk: false,
            },
        )
        .await
        .expect("first of two chunks is accepted");

        assert!(outcome.is_none());
        assert!(session
            .core
            .pending_chunk_uploads
            .contains_key(&("app-1".to_string(), "stock.csv".to_string())));
    }
}
