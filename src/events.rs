//! Wire event payloads (design doc §6). These are the `serde`-derived
//! shapes Socket.IO hands the session controller on each named event;
//! decoding `recordData`/`payload` further into a flat column map is
//! `replbridge_core::payload`'s job, not this module's.

use serde::{Deserialize, Serialize};

fn default_encoding() -> String {
    "json".to_string()
}

fn default_timestamp() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub store_id: String,
    pub app_id: String,
    pub service_type: String,
}

/// `sync_data`: one incremental row-level CRUD delta. `store_id`/`app_id`
/// are carried per-event so each op can be routed on its own rather than
/// trusting the identify-time binding; absent, they fall back to the
/// session's bound tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncData {
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    pub table_name: String,
    pub operation: String,
    pub record_data: String,
    #[serde(default = "default_encoding")]
    pub record_encoding: String,
    pub business_type: String,
    pub sync_id: String,
    #[serde(with = "time::serde::rfc3339", default = "default_timestamp")]
    pub timestamp: time::OffsetDateTime,
}

/// `batch_sync`: an array of the same shape as `sync_data`, applied in
/// arrival order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSync {
    pub operations: Vec<SyncData>,
}

/// `sync_ddl_operation`. `store_id`/`app_id` are required on this event
/// (unlike `sync_data`'s) and resolved to a database per-op, same as a
/// row-op.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDdlOperation {
    pub store_id: String,
    pub app_id: String,
    pub table_name: String,
    pub operation: String,
    pub sql_command: String,
    pub sync_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAndSyncTable {
    pub table_name: String,
    #[serde(default)]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSchemaWire {
    #[serde(rename = "COLUMN_NAME")]
    pub column_name: String,
    #[serde(rename = "DATA_TYPE")]
    pub data_type: String,
    #[serde(rename = "CHARACTER_MAXIMUM_LENGTH")]
    pub character_maximum_length: Option<i64>,
    #[serde(rename = "NUMERIC_PRECISION")]
    pub numeric_precision: Option<i64>,
    #[serde(rename = "NUMERIC_SCALE")]
    pub numeric_scale: Option<i64>,
    #[serde(rename = "IS_NULLABLE")]
    pub is_nullable: String,
    #[serde(rename = "COLUMN_DEFAULT")]
    pub column_default: Option<String>,
    #[serde(default, rename = "IS_IDENTITY")]
    pub is_identity: i32,
    #[serde(default, rename = "COLUMN_KEY")]
    pub column_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchemaWire {
    pub index_name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchemaWire {
    pub columns: Vec<ColumnSchemaWire>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexSchemaWire>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableFromSchema {
    pub table_name: String,
    pub schema: TableSchemaWire,
    #[serde(default)]
    pub is_initial_sync: bool,
    #[serde(default)]
    pub database_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchemaResponse {
    pub table_name: String,
    pub schema: TableSchemaWire,
    pub original_sync_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullDataSyncResponse {
    pub table_name: String,
    pub data: Vec<serde_json::Value>,
    pub current_batch: u32,
    pub total_batches: u32,
    pub total_rows: u64,
    pub is_last_batch: bool,
    pub original_sync_id: String,
    #[serde(default)]
    pub business_type: Option<String>,
}

pub type InitialSyncDataResponse = FullDataSyncResponse;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceSyncRequest {
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDatabaseTables {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvBulkUpload {
    pub table_name: String,
    pub file_name: String,
    pub file_content: String,
    pub file_size_bytes: u64,
    #[serde(default)]
    pub row_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvBulkUploadStart {
    pub table_name: String,
    pub file_name: String,
    pub total_chunks: u32,
    pub file_size_bytes: u64,
    #[serde(default)]
    pub row_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvBulkUploadChunk {
    pub table_name: String,
    pub file_name: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub chunk_content: String,
    pub is_last_chunk: bool,
}

// --- server -> peer ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub store_id: String,
    pub app_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseExpired {
    pub code: u16,
    pub message: String,
    pub days_remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub sync_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DdlSyncSuccess {
    pub sync_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DdlSyncError {
    pub sync_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAndSyncResponse {
    pub table_name: String,
    pub exists: bool,
    pub needs_sync: bool,
    pub row_count: u64,
    #[serde(rename = "useCSVSync")]
    pub use_csv_sync: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCreated {
    pub table_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullDataSyncProgress {
    pub table_name: String,
    pub current_batch: u32,
    pub total_batches: u32,
    pub rows_imported: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullDataSyncComplete {
    pub table_name: String,
    pub total_rows: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvBulkUploadResponse {
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvBulkImportProgress {
    pub file_name: String,
    pub received_chunks: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvFileImportComplete {
    pub table_name: String,
    pub file_name: String,
    pub affected_rows: u64,
    pub skipped_rows: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDatabaseResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceSyncResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_deserializes_camel_case_wire_fields() {
        let event: Identify = serde_json::from_str(
            r#"{"storeId":"239","appId":"A","serviceType":"advanced_online_report"}"#,
        )
        .expect("camelCase wire payload");
        assert_eq!(event.store_id, "239");
        assert_eq!(event.app_id, "A");
        assert_eq!(event.service_type, "advanced_online_report");
    }

    #[test]
    fn sync_data_deserializes_camel_case_wire_fields() {
        let event: SyncData = serde_json::from_str(
            r#"{"tableName":"SalesDetail","operation":"INSERT","recordData":"{}","businessType":"retail","syncId":"s1"}"#,
        )
        .expect("camelCase wire payload");
        assert_eq!(event.table_name, "SalesDetail");
        assert_eq!(event.sync_id, "s1");
        assert_eq!(event.record_encoding, "json");
        assert_eq!(event.store_id, None);
        assert_eq!(event.app_id, None);
    }

    #[test]
    fn sync_data_carries_its_own_store_and_app_id_when_present() {
        let event: SyncData = serde_json::from_str(
            r#"{"storeId":"239","appId":"A","tableName":"SalesDetail","operation":"INSERT","recordData":"{}","businessType":"retail","syncId":"s1"}"#,
        )
        .expect("camelCase wire payload");
        assert_eq!(event.store_id.as_deref(), Some("239"));
        assert_eq!(event.app_id.as_deref(), Some("A"));
    }

    #[test]
    fn sync_ddl_operation_requires_store_and_app_id() {
        let event: SyncDdlOperation = serde_json::from_str(
            r#"{"storeId":"239","appId":"A","tableName":"Sales","operation":"DDL_ALTER_TABLE","sqlCommand":"ALTER TABLE Sales ADD Note VARCHAR(50) NULL","syncId":"s1"}"#,
        )
        .expect("camelCase wire payload");
        assert_eq!(event.store_id, "239");
        assert_eq!(event.app_id, "A");
    }

    #[test]
    fn verify_and_sync_response_serializes_use_csv_sync_with_spec_casing() {
        let response = VerifyAndSyncResponse {
            table_name: "StockItems".to_string(),
            exists: false,
            needs_sync: true,
            row_count: 0,
            use_csv_sync: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"useCSVSync\":true"));
    }

    #[test]
    fn sync_response_serializes_sync_id_as_camel_case() {
        let response = SyncResponse {
            sync_id: "s1".to_string(),
            success: true,
            result: None,
            error: None,
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"syncId\":\"s1\""));
    }
}
