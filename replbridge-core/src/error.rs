//! Error taxonomy shared across the replication bridge.
//!
//! The variants mirror the taxonomy from the design doc: validation
//! failures are non-retryable and reported per-event; routing failures
//! mean the session couldn't be mapped to a database; translation
//! failures are DDL-shape specific.

/// Errors produced by the pure dispatch/translation logic in this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A required primary-key column was missing from the payload.
    #[error("missing required column `{column}` for table `{table}` ({op})")]
    MissingPrimaryKeyColumn {
        table: String,
        column: String,
        op: &'static str,
    },

    /// The wire payload could not be decoded into a flat column map.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// `(storeId, appId)` did not resolve to a physical database.
    #[error("no database routed for store `{store_id}` / app `{app_id}`")]
    Unrouted { store_id: String, app_id: String },

    /// The DDL command shape is not representable in the target dialect.
    #[error("unsupported DDL shape: {0}")]
    UnsupportedDdl(String),

    /// A chunked upload accumulator received more chunks than declared,
    /// or an index outside `[0, expected_chunks)`.
    #[error("chunk index {index} out of range for upload of {expected} chunks")]
    ChunkIndexOutOfRange { index: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, CoreError>;
