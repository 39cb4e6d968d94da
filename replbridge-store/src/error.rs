//! Error taxonomy for the Target-Store Access Layer, distinguishing
//! retryable from non-retryable conditions so the dispatcher can decide
//! retry-once-after-rebuild vs. report-and-continue without
//! string-matching driver errors (see design doc §7).

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The connection pool for a database could not be acquired from or
    /// could not be rebuilt; retryable once, per §7.
    #[error("pool unavailable for database `{database}`: {source}")]
    PoolUnavailable {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// A duplicate-key or other constraint violation on a write that was
    /// not eligible for upsert/skip handling.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A non-retryable input problem (missing table, bad column list).
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem error while staging/cleaning a CSV upload.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Every bulk-load delivery probe failed.
    #[error("bulk load failed: {0}")]
    BulkLoadFailed(String),

    /// An otherwise-uncategorised driver error.
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether retrying the operation once, after rebuilding the pool,
    /// is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::PoolUnavailable { .. })
    }

    /// Classify a raw `sqlx::Error` as either a pool/connection problem
    /// (retryable) or an integrity violation (duplicate key).
    pub fn from_execute_error(database: &str, err: sqlx::Error) -> Self {
        if is_duplicate_key(&err) {
            StoreError::Integrity(err.to_string())
        } else if matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            StoreError::PoolUnavailable {
                database: database.to_string(),
                source: err,
            }
        } else {
            StoreError::Sqlx(err)
        }
    }
}

/// MySQL error code 1062 is `ER_DUP_ENTRY`.
pub const DUPLICATE_KEY_ERROR_CODE: &str = "1062";

pub fn is_duplicate_key(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == DUPLICATE_KEY_ERROR_CODE || code == "23000";
        }
    }
    false
}
