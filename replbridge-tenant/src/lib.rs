//! The License/Tenant Service.
//!
//! Authorisation and routing are fused because the same authoritative
//! lookup answers both: this guarantees a session can't reach the
//! dispatcher without being routable to exactly one database. Two
//! backends share the [`TenantDirectory`] trait the way
//! `tower_sessions_core::SessionStore` lets multiple stores share one
//! call site: a static file-backed directory (the spec's default) and,
//! behind the `sql-backed` feature, a SQL-table-backed one for
//! deployments that keep the tenant directory in a shared database.

use async_trait::async_trait;
use time::OffsetDateTime;

#[cfg(feature = "file-backed")]
pub mod file_directory;
#[cfg(feature = "sql-backed")]
pub mod sql_directory;

#[cfg(feature = "file-backed")]
pub use file_directory::FileTenantDirectory;
#[cfg(feature = "sql-backed")]
pub use sql_directory::SqlTenantDirectory;

/// A tenant record as read from the directory. Read-only: owned by an
/// external administrative system.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantRecord {
    pub store_id: String,
    pub store_name: String,
    pub app_id: String,
    pub license_expire: OffsetDateTime,
}

/// The outcome of a [`TenantDirectory::validate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub expired: bool,
    pub store_info: Option<TenantRecord>,
    /// `ceil((expire - now) / 1 day)`, populated only when `valid`.
    pub days_remaining: Option<i64>,
    pub error: Option<String>,
}

impl Validation {
    fn not_found() -> Self {
        Self {
            valid: false,
            expired: true,
            store_info: None,
            days_remaining: None,
            error: Some("store not found or invalid app".to_string()),
        }
    }
}

/// Errors surfaced by a tenant directory backend.
#[derive(thiserror::Error, Debug)]
pub enum TenantError {
    #[error("tenant directory I/O error: {0}")]
    Io(String),
    #[error("tenant directory parse error: {0}")]
    Parse(String),
    #[error("tenant directory backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, TenantError>;

/// The License/Tenant Service's interface. Object-safe so the server can
/// hold `Arc<dyn TenantDirectory>` regardless of which backend is wired.
#[async_trait]
pub trait TenantDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Is `(store_id, app_id)` a valid, routable pair, and is its license
    /// still current?
    async fn validate(&self, store_id: &str, app_id: &str) -> Result<Validation>;

    /// The physical database name for `(store_id, app_id)`, or `None` if
    /// the pair does not exist. Equal to `app_id` when the pair exists.
    async fn database_for(&self, store_id: &str, app_id: &str) -> Result<Option<String>>;

    /// Re-read/re-query the backing source to confirm it's reachable.
    async fn health_check(&self) -> Result<()>;

    /// Release any held resources (connections, file handles).
    async fn close(&self) -> Result<()>;
}

/// Shared validation logic once a backend has resolved a candidate
/// [`TenantRecord`]: every backend's `validate` should funnel through
/// this so the expiry/`days_remaining` computation lives in one place.
pub fn evaluate(record: Option<TenantRecord>, now: OffsetDateTime) -> Validation {
    let Some(record) = record else {
        return Validation::not_found();
    };

    let expired = record.license_expire <= now;
    let days_remaining = if expired {
        None
    } else {
        let remaining = record.license_expire - now;
        let whole_days = remaining.whole_days();
        let remainder = remaining - time::Duration::days(whole_days);
        Some(if remainder > time::Duration::ZERO {
            whole_days + 1
        } else {
            whole_days
        })
    };

    Validation {
        valid: !expired,
        expired,
        days_remaining,
        store_info: Some(record),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn missing_record_is_invalid_and_expired() {
        let v = evaluate(None, datetime!(2026-01-01 00:00:00 UTC));
        assert!(!v.valid);
        assert!(v.expired);
        assert_eq!(v.error.as_deref(), Some("store not found or invalid app"));
    }

    #[test]
    fn expired_license_is_invalid() {
        let record = TenantRecord {
            store_id: "239".into(),
            store_name: "Store 239".into(),
            app_id: "A".into(),
            license_expire: datetime!(2020-01-01 00:00:00 UTC),
        };
        let v = evaluate(Some(record), datetime!(2026-01-01 00:00:00 UTC));
        assert!(!v.valid);
        assert!(v.expired);
        assert!(v.days_remaining.is_none());
    }

    #[test]
    fn valid_license_reports_days_remaining_rounded_up() {
        let record = TenantRecord {
            store_id: "239".into(),
            store_name: "Store 239".into(),
            app_id: "A".into(),
            license_expire: datetime!(2026-01-02 12:00:00 UTC),
        };
        let v = evaluate(Some(record), datetime!(2026-01-01 00:00:00 UTC));
        assert!(v.valid);
        assert_eq!(v.days_remaining, Some(2));
    }
}
