//! The binary/session-controller error type. Library errors from
//! `replbridge-core`, `replbridge-store`, and `replbridge-tenant` each
//! carry their own `thiserror` enum; this crate's [`ServerError`] wraps
//! them at the seam where a session handler decides what to emit back
//! to the peer, and `anyhow` takes over only at `main`'s boundary for
//! startup failures that simply need to be logged and turned into a
//! process exit code.

use replbridge_core::CoreError;
use replbridge_store::StoreError;
use replbridge_tenant::TenantError;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("session is not identified")]
    NotIdentified,

    #[error("license gate failed: {0}")]
    LicenseError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload error: {0}")]
    Upload(String),
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Whether the underlying failure is a routing failure (unknown
/// tenant), matching the taxonomy's "Routing" category (§7): the peer
/// gets a per-event error response but the session stays open.
impl ServerError {
    pub fn is_routing(&self) -> bool {
        matches!(self, ServerError::Core(CoreError::Unrouted { .. }))
    }
}
