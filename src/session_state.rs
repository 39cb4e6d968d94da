//! The per-socket wrapper around `replbridge_core::session::SessionState`
//! that also carries the resolved database name and license snapshot
//! once `identify` succeeds, plus the upload-staging directory scoped to
//! this one session.
//!
//! Analogous to the teacher's `Session<Store>`: logic state lives in the
//! pure `replbridge-core` type, this wrapper adds what only the server
//! half needs (I/O handles, resolved routing), and the whole thing is
//! held behind `Arc<Mutex<_>>` the way `tower_sessions::Session` holds
//! its `Arc<Mutex<Option<Record>>>`.

use std::path::PathBuf;
use std::sync::Arc;

use replbridge_core::session::SessionState as CoreSessionState;
use tokio::sync::Mutex;

/// Everything bound to a session once `identify` resolves successfully.
#[derive(Debug, Clone)]
pub struct BoundTenant {
    pub store_id: String,
    pub app_id: String,
    pub database: String,
    pub days_remaining: Option<i64>,
}

#[derive(Debug)]
pub struct ServerSession {
    pub core: CoreSessionState,
    pub bound: Option<BoundTenant>,
    pub uploads_dir: PathBuf,
}

impl ServerSession {
    pub fn new(socket_id: String, uploads_root: &std::path::Path) -> Self {
        Self {
            core: CoreSessionState::new(socket_id.clone()),
            bound: None,
            uploads_dir: uploads_root.join(socket_id),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.core.is_ready() && self.bound.is_some()
    }

    pub fn cancel(&mut self) {
        self.core.cancel();
    }
}

/// Shared handle type every event handler receives: the socket owns one
/// of these, cloned cheaply into each closure.
pub type SharedSession = Arc<Mutex<ServerSession>>;
