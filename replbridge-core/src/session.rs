//! Per-connection session state: the identification state machine and
//! the chunked-upload accumulator. Transport and persistence are not
//! this crate's concern; `replbridge-server` owns the actual socket and
//! drives this state machine from its event handlers.

use std::collections::HashMap;
use time::OffsetDateTime;

use crate::pk_policy::BusinessType;

/// The session's identification state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Just accepted; no `identify` event seen yet.
    New,
    /// `identify` received, license check in flight or pending.
    Identifying,
    /// Bound to `(store_id, app_id)` and authorised to dispatch events.
    Ready,
    /// Disconnected; no further events are processed.
    Closed,
}

/// Identity bound to a session once `identify` succeeds.
#[derive(Debug, Clone)]
pub struct Identity {
    pub store_id: String,
    pub app_id: String,
    pub service_type: String,
}

impl Identity {
    /// Whether this identity's service type requires the license gate.
    /// Legacy sessions (anything other than the advanced-report service)
    /// bind only the tenant fields and skip the license check.
    pub fn requires_license_gate(&self) -> bool {
        self.service_type == "advanced_online_report"
    }
}

/// One in-flight chunked CSV upload, scoped to a single session.
#[derive(Debug, Clone)]
pub struct ChunkAccumulator {
    pub tenant_app_id: String,
    pub table_name: String,
    pub file_name: String,
    pub expected_chunks: u32,
    pub received_chunks: HashMap<u32, Vec<u8>>,
    pub total_bytes: u64,
    pub total_rows: u64,
    pub started_at: OffsetDateTime,
}

/// Errors from [`ChunkAccumulator::receive`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk index {index} out of range for upload of {expected} chunks")]
    IndexOutOfRange { index: u32, expected: u32 },
}

impl ChunkAccumulator {
    pub fn new(
        tenant_app_id: String,
        table_name: String,
        file_name: String,
        expected_chunks: u32,
        total_bytes: u64,
        total_rows: u64,
        started_at: OffsetDateTime,
    ) -> Self {
        Self {
            tenant_app_id,
            table_name,
            file_name,
            expected_chunks,
            received_chunks: HashMap::new(),
            total_bytes,
            total_rows,
            started_at,
        }
    }

    /// Record one chunk's bytes. Rejects indices outside `[0,
    /// expected_chunks)`, preserving the invariant that
    /// `received_chunks.len() <= expected_chunks`.
    pub fn receive(&mut self, index: u32, content: Vec<u8>) -> Result<(), ChunkError> {
        if index >= self.expected_chunks {
            return Err(ChunkError::IndexOutOfRange {
                index,
                expected: self.expected_chunks,
            });
        }
        self.received_chunks.insert(index, content);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() as u32 == self.expected_chunks
    }

    /// Reassemble the file bytes in ascending index order. Only
    /// meaningful once `is_complete()` is true.
    pub fn reassemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes as usize);
        for index in 0..self.expected_chunks {
            if let Some(bytes) = self.received_chunks.get(&index) {
                out.extend_from_slice(bytes);
            }
        }
        out
    }
}

/// Key for the per-session chunk-accumulator map: `(app_id, file_name)`.
pub type UploadKey = (String, String);

/// Per-connection session state (spec.md §3's `Session`).
#[derive(Debug, Clone)]
pub struct SessionState {
    pub socket_id: String,
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
    pub business_type: Option<BusinessType>,
    pub full_sync_active: bool,
    pub pending_chunk_uploads: HashMap<UploadKey, ChunkAccumulator>,
}

impl SessionState {
    pub fn new(socket_id: String) -> Self {
        Self {
            socket_id,
            phase: SessionPhase::New,
            identity: None,
            business_type: None,
            full_sync_active: false,
            pending_chunk_uploads: HashMap::new(),
        }
    }

    /// Whether the dispatcher may accept anything beyond `identify`.
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    /// Clear all bookkeeping on disconnect: drop pending chunk
    /// accumulators and the full-sync flag, per the cancellation rule.
    pub fn cancel(&mut self) {
        self.pending_chunk_uploads.clear();
        self.full_sync_active = false;
        self.phase = SessionPhase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_not_ready() {
        let s = SessionState::new("sock-1".into());
        assert!(!s.is_ready());
    }

    #[test]
    fn chunk_accumulator_rejects_out_of_range_index() {
        let mut acc = ChunkAccumulator::new(
            "A".into(),
            "StockItems".into(),
            "stock.csv".into(),
            3,
            100,
            3,
            OffsetDateTime::UNIX_EPOCH,
        );
        assert!(acc.receive(0, vec![1]).is_ok());
        assert_eq!(
            acc.receive(3, vec![2]),
            Err(ChunkError::IndexOutOfRange {
                index: 3,
                expected: 3
            })
        );
    }

    #[test]
    fn chunk_accumulator_reassembles_in_order_regardless_of_arrival_order() {
        let mut acc = ChunkAccumulator::new(
            "A".into(),
            "StockItems".into(),
            "stock.csv".into(),
            3,
            6,
            3,
            OffsetDateTime::UNIX_EPOCH,
        );
        acc.receive(2, vec![b'c']).unwrap();
        acc.receive(0, vec![b'a']).unwrap();
        acc.receive(1, vec![b'b']).unwrap();
        assert!(acc.is_complete());
        assert_eq!(acc.reassemble(), vec![b'a', b'b', b'c']);
    }

    #[test]
    fn cancel_clears_pending_uploads_and_full_sync_flag() {
        let mut s = SessionState::new("sock-1".into());
        s.full_sync_active = true;
        s.pending_chunk_uploads.insert(
            ("A".into(), "f.csv".into()),
            ChunkAccumulator::new(
                "A".into(),
                "T".into(),
                "f.csv".into(),
                1,
                1,
                1,
                OffsetDateTime::UNIX_EPOCH,
            ),
        );
        s.cancel();
        assert!(s.pending_chunk_uploads.is_empty());
        assert!(!s.full_sync_active);
        assert_eq!(s.phase, SessionPhase::Closed);
    }
}
