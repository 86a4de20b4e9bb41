//! `LimboEntry`: one queued prepared transaction.
//!
//! `spec.md` §3: `{ txn, approx_len, lsn, insertion_time, is_commit,
//! is_rollback }`. The cyclic-reference note in §9 ("implement as owning
//! `txn -> entry` via the queue, non-owning back reference cleared on
//! removal") is resolved by never giving the entry back to the caller by
//! reference: callers hold an opaque `EntryId`, and the actor resolves it
//! against its own `VecDeque` by linear scan on every command, so there is
//! no back-pointer to clear and no raw index that could outlive a removal.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::collab::{TxnFlags, TxnHandle, TxnSignature};
use crate::types::LogSequenceNumber;

/// Stable identifier for a queued entry, assigned at `append` time and
/// never reused. Unlike a `VecDeque` index, it stays meaningful after
/// entries ahead of it are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry#{}", self.0)
    }
}

/// Whether an entry participates in quorum tracking or merely rides along
/// until a CONFIRM passes over it (`spec.md` §4.F `read_confirm` case (b)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Requires `WAIT_ACK`: counted by the ACK aggregator, can only finalize
    /// via quorum CONFIRM or cascading rollback.
    AckWait,
    /// Local-only / already quorum-exempt; finalized as soon as a CONFIRM
    /// with `lsn >= entry.lsn` passes over it, without contributing to
    /// `ack_count`.
    Async,
}

pub struct LimboEntry {
    pub id: EntryId,
    pub txn: Arc<dyn TxnHandle>,
    pub approx_len: usize,
    pub lsn: Option<LogSequenceNumber>,
    pub insertion_time: Instant,
    pub is_commit: bool,
    pub is_rollback: bool,
    pub kind: EntryKind,
}

impl LimboEntry {
    pub fn new(id: EntryId, txn: Arc<dyn TxnHandle>, approx_len: usize, kind: EntryKind) -> Self {
        Self {
            id,
            txn,
            approx_len,
            lsn: None,
            insertion_time: Instant::now(),
            is_commit: false,
            is_rollback: false,
            kind,
        }
    }

    pub fn is_ack_wait(&self) -> bool {
        self.kind == EntryKind::AckWait
    }

    pub fn is_finalized(&self) -> bool {
        self.is_commit || self.is_rollback
    }

    /// Marks the entry committed and detaches it from the transaction
    /// engine's perspective (per §4.F `read_confirm`: "detach, clear sync
    /// flags, call `complete(txn, success=true)`"). Does not remove it from
    /// the queue; that's the caller's responsibility.
    pub async fn finalize_commit(&mut self, lsn: LogSequenceNumber) {
        self.is_commit = true;
        self.txn.set_signature(TxnSignature::Assigned(lsn));
        self.txn.complete_success().await;
    }

    pub async fn finalize_rollback(&mut self, signature: TxnSignature) {
        self.is_rollback = true;
        self.txn.set_signature(signature);
        self.txn.complete_fail().await;
    }

    /// `spec.md` §4.F `read_confirm` case (b): an async entry whose WAL
    /// write is still in flight when a CONFIRM passes over it. It is not
    /// finalized here — just clears its sync-wait flag and leaves it to
    /// complete normally once its own write lands.
    pub fn detach_as_plain_async(&self) {
        let mut flags = self.txn.flags();
        flags.remove(TxnFlags::WAIT_SYNC);
        self.txn.set_flags(flags);
    }
}

impl std::fmt::Debug for LimboEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimboEntry")
            .field("lsn", &self.lsn)
            .field("approx_len", &self.approx_len)
            .field("is_commit", &self.is_commit)
            .field("is_rollback", &self.is_rollback)
            .field("kind", &self.kind)
            .finish()
    }
}
