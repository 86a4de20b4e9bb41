//! Transaction-engine collaborator.
//!
//! The limbo shepherds transactions it does not own: it only needs to flip
//! a few flags, set a signature, and call back into the engine when a
//! transaction's fate is decided. `spec.md` §6 lists the flags
//! (`WAIT_SYNC`, `WAIT_ACK`, `IS_DONE`), the completion calls
//! (`complete_success`/`complete_fail`), the triggers (`on_commit`,
//! `on_rollback`, `on_wal_write`) and the `signature` field.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::types::LogSequenceNumber;

/// Bitset of transaction flags relevant to the limbo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnFlags(u8);

impl TxnFlags {
    pub const NONE: TxnFlags = TxnFlags(0);
    /// Transaction must wait for a durable WAL write before it's visible.
    pub const WAIT_SYNC: TxnFlags = TxnFlags(1 << 0);
    /// Transaction must wait for quorum ACK before it's considered committed.
    pub const WAIT_ACK: TxnFlags = TxnFlags(1 << 1);
    /// Transaction has reached a terminal state (commit or rollback).
    pub const IS_DONE: TxnFlags = TxnFlags(1 << 2);

    pub fn contains(self, other: TxnFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TxnFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TxnFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for TxnFlags {
    type Output = TxnFlags;
    fn bitor(self, rhs: TxnFlags) -> TxnFlags {
        TxnFlags(self.0 | rhs.0)
    }
}

/// The terminal (or not-yet-terminal) disposition of a transaction, as
/// tracked by `LimboEntry::is_commit`/`is_rollback` but mirrored onto the
/// transaction handle itself so external code can read it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnSignature {
    /// WAL write is still in flight; no disposition yet.
    Unknown,
    /// WAL-assigned LSN; the transaction wrote successfully.
    Assigned(LogSequenceNumber),
    /// Rolled back by the limbo (filter rejection or cascading rollback).
    SyncRollback,
    /// Rolled back because a quorum wait timed out, at the LSN that was
    /// the rollback boundary.
    QuorumTimeout(LogSequenceNumber),
}

/// A prepared transaction as seen by the limbo.
///
/// Implementations live in the transaction engine; the limbo only ever
/// calls through this trait.
#[async_trait]
pub trait TxnHandle: Send + Sync + std::fmt::Debug {
    fn flags(&self) -> TxnFlags;
    fn set_flags(&self, flags: TxnFlags);
    fn signature(&self) -> TxnSignature;
    fn set_signature(&self, signature: TxnSignature);

    /// Called when the transaction's local WAL write completes, carrying
    /// the LSN it was assigned.
    async fn on_wal_write(&self, lsn: LogSequenceNumber);

    /// Finalizes the transaction as committed, waking whatever client task
    /// is blocked on its outcome.
    async fn complete_success(&self);

    /// Finalizes the transaction as rolled back.
    async fn complete_fail(&self);
}

/// Simple in-memory transaction handle for the demo binary and tests.
#[derive(Debug)]
pub struct InMemoryTxn {
    flags: AtomicU8,
    signature: parking_lot::Mutex<TxnSignature>,
    done: Notify,
    outcome: parking_lot::Mutex<Option<bool>>,
}

impl InMemoryTxn {
    pub fn new(flags: TxnFlags) -> Arc<Self> {
        Arc::new(Self {
            flags: AtomicU8::new(flags.0),
            signature: parking_lot::Mutex::new(TxnSignature::Unknown),
            done: Notify::new(),
            outcome: parking_lot::Mutex::new(None),
        })
    }

    /// Awaits the transaction's terminal outcome: `Some(true)` for commit,
    /// `Some(false)` for rollback. Used by tests that need to observe the
    /// effect of `complete_success`/`complete_fail` without going through
    /// `wait_complete`.
    pub async fn await_outcome(&self) -> bool {
        loop {
            if let Some(outcome) = *self.outcome.lock() {
                return outcome;
            }
            self.done.notified().await;
        }
    }
}

#[async_trait]
impl TxnHandle for InMemoryTxn {
    fn flags(&self) -> TxnFlags {
        TxnFlags(self.flags.load(Ordering::Acquire))
    }

    fn set_flags(&self, flags: TxnFlags) {
        self.flags.store(flags.0, Ordering::Release);
    }

    fn signature(&self) -> TxnSignature {
        *self.signature.lock()
    }

    fn set_signature(&self, signature: TxnSignature) {
        *self.signature.lock() = signature;
    }

    async fn on_wal_write(&self, lsn: LogSequenceNumber) {
        self.set_signature(TxnSignature::Assigned(lsn));
    }

    async fn complete_success(&self) {
        let mut flags = self.flags();
        flags.insert(TxnFlags::IS_DONE);
        self.set_flags(flags);
        *self.outcome.lock() = Some(true);
        self.done.notify_waiters();
    }

    async fn complete_fail(&self) {
        let mut flags = self.flags();
        flags.insert(TxnFlags::IS_DONE);
        self.set_flags(flags);
        *self.outcome.lock() = Some(false);
        self.done.notify_waiters();
    }
}
