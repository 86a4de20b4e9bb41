//! Limbo-specific error taxonomy.
//!
//! Mirrors `spec.md` §7 one variant per error kind, each carrying whatever
//! context a caller needs to decide what to do next (retry, surface to the
//! client, or treat as a fatal split-brain signal).

use thiserror::Error;

use crate::types::{LogSequenceNumber, ReplicaId, Term};

pub type LimboResult<T> = std::result::Result<T, LimboError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimboError {
    /// `append` with no owner claimed (`owner_id == NIL`).
    #[error("synchronous queue has no owner, cannot accept writes")]
    QueueUnclaimed,

    /// `append` from a non-owner while the queue is empty.
    #[error("synchronous queue belongs to a different instance")]
    QueueForeign,

    /// `append` from a non-owner while the queue is non-empty.
    #[error("uncommitted foreign synchronous transactions present in queue")]
    UncommittedForeignSyncTxns,

    /// Entry was rolled back, by cascading rollback or by the filter.
    #[error("transaction was rolled back")]
    SyncRollback,

    /// A waiter's quorum wait timed out and it initiated a rollback.
    #[error("synchronous replication quorum wait timed out at lsn {lsn}")]
    SyncQuorumTimeout { lsn: LogSequenceNumber },

    /// Filter rejected a request whose term or LSN range contradicts local history.
    #[error("split brain detected: {reason}")]
    SplitBrain { reason: String },

    /// Malformed request (zero LSN, zero term, duplicate CONFIRM, zero replica id on non-PROMOTE).
    #[error("unsupported request: {reason}")]
    Unsupported { reason: String },

    /// `wait_empty` ran out of time.
    #[error("timed out waiting for the queue to drain")]
    Timeout,

    /// Cooperative cancellation observed at a suspension point.
    #[error("operation cancelled")]
    Cancelled,

    /// Entry allocation failed.
    #[error("out of memory allocating limbo entry")]
    OutOfMemory,

    /// Referenced a replica that has never acknowledged anything.
    #[error("unknown replica: {0}")]
    UnknownReplica(ReplicaId),

    /// Append attempted while `is_in_rollback` or while frozen for fencing.
    #[error("queue is currently frozen: {reason}")]
    Frozen { reason: String },

    /// A PROMOTE/DEMOTE was submitted while another is already in flight.
    #[error("promote/demote already in progress")]
    PromoteInProgress,
}

impl LimboError {
    pub fn split_brain(reason: impl Into<String>) -> Self {
        LimboError::SplitBrain { reason: reason.into() }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        LimboError::Unsupported { reason: reason.into() }
    }

    pub fn frozen(reason: impl Into<String>) -> Self {
        LimboError::Frozen { reason: reason.into() }
    }

    /// True for errors that represent the normal "transaction did not commit" outcomes,
    /// as opposed to programmer/configuration errors.
    pub fn is_user_visible_failure(&self) -> bool {
        matches!(
            self,
            LimboError::SyncRollback
                | LimboError::SyncQuorumTimeout { .. }
                | LimboError::Cancelled
                | LimboError::QueueForeign
                | LimboError::UncommittedForeignSyncTxns
        )
    }
}

/// `spec.md` §4.F: `term <= promote_greatest_term` on a PROMOTE/DEMOTE is
/// rejected as `SPLIT_BRAIN`.
pub fn term_regression(incoming: Term, known: Term) -> LimboError {
    LimboError::split_brain(format!(
        "term {incoming} does not exceed greatest observed {known}"
    ))
}
