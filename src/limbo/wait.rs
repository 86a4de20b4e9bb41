//! Wait/complete protocol and cascading rollback (component G).
//!
//! `spec.md` §4.G. The actor side of `wait_complete`: decides, on every
//! poll from a `LimboHandle::wait_complete` caller, whether the entry is
//! still pending, covered by an in-flight CONFIRM, someone else's problem
//! (not the front-most ack-wait entry), or ripe for this caller to
//! initiate a cascading rollback.

use crate::collab::{SynchroRequest, TxnSignature};
use crate::types::LogSequenceNumber;

use super::entry::EntryId;
use super::error::LimboResult;
use super::Limbo;

/// Result of one `check_complete` poll. The actual success/failure value
/// is read by the caller off the transaction handle once `Finalized` is
/// reported — see `LimboHandle::wait_complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Pending,
    Finalized,
}

/// Maps the transaction's terminal signature to the `wait_complete`
/// result the original caller expects.
pub fn signature_to_result(signature: TxnSignature) -> LimboResult<()> {
    match signature {
        TxnSignature::SyncRollback => Err(super::error::LimboError::SyncRollback),
        TxnSignature::QuorumTimeout(lsn) => Err(super::error::LimboError::SyncQuorumTimeout { lsn }),
        TxnSignature::Assigned(_) | TxnSignature::Unknown => Ok(()),
    }
}

impl Limbo {
    /// `spec.md` §4.G `wait_complete`, actor side. An entry id absent from
    /// the queue has already been finalized (entries are removed from the
    /// queue exactly once, at finalization) so that's treated as done too.
    pub(crate) async fn check_complete(&mut self, id: EntryId) -> WaitOutcome {
        let Some(index) = self.queue.iter().position(|e| e.id == id) else {
            return WaitOutcome::Finalized;
        };

        if self.frozen_reasons.is_frozen() {
            // Freeze suspends liveness: ignore the timeout entirely.
            return WaitOutcome::Pending;
        }

        let elapsed = self.queue[index].insertion_time.elapsed();
        if elapsed < self.sync_timeout {
            return WaitOutcome::Pending;
        }

        // Only the first waiting ACK-wait entry may initiate rollback;
        // everyone else behind it just yield-waits for that to happen.
        let first_ack_wait = self.queue.iter().position(|e| e.is_ack_wait() && !e.is_finalized());
        if first_ack_wait != Some(index) {
            return WaitOutcome::Pending;
        }

        let Some(entry_lsn) = self.queue[index].lsn else {
            return WaitOutcome::Pending;
        };
        if entry_lsn <= self.volatile_confirmed_lsn {
            // A CONFIRM covering this LSN is already in flight.
            return WaitOutcome::Pending;
        }

        self.initiate_cascading_rollback(entry_lsn).await;
        WaitOutcome::Finalized
    }

    /// `spec.md` §4.G final bullet: write a ROLLBACK WAL row for the
    /// timed-out entry's LSN, then walk the queue from the tail down to
    /// (and including) that entry in reverse, marking each
    /// `QUORUM_TIMEOUT` and completing it with failure.
    async fn initiate_cascading_rollback(&mut self, boundary_lsn: LogSequenceNumber) {
        let req = SynchroRequest::rollback(self.replica_id.clone(), boundary_lsn, self.promote_greatest_term);
        let row = match req.encode() {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(error = %e, "limbo: failed to encode timeout ROLLBACK row");
                return;
            }
        };

        // §7/§9: ROLLBACK WAL-write failures are fatal, no retry policy.
        if let Err(e) = self.journal.write_row(row).await {
            tracing::error!(error = %e, %boundary_lsn, "limbo: fatal ROLLBACK WAL write failure");
            panic!("unrecoverable WAL write failure for ROLLBACK at {boundary_lsn}: {e}");
        }

        loop {
            let should_take = match self.queue.back() {
                Some(entry) if entry.is_ack_wait() && !entry.is_finalized() => {
                    entry.lsn.map(|lsn| lsn >= boundary_lsn).unwrap_or(false)
                }
                _ => false,
            };
            if !should_take {
                break;
            }
            if let Some(entry) = self.queue.back_mut() {
                entry.is_rollback = true;
            }
            let Some(mut entry) = self.pop_tail() else { break };
            entry.finalize_rollback(TxnSignature::QuorumTimeout(boundary_lsn)).await;
            self.stats.record_rollback();
        }
        self.wait_cond.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::EntryKind;
    use super::super::tests::new_test_limbo;
    use super::*;
    use crate::collab::{InMemoryTxn, TxnFlags};
    use crate::types::{LogSequenceNumber, ReplicaId};
    use std::time::Duration;

    #[tokio::test]
    async fn timeout_triggers_cascading_rollback_in_reverse_order() {
        let mut limbo = new_test_limbo();
        limbo.sync_timeout = Duration::from_millis(1);

        let txn_a = InMemoryTxn::new(TxnFlags::WAIT_ACK);
        let txn_b = InMemoryTxn::new(TxnFlags::WAIT_ACK);
        let id_a = limbo.append(txn_a.clone(), 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap()).unwrap();
        let id_b = limbo.append(txn_b.clone(), 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap()).unwrap();
        limbo.assign_local_lsn(id_a, LogSequenceNumber::new(12)).await.unwrap();
        limbo.assign_local_lsn(id_b, LogSequenceNumber::new(13)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = limbo.check_complete(id_a).await;
        assert_eq!(outcome, WaitOutcome::Finalized);
        assert!(limbo.queue.is_empty());
        assert!(!txn_a.await_outcome().await);
        assert!(!txn_b.await_outcome().await);
    }

    #[tokio::test]
    async fn non_front_entry_yield_waits() {
        let mut limbo = new_test_limbo();
        limbo.sync_timeout = Duration::from_millis(1);

        let txn_a = InMemoryTxn::new(TxnFlags::WAIT_ACK);
        let txn_b = InMemoryTxn::new(TxnFlags::WAIT_ACK);
        let id_a = limbo.append(txn_a.clone(), 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap()).unwrap();
        let id_b = limbo.append(txn_b.clone(), 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap()).unwrap();
        limbo.assign_local_lsn(id_a, LogSequenceNumber::new(12)).await.unwrap();
        limbo.assign_local_lsn(id_b, LogSequenceNumber::new(13)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = limbo.check_complete(id_b).await;
        assert_eq!(outcome, WaitOutcome::Pending);
        assert_eq!(limbo.queue.len(), 2);
    }
}
