//! Synchro request pipeline (component F).
//!
//! `spec.md` §4.F: two-phase prepare/commit/rollback for PROMOTE/DEMOTE,
//! single-phase for CONFIRM/ROLLBACK. `process` is the convenience
//! entrypoint (`begin+prepare+commit`) used by `LimboCommand::Process`;
//! `prepare`/`commit`/`rollback` stay exposed individually for callers
//! that need to hold `promote_latch` across an external synchronous WAL
//! write (`spec.md` §9's blocking-WAL-write note).

use crate::collab::{RequestKind, SynchroRequest, TxnSignature};
use crate::types::{LogSequenceNumber, ReplicaId, Term};

use super::error::{LimboError, LimboResult};
use super::Limbo;

impl Limbo {
    /// `spec.md` §4.F `process(req)`: begin + prepare + commit, panicking
    /// on a PROMOTE/DEMOTE/ROLLBACK WAL-write failure per §7/§9 (no
    /// invented retry policy).
    pub async fn process(&mut self, req: SynchroRequest) -> LimboResult<()> {
        self.begin(req.kind)?;
        if let Err(e) = self.prepare(&req).await {
            self.rollback(&req).await;
            return Err(e);
        }

        let fatal_on_failure = matches!(
            req.kind,
            RequestKind::Promote | RequestKind::Demote | RequestKind::Rollback
        );
        let write_result = self.journal.write_row(req.encode()?).await;
        match write_result {
            Ok(_lsn) => {
                self.commit(&req).await;
                Ok(())
            }
            Err(e) if fatal_on_failure => {
                tracing::error!(error = %e, kind = ?req.kind, "limbo: fatal synchro WAL write failure");
                panic!("unrecoverable WAL write failure for {:?}: {e}", req.kind);
            }
            Err(e) => {
                self.rollback(&req).await;
                Err(e)
            }
        }
    }

    fn begin(&mut self, kind: RequestKind) -> LimboResult<()> {
        if matches!(kind, RequestKind::Promote | RequestKind::Demote) && self.promote_latch {
            return Err(LimboError::PromoteInProgress);
        }
        if matches!(kind, RequestKind::Promote | RequestKind::Demote) {
            self.promote_latch = true;
        }
        Ok(())
    }

    /// `spec.md` §4.F `prepare(req)`.
    pub(crate) async fn prepare(&mut self, req: &SynchroRequest) -> LimboResult<()> {
        self.generic_filter(req.kind, Some(&req.replica_id))?;

        if self.is_in_rollback {
            return Err(LimboError::unsupported("another synchro request is already in flight"));
        }
        self.is_in_rollback = true;

        self.wait_tail_persisted().await;

        self.type_specific_filter(req.kind, req.lsn, req.term)?;

        match req.kind {
            RequestKind::Confirm | RequestKind::Rollback => {
                self.is_in_rollback = false;
            }
            RequestKind::Promote | RequestKind::Demote => {
                self.svp_confirmed_lsn = Some(self.volatile_confirmed_lsn);
                self.volatile_confirmed_lsn = req.lsn;
            }
        }
        Ok(())
    }

    /// "Wait persisted": while the tail of the queue has no LSN yet, wait
    /// for a WAL-write trigger so the range filter only ever sees real
    /// LSNs (`spec.md` §4.F prepare step 3).
    async fn wait_tail_persisted(&self) {
        loop {
            match self.queue.back() {
                Some(entry) if entry.lsn.is_none() => {
                    let notified = self.wait_cond.notified();
                    if self.queue.back().map(|e| e.lsn.is_none()).unwrap_or(false) {
                        notified.await;
                    }
                }
                _ => return,
            }
        }
    }

    /// `spec.md` §4.F `commit(req)`, called after the durable WAL write.
    pub(crate) async fn commit(&mut self, req: &SynchroRequest) {
        self.svp_confirmed_lsn = None;
        self.is_in_rollback = false;

        if matches!(req.kind, RequestKind::Promote | RequestKind::Demote) {
            let prior_term = self.promote_term_map.get(&req.origin_id).copied().unwrap_or(Term::ZERO);
            if req.term > prior_term {
                self.promote_term_map.insert(req.origin_id.clone(), req.term);
                if req.term > self.promote_greatest_term {
                    self.promote_greatest_term = req.term;
                }
            }
            if req.kind == RequestKind::Promote {
                let raft_term = self.term_source.volatile_term().await;
                if req.term >= raft_term {
                    self.frozen_reasons.clear_fencing();
                }
                self.frozen_reasons.clear_until_promotion();
            }
        }

        if !req.confirmed_vclock.is_empty() {
            self.confirmed_vclock = req.confirmed_vclock.iter().cloned().collect();
        }

        match req.kind {
            RequestKind::Confirm => self.read_confirm(req.lsn).await,
            RequestKind::Rollback => self.read_rollback(req.lsn).await,
            RequestKind::Promote => self.read_promote(req.origin_id.clone(), req.lsn).await,
            RequestKind::Demote => self.read_demote(req.lsn).await,
        }

        if matches!(req.kind, RequestKind::Promote | RequestKind::Demote) {
            self.promote_latch = false;
        }
        self.wait_cond.notify_waiters();
    }

    /// `spec.md` §4.F `rollback(req)`: the commit decided not to proceed
    /// (e.g. external WAL-write failure for a non-fatal request type).
    pub(crate) async fn rollback(&mut self, req: &SynchroRequest) {
        if matches!(req.kind, RequestKind::Promote | RequestKind::Demote) {
            if let Some(svp) = self.svp_confirmed_lsn.take() {
                self.volatile_confirmed_lsn = svp;
            }
            self.promote_latch = false;
        }
        self.is_in_rollback = false;
        self.wait_cond.notify_waiters();
    }

    /// `spec.md` §4.F `read_confirm(L)`: commit-finalizer.
    pub(crate) async fn read_confirm(&mut self, lsn: LogSequenceNumber) {
        enum Step {
            /// Entry's write is durable and covered by this CONFIRM.
            Commit,
            /// Async entry whose write is still in flight (case (b)): not
            /// finalized, just demoted to a plain async txn.
            Detach,
        }

        loop {
            let step = match self.queue.front() {
                Some(entry) if entry.is_ack_wait() => match entry.lsn {
                    Some(entry_lsn) if entry_lsn > LogSequenceNumber::ZERO && entry_lsn <= lsn => Some(Step::Commit),
                    _ => None,
                },
                Some(entry) if matches!(entry.txn.signature(), TxnSignature::Unknown) => Some(Step::Detach),
                Some(_) => Some(Step::Commit),
                None => None,
            };
            match step {
                Some(Step::Commit) => {
                    let Some(mut entry) = self.remove_head() else { break };
                    let lag = entry.insertion_time.elapsed();
                    entry.finalize_commit(entry.lsn.unwrap_or(lsn)).await;
                    self.stats.record_confirm_lag(lag);
                }
                Some(Step::Detach) => {
                    let Some(entry) = self.remove_head() else { break };
                    entry.detach_as_plain_async();
                }
                None => break,
            }
        }

        if lsn > self.confirmed_lsn {
            self.confirmed_lsn = lsn;
            if let Some(owner_id) = self.owner_id.clone() {
                self.confirmed_vclock.insert(owner_id, lsn);
            }
        }
        self.wait_cond.notify_waiters();
    }

    /// `spec.md` §4.F `read_rollback(L)`: rolls back every ACK-wait entry
    /// with `lsn >= L`. Two passes, mirroring `txn_limbo_read_rollback`:
    /// first scan from the tail to find the furthest-forward ACK-wait
    /// entry still `>= L` (skipping interspersed async entries, stopping
    /// at the first ACK-wait entry below `L`), then pop everything from
    /// the tail down to and including that boundary — async entries
    /// caught in that range are rolled back too, not left dangling.
    pub(crate) async fn read_rollback(&mut self, lsn: LogSequenceNumber) {
        let mut boundary = None;
        for (index, entry) in self.queue.iter().enumerate().rev() {
            if !entry.is_ack_wait() {
                continue;
            }
            match entry.lsn {
                Some(entry_lsn) if entry_lsn >= lsn => boundary = Some(index),
                _ => break,
            }
        }
        let Some(boundary) = boundary else {
            self.wait_cond.notify_waiters();
            return;
        };

        while self.queue.len() > boundary {
            // Mark rollback before popping so `pop_tail`'s invariant check passes.
            if let Some(entry) = self.queue.back_mut() {
                entry.is_rollback = true;
            }
            let Some(mut entry) = self.pop_tail() else { break };
            entry.finalize_rollback(TxnSignature::SyncRollback).await;
            self.stats.record_rollback();
        }
        if self.entry_to_confirm.map(|i| i >= self.queue.len()).unwrap_or(false) {
            self.entry_to_confirm = None;
            self.ack_count = 0;
        }
        self.wait_cond.notify_waiters();
    }

    /// `spec.md` §4.F `read_promote(owner, L)` = `read_confirm(L)` then
    /// `read_rollback(L+1)`, then installs the new owner.
    pub(crate) async fn read_promote(&mut self, new_owner: ReplicaId, lsn: LogSequenceNumber) {
        self.read_confirm(lsn).await;
        self.read_rollback(lsn.next()).await;

        self.owner_id = Some(new_owner.clone());
        self.confirmed_lsn = self.confirmed_vclock.get(&new_owner).copied().unwrap_or(LogSequenceNumber::ZERO);
        self.volatile_confirmed_lsn = self.confirmed_lsn;
        self.entry_to_confirm = None;
        self.ack_count = 0;
        debug_assert!(self.queue.is_empty(), "read_promote must leave the queue empty");
        tracing::info!(new_owner = %new_owner, confirmed_lsn = %self.confirmed_lsn, "limbo: promote applied");
    }

    /// DEMOTE: conceptually PROMOTE with `owner = NIL` (`spec.md` §4.F
    /// request-types note).
    pub(crate) async fn read_demote(&mut self, lsn: LogSequenceNumber) {
        self.read_confirm(lsn).await;
        self.read_rollback(lsn.next()).await;

        self.owner_id = None;
        self.entry_to_confirm = None;
        self.ack_count = 0;
        tracing::info!("limbo: demote applied, queue unclaimed");
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::EntryKind;
    use super::super::tests::new_test_limbo;
    use crate::collab::{InMemoryTxn, SynchroRequest, TxnFlags};
    use crate::types::{LogSequenceNumber, ReplicaId, Term};

    #[tokio::test]
    async fn read_confirm_finalizes_in_queue_order() {
        let mut limbo = new_test_limbo();
        let txn_a = InMemoryTxn::new(TxnFlags::WAIT_ACK);
        let txn_b = InMemoryTxn::new(TxnFlags::WAIT_ACK);
        let idx_a = limbo
            .append(txn_a.clone(), 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap())
            .unwrap();
        let idx_b = limbo
            .append(txn_b.clone(), 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap())
            .unwrap();
        limbo.assign_local_lsn(idx_a, LogSequenceNumber::new(10)).await.unwrap();
        limbo.assign_local_lsn(idx_b, LogSequenceNumber::new(11)).await.unwrap();

        limbo.read_confirm(LogSequenceNumber::new(11)).await;

        assert!(txn_a.await_outcome().await);
        assert!(txn_b.await_outcome().await);
        assert!(limbo.queue.is_empty());
        assert_eq!(limbo.confirmed_lsn, LogSequenceNumber::new(11));
    }

    #[tokio::test]
    async fn promote_prepare_then_rollback_restores_volatile_confirmed_lsn() {
        let mut limbo = new_test_limbo();
        limbo.volatile_confirmed_lsn = LogSequenceNumber::new(3);
        let snapshot = limbo.volatile_confirmed_lsn;

        let req = SynchroRequest::promote(
            ReplicaId::new("r1").unwrap(),
            ReplicaId::new("r2").unwrap(),
            LogSequenceNumber::ZERO,
            Term::new(1),
            Vec::new(),
        );
        limbo.prepare(&req).await.unwrap();
        assert_eq!(limbo.volatile_confirmed_lsn, LogSequenceNumber::ZERO);
        assert!(limbo.is_in_rollback);

        limbo.rollback(&req).await;

        assert_eq!(limbo.volatile_confirmed_lsn, snapshot);
        assert!(limbo.svp_confirmed_lsn.is_none());
        assert!(!limbo.promote_latch);
        assert!(!limbo.is_in_rollback);
    }

    #[tokio::test]
    async fn promote_split_brain_is_rejected_and_state_is_unchanged() {
        let mut limbo = new_test_limbo();
        limbo.promote_greatest_term = Term::new(5);
        let snapshot_term = limbo.promote_greatest_term;
        let snapshot_owner = limbo.owner_id.clone();

        let req = SynchroRequest::promote(
            ReplicaId::new("r1").unwrap(),
            ReplicaId::new("r2").unwrap(),
            LogSequenceNumber::new(1),
            Term::new(5),
            Vec::new(),
        );
        let err = limbo.process(req).await.unwrap_err();
        assert!(matches!(err, crate::limbo::LimboError::SplitBrain { .. }));
        assert_eq!(limbo.promote_greatest_term, snapshot_term);
        assert_eq!(limbo.owner_id, snapshot_owner);
    }
}
