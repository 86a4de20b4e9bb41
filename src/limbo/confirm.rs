//! Confirm submitter and retryer cooperative tasks (components D/E).
//!
//! `spec.md` §4.C. Two long-lived tasks decouple WAL backpressure
//! (submitter blocks on `journal_queue_wait`) from completion dispatch
//! (retryer proceeds as soon as the newest in-flight CONFIRM lands).
//! Spawned by `super::spawn` alongside the actor; both hold only a
//! `LimboHandle`, matching the teacher's cooperative-task framing in
//! `ReplicationManager::start_health_check_task`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::collab::SynchroRequest;
use crate::types::LogSequenceNumber;

use super::{ConfirmEntry, Limbo, LimboHandle};

/// Tasks back off this long when they find nothing to do and can't rely on
/// a `wait_cond` wake (e.g. the retryer, which waits on ticket completion
/// rather than a state change the actor broadcasts).
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

impl Limbo {
    pub(crate) async fn submit_confirm(&mut self, lsn: LogSequenceNumber) {
        let req = SynchroRequest::confirm(self.replica_id.clone(), lsn, self.promote_greatest_term);
        let row = match req.encode() {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(error = %e, "limbo: failed to encode CONFIRM row");
                return;
            }
        };
        match self.journal.submit(row) {
            Ok(ticket) => {
                self.confirm_submits.push_back(ConfirmEntry { lsn, ticket });
                self.wait_cond.notify_waiters();
            }
            Err(e) => tracing::warn!(error = %e, "limbo: CONFIRM submission failed"),
        }
    }

    /// Submitter-loop step, `spec.md` §4.C steps 1-3. Returns whether it
    /// did any work this tick.
    pub(crate) async fn submitter_tick(&mut self) -> bool {
        let last_inflight_lsn = self.confirm_submits.back().map(|c| c.lsn);
        let nothing_to_do = self.confirmed_lsn >= self.volatile_confirmed_lsn
            || last_inflight_lsn.map(|l| l >= self.volatile_confirmed_lsn).unwrap_or(false);
        if nothing_to_do {
            return false;
        }
        if self.journal.queue_is_full() || self.journal.queue_has_waiters() {
            self.journal.queue_wait().await;
        }
        let lsn = self.volatile_confirmed_lsn;
        self.submit_confirm(lsn).await;
        true
    }

    /// Retryer-loop step, `spec.md` §4.C steps 1-3. Only the newest
    /// in-flight CONFIRM is inspected; older ones are superseded and
    /// dropped without being awaited, per the batching rationale.
    pub(crate) async fn retryer_tick(&mut self) -> bool {
        let Some(last) = self.confirm_submits.back() else { return false };
        if !last.ticket.is_complete() {
            return false;
        }
        let entry = self.confirm_submits.pop_back().expect("checked Some above");
        self.confirm_submits.clear();
        if entry.ticket.succeeded() {
            self.read_confirm(entry.lsn).await;
        } else {
            tracing::warn!(
                lsn = %entry.lsn,
                "limbo: CONFIRM WAL write failed, dropping; next CONFIRM supersedes"
            );
        }
        true
    }
}

pub(crate) async fn run_submitter(handle: LimboHandle, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        if !handle.submitter_tick().await {
            tokio::select! {
                _ = handle.notified() => {}
                _ = tokio::time::sleep(IDLE_BACKOFF) => {}
            }
        }
    }
}

pub(crate) async fn run_retryer(handle: LimboHandle, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        if !handle.retryer_tick().await {
            tokio::time::sleep(IDLE_BACKOFF).await;
        }
    }
}
