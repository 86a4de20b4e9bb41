//! Queue operations (component A).
//!
//! `spec.md` §4.A. `append`/`abort`/admission. Removal (`remove_head`,
//! `pop_tail`) is exposed `pub(crate)` for `pipeline.rs` and `wait.rs`,
//! which are the only callers that finalize entries.

use std::sync::Arc;

use crate::collab::TxnHandle;
use crate::types::ReplicaId;

use super::entry::{EntryId, EntryKind, LimboEntry};
use super::error::{LimboError, LimboResult};
use super::Limbo;

impl Limbo {
    /// `spec.md` §4.A `append`.
    pub fn append(
        &mut self,
        txn: Arc<dyn TxnHandle>,
        approx_len: usize,
        kind: EntryKind,
        requesting_id: &ReplicaId,
    ) -> LimboResult<EntryId> {
        if self.frozen_reasons.is_frozen() {
            return Err(LimboError::frozen("limbo is read-only"));
        }
        if self.is_in_rollback {
            return Err(LimboError::SyncRollback);
        }
        let Some(owner_id) = self.owner_id.clone() else {
            return Err(LimboError::QueueUnclaimed);
        };
        if requesting_id != &owner_id {
            if self.queue.is_empty() {
                return Err(LimboError::QueueForeign);
            }
            return Err(LimboError::UncommittedForeignSyncTxns);
        }

        let id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        let entry = LimboEntry::new(id, txn, approx_len, kind);
        self.size += approx_len;
        self.queue.push_back(entry);
        let index = self.queue.len() - 1;

        if kind == EntryKind::AckWait && self.entry_to_confirm.is_none() {
            self.entry_to_confirm = Some(index);
            self.ack_count = 0;
        }

        tracing::debug!(%id, approx_len, ?kind, "limbo: appended entry");
        Ok(id)
    }

    /// Non-blocking half of `wait_for_space`; the async wait loop lives on
    /// `LimboHandle::wait_for_space`, which retries on `Timeout`.
    pub fn wait_for_space_check(&self) -> LimboResult<()> {
        if self.max_size == 0 || self.size < self.max_size {
            Ok(())
        } else {
            Err(LimboError::Timeout)
        }
    }

    /// Removes the entry at the front of the queue. Legal for both commit
    /// and rollback finalization.
    pub(crate) fn remove_head(&mut self) -> Option<LimboEntry> {
        let removed = self.queue.pop_front();
        if removed.is_some() {
            self.reindex_after_front_removal();
        }
        removed
    }

    /// Removes the entry at the back of the queue. Per invariant 6, only
    /// legal when that entry is being rolled back (preserves "commits in
    /// order, rollbacks in reverse order").
    pub(crate) fn pop_tail(&mut self) -> Option<LimboEntry> {
        let tail = self.queue.back()?;
        if !tail.is_rollback {
            return None;
        }
        self.queue.pop_back()
    }

    /// `spec.md` §4.A `abort`: pre-WAL rollback of the newest entry.
    pub fn abort(&mut self, id: EntryId) -> LimboResult<()> {
        let Some(entry) = self.queue.back() else {
            return Err(LimboError::unsupported("abort on empty queue"));
        };
        if entry.id != id {
            return Err(LimboError::unsupported("abort only valid on the newest entry"));
        }
        let index = self.queue.len() - 1;
        self.size = self.size.saturating_sub(entry.approx_len);
        self.queue.pop_back();
        if self.entry_to_confirm == Some(index) {
            self.entry_to_confirm = None;
            self.ack_count = 0;
        }
        self.stats.record_rollback();
        self.wait_cond.notify_waiters();
        Ok(())
    }

    /// `entry_to_confirm` is a queue index; removing the front shifts every
    /// remaining index down by one. Recompute/clear, per the resolution of
    /// the weak-reference open question in `SPEC_FULL.md` §3.
    fn reindex_after_front_removal(&mut self) {
        self.entry_to_confirm = match self.entry_to_confirm {
            Some(0) => None,
            Some(i) => Some(i - 1),
            None => None,
        };
    }

    pub(crate) fn first_lsn(&self) -> Option<crate::types::LogSequenceNumber> {
        self.queue.front().and_then(|e| e.lsn)
    }

    pub(crate) fn last_acked_queue_lsn(&self) -> Option<crate::types::LogSequenceNumber> {
        self.queue.iter().rev().find_map(|e| e.lsn)
    }
}
