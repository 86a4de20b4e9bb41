//! ACK aggregator (components B/C).
//!
//! `spec.md` §4.B: translates replica acks and local WAL completions into
//! an advancing `entry_to_confirm`/`ack_count`, and `confirm_scan`'s walk
//! over contiguous quorum-reached entries.

use crate::types::{LogSequenceNumber, ReplicaId};

use super::entry::EntryId;
use super::error::{LimboError, LimboResult};
use super::Limbo;

impl Limbo {
    /// `spec.md` §4.B `ack`.
    pub async fn ack(&mut self, replica_id: ReplicaId, lsn: LogSequenceNumber) -> LimboResult<()> {
        if self.queue.is_empty() || self.frozen_reasons.is_frozen() || self.is_in_rollback {
            return Ok(());
        }
        let prev = self.vclock.follow(replica_id, lsn);
        if prev.map(|p| lsn <= p).unwrap_or(false) {
            return Ok(());
        }

        if let Some(index) = self.entry_to_confirm {
            if let Some(target_lsn) = self.queue.get(index).and_then(|e| e.lsn) {
                let prev_below = prev.map(|p| p < target_lsn).unwrap_or(true);
                if prev_below && lsn >= target_lsn {
                    self.ack_count += 1;
                    if self.ack_count >= self.quorum {
                        self.confirm_scan().await;
                    }
                }
            }
        }
        Ok(())
    }

    /// `spec.md` §4.B `assign_local_lsn`.
    pub async fn assign_local_lsn(&mut self, id: EntryId, lsn: LogSequenceNumber) -> LimboResult<()> {
        let replica_id = self.replica_id.clone();
        let index = self
            .queue
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| LimboError::unsupported("unknown entry"))?;
        {
            let entry = &mut self.queue[index];
            entry.lsn = Some(lsn);
            entry.txn.on_wal_write(lsn).await;
        }
        self.vclock.follow(replica_id, lsn);
        self.wait_cond.notify_waiters();

        if self.entry_to_confirm == Some(index) {
            self.ack_count = self.vclock.count_ge(lsn);
            if self.ack_count >= self.quorum {
                self.confirm_scan().await;
            }
        }
        Ok(())
    }

    /// `spec.md` §4.B `assign_remote_lsn`: records LSN only; remote-owned
    /// entries are finalized by an incoming CONFIRM, not local quorum.
    pub fn assign_remote_lsn(&mut self, id: EntryId, lsn: LogSequenceNumber) -> LimboResult<()> {
        let entry = self
            .queue
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| LimboError::unsupported("unknown entry"))?;
        entry.lsn = Some(lsn);
        self.wait_cond.notify_waiters();
        Ok(())
    }

    /// `spec.md` §4.B `confirm_scan`: advances `entry_to_confirm` forward
    /// over contiguous ACK-wait entries whose LSN has reached quorum, then
    /// hands the maximum covered LSN to `confirm_lsn`.
    pub(crate) async fn confirm_scan(&mut self) {
        let Some(quorum_lsn) = self.vclock.quorum_lsn(self.quorum) else { return };
        let Some(mut index) = self.entry_to_confirm else { return };
        let mut covered = None;

        loop {
            let Some(entry) = self.queue.get(index) else { break };
            if !entry.is_ack_wait() {
                index += 1;
                continue;
            }
            match entry.lsn {
                Some(lsn) if lsn <= quorum_lsn => {
                    covered = Some(lsn);
                    index += 1;
                }
                _ => break,
            }
        }

        // Find the next not-yet-covered ACK-wait entry to become the new
        // entry_to_confirm (may be None if the queue is exhausted).
        self.entry_to_confirm = self.queue.iter().enumerate().skip(index).find_map(|(i, e)| {
            if e.is_ack_wait() {
                Some(i)
            } else {
                None
            }
        });
        self.ack_count = 0;
        if let Some(new_index) = self.entry_to_confirm {
            if let Some(lsn) = self.queue.get(new_index).and_then(|e| e.lsn) {
                self.ack_count = self.vclock.count_ge(lsn);
            }
        }

        if let Some(lsn) = covered {
            self.confirm_lsn(lsn).await;
        }
    }

    /// `spec.md` §4.C `confirm_lsn(L)` fast path: advance
    /// `volatile_confirmed_lsn` and submit inline if the journal has room,
    /// otherwise let the submitter task pick it up.
    pub(crate) async fn confirm_lsn(&mut self, lsn: LogSequenceNumber) {
        if lsn <= self.volatile_confirmed_lsn {
            return;
        }
        self.volatile_confirmed_lsn = lsn;
        tracing::debug!(%lsn, "limbo: volatile_confirmed_lsn advanced");
        if !self.journal.queue_is_full() {
            self.submit_confirm(lsn).await;
        } else {
            self.wait_cond.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::EntryKind;
    use super::super::tests::new_test_limbo;
    use crate::collab::InMemoryTxn;
    use crate::types::{LogSequenceNumber, ReplicaId};

    #[tokio::test]
    async fn ack_is_idempotent_and_monotone() {
        let mut limbo = new_test_limbo();
        let txn = InMemoryTxn::new(crate::collab::TxnFlags::WAIT_ACK);
        let index = limbo
            .append(txn, 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap())
            .unwrap();
        limbo.assign_local_lsn(index, LogSequenceNumber::new(10)).await.unwrap();

        limbo.ack(ReplicaId::new("r2").unwrap(), LogSequenceNumber::new(10)).await.unwrap();
        assert_eq!(limbo.vclock.get(&ReplicaId::new("r2").unwrap()), Some(LogSequenceNumber::new(10)));

        // Lower/equal ack is a no-op.
        limbo.ack(ReplicaId::new("r2").unwrap(), LogSequenceNumber::new(5)).await.unwrap();
        assert_eq!(limbo.vclock.get(&ReplicaId::new("r2").unwrap()), Some(LogSequenceNumber::new(10)));
    }

    #[tokio::test]
    async fn quorum_ack_advances_volatile_confirmed_lsn() {
        let mut limbo = new_test_limbo();
        let txn = InMemoryTxn::new(crate::collab::TxnFlags::WAIT_ACK);
        let index = limbo
            .append(txn, 10, EntryKind::AckWait, &ReplicaId::new("r1").unwrap())
            .unwrap();
        limbo.assign_local_lsn(index, LogSequenceNumber::new(10)).await.unwrap();
        assert_eq!(limbo.volatile_confirmed_lsn, LogSequenceNumber::ZERO);

        limbo.ack(ReplicaId::new("r2").unwrap(), LogSequenceNumber::new(10)).await.unwrap();
        assert_eq!(limbo.volatile_confirmed_lsn, LogSequenceNumber::new(10));
    }
}
