//! Per-replica LSN tracker (component B).
//!
//! `spec.md` §4.B: a map from replica id to highest acknowledged LSN, plus
//! the `nth_element`/`count_ge` queries the ACK aggregator uses to compute
//! the quorum-confirmable LSN.

use std::collections::HashMap;

use crate::types::{LogSequenceNumber, ReplicaId};

/// Tracks the highest LSN each replica has acknowledged.
#[derive(Debug, Default, Clone)]
pub struct VClock {
    acked: HashMap<ReplicaId, LogSequenceNumber>,
}

impl VClock {
    pub fn new() -> Self {
        Self { acked: HashMap::new() }
    }

    pub fn get(&self, replica: &ReplicaId) -> Option<LogSequenceNumber> {
        self.acked.get(replica).copied()
    }

    /// Monotone update: a no-op if `lsn` does not exceed the replica's
    /// current value. Returns the previous value so callers (the ACK
    /// aggregator) can tell whether this call crossed a threshold.
    pub fn follow(&mut self, replica: ReplicaId, lsn: LogSequenceNumber) -> Option<LogSequenceNumber> {
        let prev = self.acked.get(&replica).copied();
        if prev.map(|p| lsn > p).unwrap_or(true) {
            self.acked.insert(replica, lsn);
        }
        prev
    }

    pub fn size(&self) -> usize {
        self.acked.len()
    }

    /// The `k`-th smallest acknowledged LSN (0-indexed), or `None` if fewer
    /// than `k + 1` replicas have acknowledged anything.
    ///
    /// Per `spec.md` §4.B, the quorum-confirmable LSN is the `k`-th
    /// smallest value with `k = vclock_size - quorum`: the largest LSN
    /// that at least `quorum` replicas have reached.
    pub fn nth_element(&self, k: usize) -> Option<LogSequenceNumber> {
        if k >= self.acked.len() {
            return None;
        }
        let mut values: Vec<LogSequenceNumber> = self.acked.values().copied().collect();
        values.sort_unstable();
        values.get(k).copied()
    }

    /// Number of replicas whose acknowledged LSN is `>= lsn`.
    pub fn count_ge(&self, lsn: LogSequenceNumber) -> usize {
        self.acked.values().filter(|&&v| v >= lsn).count()
    }

    /// Snapshot suitable for embedding in a PROMOTE/DEMOTE request or a
    /// checkpoint.
    pub fn snapshot(&self) -> Vec<(ReplicaId, LogSequenceNumber)> {
        let mut entries: Vec<_> = self.acked.iter().map(|(r, l)| (r.clone(), *l)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// The quorum-confirmable LSN given a quorum size, or `None` if not
    /// enough replicas have acknowledged anything yet.
    pub fn quorum_lsn(&self, quorum: usize) -> Option<LogSequenceNumber> {
        if quorum == 0 || self.acked.len() < quorum {
            return None;
        }
        let k = self.acked.len() - quorum;
        self.nth_element(k)
    }
}
