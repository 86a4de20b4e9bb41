//! Wire serializer for synchro requests.
//!
//! `spec.md` §6 treats the on-wire row format as an external collaborator:
//! the limbo builds a `SynchroRequest` and hands it to a serializer, it
//! never hand-rolls bytes. Rows are also what gets written to the journal
//! and what a replica decodes on the receiving end, so this format doubles
//! as the WAL row shape for CONFIRM/ROLLBACK/PROMOTE/DEMOTE entries.

use serde::{Deserialize, Serialize};

use crate::limbo::error::{LimboError, LimboResult};
use crate::types::{LogSequenceNumber, ReplicaId, Term};

/// Discriminates the four synchro request kinds named in `spec.md` §4.F.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Confirm,
    Rollback,
    Promote,
    Demote,
}

/// A synchronous-replication request, as written to the WAL and replicated
/// to other instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchroRequest {
    pub kind: RequestKind,
    /// Instance whose queue this request targets: the current owner. The
    /// generic filter rejects any request whose `replica_id` doesn't match
    /// `Limbo::owner_id`, so a PROMOTE/DEMOTE must still name the *current*
    /// owner here even though it's about to hand ownership to `origin_id`.
    pub replica_id: ReplicaId,
    /// Instance that originated the request. For CONFIRM/ROLLBACK this is
    /// the same as `replica_id`; for PROMOTE it's the replica being
    /// installed as the new owner (`read_promote` assigns `owner_id` from
    /// this field, not from `replica_id`).
    pub origin_id: ReplicaId,
    /// For CONFIRM/ROLLBACK: the boundary LSN. For PROMOTE: `L+1`, the LSN
    /// just past the last entry being confirmed.
    pub lsn: LogSequenceNumber,
    pub term: Term,
    /// Confirmed vclock snapshot, carried on PROMOTE/DEMOTE so a restarting
    /// instance can reconstruct queue ownership.
    pub confirmed_vclock: Vec<(ReplicaId, LogSequenceNumber)>,
}

impl SynchroRequest {
    pub fn confirm(replica_id: ReplicaId, lsn: LogSequenceNumber, term: Term) -> Self {
        Self {
            kind: RequestKind::Confirm,
            origin_id: replica_id.clone(),
            replica_id,
            lsn,
            term,
            confirmed_vclock: Vec::new(),
        }
    }

    pub fn rollback(replica_id: ReplicaId, lsn: LogSequenceNumber, term: Term) -> Self {
        Self {
            kind: RequestKind::Rollback,
            origin_id: replica_id.clone(),
            replica_id,
            lsn,
            term,
            confirmed_vclock: Vec::new(),
        }
    }

    pub fn promote(
        replica_id: ReplicaId,
        origin_id: ReplicaId,
        lsn: LogSequenceNumber,
        term: Term,
        confirmed_vclock: Vec<(ReplicaId, LogSequenceNumber)>,
    ) -> Self {
        Self { kind: RequestKind::Promote, replica_id, origin_id, lsn, term, confirmed_vclock }
    }

    pub fn demote(
        replica_id: ReplicaId,
        origin_id: ReplicaId,
        lsn: LogSequenceNumber,
        term: Term,
        confirmed_vclock: Vec<(ReplicaId, LogSequenceNumber)>,
    ) -> Self {
        Self { kind: RequestKind::Demote, replica_id, origin_id, lsn, term, confirmed_vclock }
    }

    pub fn encode(&self) -> LimboResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| LimboError::unsupported(format!("encode failure: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> LimboResult<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| LimboError::unsupported(format!("decode failure: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(id: &str) -> ReplicaId {
        ReplicaId::new(id).unwrap()
    }

    #[test]
    fn confirm_round_trips() {
        let req = SynchroRequest::confirm(replica("replica-1"), LogSequenceNumber::new(42), Term::new(3));
        let bytes = req.encode().unwrap();
        let decoded = SynchroRequest::decode(&bytes).unwrap();
        assert_eq!(req, decoded);
    }

    #[test]
    fn promote_carries_vclock() {
        let vclock = vec![(replica("replica-1"), LogSequenceNumber::new(10))];
        let req = SynchroRequest::promote(
            replica("replica-2"),
            replica("replica-1"),
            LogSequenceNumber::new(11),
            Term::new(5),
            vclock.clone(),
        );
        let bytes = req.encode().unwrap();
        let decoded = SynchroRequest::decode(&bytes).unwrap();
        assert_eq!(decoded.confirmed_vclock, vclock);
    }
}
