//! Split-brain / term / LSN-range filter (component H).
//!
//! `spec.md` §4.H: a stateless predicate over confirmed LSN, queue range,
//! owner and greatest observed term. Disabled entirely when `do_validate`
//! is false (own-WAL recovery replay).

use crate::collab::RequestKind;
use crate::types::{LogSequenceNumber, ReplicaId, Term};

use super::error::{LimboError, LimboResult};
use super::Limbo;

impl Limbo {
    /// `spec.md` §4.F prepare step 1: "replica_id == NIL only allowed for
    /// PROMOTE" and "replica_id == owner_id required".
    pub(crate) fn generic_filter(&self, kind: RequestKind, replica_id: Option<&ReplicaId>) -> LimboResult<()> {
        if !self.do_validate {
            return Ok(());
        }
        if replica_id.is_none() && kind != RequestKind::Promote {
            return Err(LimboError::split_brain("replica_id is NIL on a non-PROMOTE request"));
        }
        if let (Some(replica_id), Some(owner_id)) = (replica_id, self.owner_id.as_ref()) {
            if replica_id != owner_id {
                return Err(LimboError::split_brain(format!(
                    "request replica {replica_id} does not match current owner {owner_id}"
                )));
            }
        }
        Ok(())
    }

    /// `spec.md` §4.F prepare step 4.
    pub(crate) fn type_specific_filter(
        &self,
        kind: RequestKind,
        lsn: LogSequenceNumber,
        term: Term,
    ) -> LimboResult<()> {
        if !self.do_validate {
            return Ok(());
        }
        match kind {
            RequestKind::Confirm | RequestKind::Rollback => {
                if lsn == LogSequenceNumber::ZERO {
                    return Err(LimboError::unsupported("zero LSN on CONFIRM/ROLLBACK"));
                }
                self.queue_boundaries(kind, lsn)
            }
            RequestKind::Promote | RequestKind::Demote => {
                if term == Term::ZERO {
                    return Err(LimboError::unsupported("zero term on PROMOTE/DEMOTE"));
                }
                if term <= self.promote_greatest_term {
                    return Err(super::error::term_regression(term, self.promote_greatest_term));
                }
                self.queue_boundaries(kind, lsn)
            }
        }
    }

    /// `spec.md` §4.F `queue_boundaries`.
    pub(crate) fn queue_boundaries(&self, kind: RequestKind, lsn: LogSequenceNumber) -> LimboResult<()> {
        use std::cmp::Ordering as CmpOrdering;
        match lsn.cmp(&self.confirmed_lsn) {
            CmpOrdering::Equal => {
                if matches!(kind, RequestKind::Promote | RequestKind::Demote) {
                    Ok(())
                } else {
                    Err(LimboError::unsupported("duplicate CONFIRM/ROLLBACK at already-confirmed LSN"))
                }
            }
            CmpOrdering::Less => Err(LimboError::split_brain(format!(
                "request lsn {lsn} is below confirmed_lsn {}",
                self.confirmed_lsn
            ))),
            CmpOrdering::Greater => {
                let Some(first) = self.first_lsn() else {
                    return Err(LimboError::split_brain("empty queue cannot satisfy a future LSN"));
                };
                let last = self.last_acked_queue_lsn().unwrap_or(first);
                if first <= lsn && lsn <= last {
                    Ok(())
                } else {
                    Err(LimboError::split_brain(format!(
                        "request lsn {lsn} outside queue range [{first}, {last}]"
                    )))
                }
            }
        }
    }
}
