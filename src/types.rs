// # Shared Primitive Types
//
// Strongly-typed newtypes used across the limbo and its collaborators.
// Mirrors the newtype-with-validation pattern used throughout the
// replication subsystem (`ReplicaId::new`, `LogSequenceNumber`) so that
// replica identifiers, LSNs and terms can't be swapped for each other or
// for a bare `u64` by accident.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing the newtypes in this module.
#[derive(Error, Debug)]
pub enum TypeError {
    #[error("invalid replica id '{0}': must be 1-64 alphanumeric/hyphen/underscore characters starting with a letter")]
    InvalidReplicaId(String),
}

/// Identifier of a replica participating in synchronous replication.
///
/// `NIL` in `spec.md` is represented as `Option<ReplicaId>` being `None`
/// wherever the spec calls for it, rather than as a sentinel value here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 64
            && id.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TypeError::InvalidReplicaId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log Sequence Number: a monotonic per-replica WAL write identifier.
///
/// `-1` in `spec.md` ("LSN not yet assigned") is represented as `None`
/// (`Lsn = Option<LogSequenceNumber>`) at call sites rather than as a
/// sentinel, except where the spec's own arithmetic needs a sentinel
/// (e.g. `read_promote`'s `L+1`), where `LogSequenceNumber::next` is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogSequenceNumber(u64);

impl LogSequenceNumber {
    pub const ZERO: LogSequenceNumber = LogSequenceNumber(0);

    pub fn new(lsn: u64) -> Self {
        Self(lsn)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for LogSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LSN({})", self.0)
    }
}

/// Raft consensus term, as observed by the limbo through PROMOTE/DEMOTE
/// requests and the `ConsensusTermSource` collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term(u64);

impl Term {
    pub const ZERO: Term = Term(0);

    pub fn new(term: u64) -> Self {
        Self(term)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_id_validates_format() {
        assert!(ReplicaId::new("replica-01").is_ok());
        assert!(ReplicaId::new("1-invalid").is_err());
        assert!(ReplicaId::new("").is_err());
        assert!(ReplicaId::new("has space").is_err());
    }

    #[test]
    fn lsn_ordering_and_next() {
        let a = LogSequenceNumber::new(10);
        let b = LogSequenceNumber::new(11);
        assert!(a < b);
        assert_eq!(a.next(), b);
    }
}
