//! Consensus/term-source collaborator.
//!
//! `spec.md` §6: the limbo reads the "volatile term" (the term this
//! instance currently believes it is in) from an external consensus
//! subsystem but never writes to it. Kept as a one-method trait so a real
//! Raft or Paxos term tracker can be dropped in without the limbo knowing
//! the difference.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::types::Term;

#[async_trait]
pub trait ConsensusTermSource: Send + Sync {
    /// The term this instance currently believes it is in.
    async fn volatile_term(&self) -> Term;
}

/// A term source that never changes on its own; tests and the demo binary
/// bump it explicitly with `set`.
pub struct StaticTermSource {
    term: AtomicU64,
}

impl StaticTermSource {
    pub fn new(term: Term) -> Self {
        Self { term: AtomicU64::new(term.value()) }
    }

    pub fn set(&self, term: Term) {
        self.term.store(term.value(), Ordering::Release);
    }
}

#[async_trait]
impl ConsensusTermSource for StaticTermSource {
    async fn volatile_term(&self) -> Term {
        Term::new(self.term.load(Ordering::Acquire))
    }
}
