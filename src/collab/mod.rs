//! Collaborator traits.
//!
//! `spec.md` §1 and §6 name several subsystems as external to the limbo —
//! the WAL/journal, the transaction engine, the vector-clock module, the
//! consensus term source, and the on-wire serializer — and say they are
//! "specified only by interface." This module is that interface layer:
//! one trait per collaborator plus a minimal in-memory implementation good
//! enough to drive the demo binary and the test suite. None of these are
//! meant to be a real storage engine or a real Raft implementation.

pub mod consensus;
pub mod journal;
pub mod serializer;
pub mod txn;

pub use consensus::{ConsensusTermSource, StaticTermSource};
pub use journal::{InMemoryJournal, Journal, JournalTicket};
pub use serializer::{RequestKind, SynchroRequest};
pub use txn::{InMemoryTxn, TxnFlags, TxnHandle, TxnSignature};
