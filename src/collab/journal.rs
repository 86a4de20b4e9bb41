//! Journal (WAL) collaborator.
//!
//! The limbo never touches disk itself; it submits encoded rows to a
//! journal and is told when they're durable. `spec.md` §6 distinguishes a
//! blocking `write_row` (used for the synchronous PROMOTE/DEMOTE/ROLLBACK
//! paths) from a non-blocking `submit` whose completion is observed later
//! by the confirm retryer task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::limbo::error::{LimboError, LimboResult};
use crate::types::LogSequenceNumber;

/// A handle to a submitted-but-not-yet-durable journal write.
///
/// Cloned freely; all clones observe the same completion.
#[derive(Clone)]
pub struct JournalTicket {
    lsn: LogSequenceNumber,
    complete: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

impl JournalTicket {
    /// The LSN this ticket will complete at, if it succeeds.
    pub fn lsn(&self) -> LogSequenceNumber {
        self.lsn
    }

    /// Non-blocking completion check, matching `spec.md` §4.C's retryer
    /// loop ("Inspect the last in-flight CONFIRM. If not complete: suspend.").
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn succeeded(&self) -> bool {
        self.is_complete() && !self.failed.load(Ordering::Acquire)
    }
}

/// Write-ahead log collaborator.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Blocking durable write, used only by the PROMOTE/DEMOTE/ROLLBACK
    /// paths which hold `promote_latch` (or are single-writer on the
    /// timeout path) across the call.
    async fn write_row(&self, row: Vec<u8>) -> LimboResult<LogSequenceNumber>;

    /// Non-blocking submission; the caller polls the returned ticket (or
    /// awaits `queue_wait`) rather than blocking on completion.
    fn submit(&self, row: Vec<u8>) -> LimboResult<JournalTicket>;

    /// True when the journal cannot currently accept another `submit`.
    fn queue_is_full(&self) -> bool;

    /// True when other tasks are already blocked on journal backpressure.
    fn queue_has_waiters(&self) -> bool;

    /// Suspends the caller until the journal can accept a new submission.
    async fn queue_wait(&self);
}

/// Shared, `'static` state so the completion task spawned by `submit` can
/// outlive the `&self` borrow without reaching for unsafe code.
struct JournalState {
    next_lsn: AtomicU64,
    capacity: usize,
    outstanding: Mutex<usize>,
    waiters: AtomicU64,
    not_full: Notify,
}

/// Minimal in-memory journal used by the demo binary and the test suite.
///
/// Durability is simulated: `submit` marks a ticket complete on the next
/// Tokio scheduling tick, `write_row` completes inline. `capacity` bounds
/// the number of tickets outstanding at once, to exercise the submitter's
/// backpressure path.
pub struct InMemoryJournal {
    state: Arc<JournalState>,
}

impl InMemoryJournal {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(JournalState {
                next_lsn: AtomicU64::new(1),
                capacity,
                outstanding: Mutex::new(0),
                waiters: AtomicU64::new(0),
                not_full: Notify::new(),
            }),
        })
    }
}

impl JournalState {
    fn allocate_lsn(&self) -> LogSequenceNumber {
        LogSequenceNumber::new(self.next_lsn.fetch_add(1, Ordering::AcqRel))
    }

    fn is_full(&self) -> bool {
        *self.outstanding.lock() >= self.capacity
    }

    fn release_slot(&self) {
        let mut outstanding = self.outstanding.lock();
        if *outstanding > 0 {
            *outstanding -= 1;
        }
        drop(outstanding);
        self.not_full.notify_waiters();
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn write_row(&self, _row: Vec<u8>) -> LimboResult<LogSequenceNumber> {
        let lsn = self.state.allocate_lsn();
        tracing::debug!(%lsn, "journal: durable blocking write complete");
        Ok(lsn)
    }

    fn submit(&self, _row: Vec<u8>) -> LimboResult<JournalTicket> {
        if self.queue_is_full() {
            return Err(LimboError::unsupported("journal queue is full"));
        }
        *self.state.outstanding.lock() += 1;
        let lsn = self.state.allocate_lsn();
        let ticket = JournalTicket {
            lsn,
            complete: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
        };
        tokio::spawn({
            let complete = ticket.complete.clone();
            let state = self.state.clone();
            async move {
                tokio::task::yield_now().await;
                complete.store(true, Ordering::Release);
                state.release_slot();
            }
        });
        tracing::debug!(%lsn, "journal: submitted row");
        Ok(ticket)
    }

    fn queue_is_full(&self) -> bool {
        self.state.is_full()
    }

    fn queue_has_waiters(&self) -> bool {
        self.state.waiters.load(Ordering::Acquire) > 0
    }

    async fn queue_wait(&self) {
        if !self.queue_is_full() {
            return;
        }
        self.state.waiters.fetch_add(1, Ordering::AcqRel);
        while self.queue_is_full() {
            self.state.not_full.notified().await;
        }
        self.state.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}
