//! The limbo: synchronous-replication commit coordinator.
//!
//! Runs as a single-owner actor task (`spec.md` §9's "prefer actor-style"
//! note): one `tokio::task` owns a `Limbo` value and drains `LimboCommand`s
//! from an `mpsc` channel one at a time, the same shape the teacher uses
//! for `replication::manager::ReplicationManager`'s shutdown signalling and
//! `EventPublisher::subscribe`'s request/response-over-channel pattern.
//! Because exactly one task ever touches `Limbo`'s fields, every method in
//! this module tree takes `&mut self`/`&self` with no internal locking —
//! the actor boundary *is* the mutual exclusion.

pub mod ack;
pub mod confirm;
pub mod entry;
pub mod error;
pub mod filter;
pub mod freeze;
pub mod pipeline;
pub mod queue;
pub mod stats;
pub mod vclock;
pub mod wait;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use crate::collab::{ConsensusTermSource, Journal, JournalTicket, SynchroRequest, TxnHandle};
use crate::config::LimboConfig;
use crate::types::{LogSequenceNumber, ReplicaId, Term};

pub use entry::{EntryId, EntryKind, LimboEntry};
pub use error::{LimboError, LimboResult};
pub use freeze::FrozenReasons;
pub use stats::LimboStats;
pub use vclock::VClock;

/// An in-flight CONFIRM write, tracked so the retryer can inspect only the
/// newest one (`spec.md` §4.C: "only the *last* in-flight CONFIRM matters").
pub struct ConfirmEntry {
    pub lsn: LogSequenceNumber,
    pub ticket: JournalTicket,
}

/// The coordinator's full state. Lives exclusively inside the actor task
/// spawned by `spawn`; every field here is private to the crate because
/// only `limbo::*` component modules (via `impl Limbo` blocks spread across
/// this directory) and the actor loop touch it directly.
pub struct Limbo {
    pub(crate) replica_id: ReplicaId,
    pub(crate) owner_id: Option<ReplicaId>,
    pub(crate) queue: VecDeque<LimboEntry>,
    pub(crate) next_entry_id: u64,
    pub(crate) size: usize,
    pub(crate) max_size: usize,
    pub(crate) vclock: VClock,
    pub(crate) confirmed_vclock: HashMap<ReplicaId, LogSequenceNumber>,
    pub(crate) confirmed_lsn: LogSequenceNumber,
    pub(crate) volatile_confirmed_lsn: LogSequenceNumber,
    pub(crate) entry_to_confirm: Option<usize>,
    pub(crate) ack_count: usize,
    pub(crate) promote_term_map: HashMap<ReplicaId, Term>,
    pub(crate) promote_greatest_term: Term,
    pub(crate) is_in_rollback: bool,
    pub(crate) svp_confirmed_lsn: Option<LogSequenceNumber>,
    pub(crate) frozen_reasons: FrozenReasons,
    pub(crate) do_validate: bool,
    pub(crate) stats: LimboStats,
    pub(crate) wait_cond: Arc<Notify>,
    pub(crate) promote_latch: bool,
    pub(crate) confirm_submits: VecDeque<ConfirmEntry>,
    pub(crate) quorum: usize,
    pub(crate) sync_timeout: Duration,
    pub(crate) journal: Arc<dyn Journal>,
    pub(crate) term_source: Arc<dyn ConsensusTermSource>,
}

/// Serializable snapshot of the state that survives ownership changes,
/// per `spec.md` §6's "Persisted state" note: only `confirmed_vclock` and
/// the promote-term bookkeeping are checkpointed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LimboCheckpoint {
    pub confirmed_vclock: Vec<(ReplicaId, LogSequenceNumber)>,
    pub promote_greatest_term: Term,
    pub promote_term_map: Vec<(ReplicaId, Term)>,
}

impl Limbo {
    pub fn new(
        replica_id: ReplicaId,
        journal: Arc<dyn Journal>,
        term_source: Arc<dyn ConsensusTermSource>,
        config: &LimboConfig,
    ) -> Self {
        Self {
            replica_id,
            owner_id: None,
            queue: VecDeque::new(),
            next_entry_id: 0,
            size: 0,
            max_size: config.max_size,
            vclock: VClock::new(),
            confirmed_vclock: HashMap::new(),
            confirmed_lsn: LogSequenceNumber::ZERO,
            volatile_confirmed_lsn: LogSequenceNumber::ZERO,
            entry_to_confirm: None,
            ack_count: 0,
            promote_term_map: HashMap::new(),
            promote_greatest_term: Term::ZERO,
            is_in_rollback: false,
            svp_confirmed_lsn: None,
            frozen_reasons: FrozenReasons::until_promotion(),
            do_validate: true,
            stats: LimboStats::new(),
            wait_cond: Arc::new(Notify::new()),
            promote_latch: false,
            confirm_submits: VecDeque::new(),
            quorum: config.quorum,
            sync_timeout: config.sync_timeout,
            journal,
            term_source,
        }
    }

    /// Claims ownership for `self.replica_id` with an empty queue, the
    /// state a freshly booted instance starts in before its first PROMOTE.
    /// Exposed so the demo binary and tests can skip a full PROMOTE
    /// round-trip when they just need a usable single-node limbo. Clears
    /// `UNTIL_PROMOTION` too, since a real PROMOTE would have cleared it
    /// on the same path (`pipeline.rs::commit`) and a caller reaching for
    /// this shortcut wants a limbo that actually accepts appends.
    pub fn claim_self_owned(&mut self) {
        self.owner_id = Some(self.replica_id.clone());
        self.frozen_reasons.clear_until_promotion();
    }

    pub fn checkpoint(&self) -> LimboCheckpoint {
        LimboCheckpoint {
            confirmed_vclock: {
                let mut v: Vec<_> =
                    self.confirmed_vclock.iter().map(|(r, l)| (r.clone(), *l)).collect();
                v.sort_by(|a, b| a.0.cmp(&b.0));
                v
            },
            promote_greatest_term: self.promote_greatest_term,
            promote_term_map: {
                let mut v: Vec<_> =
                    self.promote_term_map.iter().map(|(r, t)| (r.clone(), *t)).collect();
                v.sort_by(|a, b| a.0.cmp(&b.0));
                v
            },
        }
    }

    pub fn is_ro(&self) -> bool {
        self.frozen_reasons.is_frozen()
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.wait_cond.notify_waiters();
    }

    pub fn filter_enable(&mut self) {
        self.do_validate = true;
    }

    pub fn filter_disable(&mut self) {
        self.do_validate = false;
    }

    pub fn fence(&mut self) {
        self.frozen_reasons.set_fencing();
    }

    pub fn unfence(&mut self) {
        self.frozen_reasons.clear_fencing();
        self.wait_cond.notify_waiters();
    }

    pub fn on_parameters_change(&mut self, quorum: Option<usize>, sync_timeout: Option<Duration>) {
        if let Some(quorum) = quorum {
            self.quorum = quorum;
        }
        if let Some(timeout) = sync_timeout {
            self.sync_timeout = timeout;
        }
    }

    pub fn rollback_count(&self) -> u64 {
        self.stats.rollback_count
    }

    pub fn confirm_lag(&self) -> Duration {
        self.stats.confirm_lag()
    }
}

/// Commands accepted by the actor loop. Every variant that produces a
/// result carries a `oneshot::Sender` reply channel, the request/response
/// shape the teacher uses for `EventPublisher::subscribe`.
pub enum LimboCommand {
    Append {
        txn: Arc<dyn TxnHandle>,
        approx_len: usize,
        kind: EntryKind,
        requesting_id: ReplicaId,
        reply: oneshot::Sender<LimboResult<EntryId>>,
    },
    WaitForSpace {
        reply: oneshot::Sender<LimboResult<()>>,
    },
    AssignLocalLsn {
        id: EntryId,
        lsn: LogSequenceNumber,
        reply: oneshot::Sender<LimboResult<()>>,
    },
    AssignRemoteLsn {
        id: EntryId,
        lsn: LogSequenceNumber,
        reply: oneshot::Sender<LimboResult<()>>,
    },
    Ack {
        replica_id: ReplicaId,
        lsn: LogSequenceNumber,
        reply: oneshot::Sender<LimboResult<()>>,
    },
    WaitComplete {
        id: EntryId,
        reply: oneshot::Sender<wait::WaitOutcome>,
    },
    Abort {
        id: EntryId,
        reply: oneshot::Sender<LimboResult<()>>,
    },
    Process {
        req: SynchroRequest,
        reply: oneshot::Sender<LimboResult<()>>,
    },
    SetMaxSize {
        max_size: usize,
    },
    FilterEnable,
    FilterDisable,
    Fence,
    Unfence,
    OnParametersChange {
        quorum: Option<usize>,
        sync_timeout: Option<Duration>,
    },
    IsRo {
        reply: oneshot::Sender<bool>,
    },
    Checkpoint {
        reply: oneshot::Sender<LimboCheckpoint>,
    },
    Stats {
        reply: oneshot::Sender<(u64, Duration)>,
    },
    /// Submitter cooperative task's step; see `confirm::run_submitter`.
    SubmitterTick {
        reply: oneshot::Sender<bool>,
    },
    /// Retryer cooperative task's step; see `confirm::run_retryer`.
    RetryerTick {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Cloneable front for the actor. Every async method sends a command and
/// (where applicable) awaits the `oneshot` reply.
#[derive(Clone)]
pub struct LimboHandle {
    tx: mpsc::Sender<LimboCommand>,
    shutdown: Arc<AtomicBool>,
    wait_cond: Arc<Notify>,
}

/// Owns the spawned actor and cooperative tasks; `shutdown` cancels and
/// joins all three, mirroring `ReplicationManager::stop`'s
/// shutdown-sender-then-join sequence.
pub struct LimboRuntime {
    pub handle: LimboHandle,
    actor: JoinHandle<()>,
    submitter: JoinHandle<()>,
    retryer: JoinHandle<()>,
}

impl LimboRuntime {
    pub async fn shutdown(self) {
        self.handle.shutdown.store(true, Ordering::Release);
        let _ = self.handle.tx.send(LimboCommand::Shutdown).await;
        self.handle.tx.closed().await;
        let _ = self.actor.await;
        self.submitter.abort();
        self.retryer.abort();
        let _ = self.submitter.await;
        let _ = self.retryer.await;
    }
}

/// Spawns the actor task plus the submitter/retryer cooperative tasks
/// (`spec.md` §4.C), wiring them together over a `LimboHandle`.
pub fn spawn(limbo: Limbo) -> LimboRuntime {
    let (tx, rx) = mpsc::channel(256);
    let shutdown = Arc::new(AtomicBool::new(false));
    let wait_cond = limbo.wait_cond.clone();
    let handle = LimboHandle { tx, shutdown: shutdown.clone(), wait_cond };

    let actor = tokio::spawn(run_actor(limbo, rx));
    let submitter = tokio::spawn(confirm::run_submitter(handle.clone(), shutdown.clone()));
    let retryer = tokio::spawn(confirm::run_retryer(handle.clone(), shutdown));

    LimboRuntime { handle, actor, submitter, retryer }
}

async fn run_actor(mut limbo: Limbo, mut rx: mpsc::Receiver<LimboCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            LimboCommand::Append { txn, approx_len, kind, requesting_id, reply } => {
                let result = limbo.append(txn, approx_len, kind, &requesting_id);
                let _ = reply.send(result);
            }
            LimboCommand::WaitForSpace { reply } => {
                let result = limbo.wait_for_space_check();
                let _ = reply.send(result);
            }
            LimboCommand::AssignLocalLsn { id, lsn, reply } => {
                let result = limbo.assign_local_lsn(id, lsn).await;
                let _ = reply.send(result);
            }
            LimboCommand::AssignRemoteLsn { id, lsn, reply } => {
                let result = limbo.assign_remote_lsn(id, lsn);
                let _ = reply.send(result);
            }
            LimboCommand::Ack { replica_id, lsn, reply } => {
                let result = limbo.ack(replica_id, lsn).await;
                let _ = reply.send(result);
            }
            LimboCommand::WaitComplete { id, reply } => {
                let result = limbo.check_complete(id).await;
                let _ = reply.send(result);
            }
            LimboCommand::Abort { id, reply } => {
                let result = limbo.abort(id);
                let _ = reply.send(result);
            }
            LimboCommand::Process { req, reply } => {
                let result = limbo.process(req).await;
                let _ = reply.send(result);
            }
            LimboCommand::SetMaxSize { max_size } => limbo.set_max_size(max_size),
            LimboCommand::FilterEnable => limbo.filter_enable(),
            LimboCommand::FilterDisable => limbo.filter_disable(),
            LimboCommand::Fence => limbo.fence(),
            LimboCommand::Unfence => limbo.unfence(),
            LimboCommand::OnParametersChange { quorum, sync_timeout } => {
                limbo.on_parameters_change(quorum, sync_timeout)
            }
            LimboCommand::IsRo { reply } => {
                let _ = reply.send(limbo.is_ro());
            }
            LimboCommand::Checkpoint { reply } => {
                let _ = reply.send(limbo.checkpoint());
            }
            LimboCommand::Stats { reply } => {
                let _ = reply.send((limbo.rollback_count(), limbo.confirm_lag()));
            }
            LimboCommand::SubmitterTick { reply } => {
                let progressed = limbo.submitter_tick().await;
                let _ = reply.send(progressed);
            }
            LimboCommand::RetryerTick { reply } => {
                let progressed = limbo.retryer_tick().await;
                let _ = reply.send(progressed);
            }
            LimboCommand::Shutdown => break,
        }
        // Cascading timeout/rollback progress that isn't driven by an
        // incoming command is handled by `wait::poll_timeouts`, invoked
        // from `WaitComplete`'s polling loop in the handle (see wait.rs).
    }
    tracing::info!("limbo actor loop exiting");
}

impl LimboHandle {
    pub async fn append(
        &self,
        txn: Arc<dyn TxnHandle>,
        approx_len: usize,
        kind: EntryKind,
        requesting_id: ReplicaId,
    ) -> LimboResult<EntryId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LimboCommand::Append { txn, approx_len, kind, requesting_id, reply })
            .await
            .map_err(|_| LimboError::Cancelled)?;
        rx.await.map_err(|_| LimboError::Cancelled)?
    }

    pub async fn wait_for_space(&self) -> LimboResult<()> {
        loop {
            let (reply, rx) = oneshot::channel();
            self.tx.send(LimboCommand::WaitForSpace { reply }).await.map_err(|_| LimboError::Cancelled)?;
            match rx.await.map_err(|_| LimboError::Cancelled)? {
                Ok(()) => return Ok(()),
                Err(LimboError::Timeout) => tokio::task::yield_now().await,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn assign_local_lsn(&self, id: EntryId, lsn: LogSequenceNumber) -> LimboResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LimboCommand::AssignLocalLsn { id, lsn, reply })
            .await
            .map_err(|_| LimboError::Cancelled)?;
        rx.await.map_err(|_| LimboError::Cancelled)?
    }

    pub async fn assign_remote_lsn(&self, id: EntryId, lsn: LogSequenceNumber) -> LimboResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LimboCommand::AssignRemoteLsn { id, lsn, reply })
            .await
            .map_err(|_| LimboError::Cancelled)?;
        rx.await.map_err(|_| LimboError::Cancelled)?
    }

    pub async fn ack(&self, replica_id: ReplicaId, lsn: LogSequenceNumber) -> LimboResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LimboCommand::Ack { replica_id, lsn, reply }).await.map_err(|_| LimboError::Cancelled)?;
        rx.await.map_err(|_| LimboError::Cancelled)?
    }

    pub async fn abort(&self, id: EntryId) -> LimboResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LimboCommand::Abort { id, reply }).await.map_err(|_| LimboError::Cancelled)?;
        rx.await.map_err(|_| LimboError::Cancelled)?
    }

    pub async fn process(&self, req: SynchroRequest) -> LimboResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LimboCommand::Process { req, reply }).await.map_err(|_| LimboError::Cancelled)?;
        rx.await.map_err(|_| LimboError::Cancelled)?
    }

    pub async fn set_max_size(&self, max_size: usize) {
        let _ = self.tx.send(LimboCommand::SetMaxSize { max_size }).await;
    }

    pub async fn filter_enable(&self) {
        let _ = self.tx.send(LimboCommand::FilterEnable).await;
    }

    pub async fn filter_disable(&self) {
        let _ = self.tx.send(LimboCommand::FilterDisable).await;
    }

    pub async fn fence(&self) {
        let _ = self.tx.send(LimboCommand::Fence).await;
    }

    pub async fn unfence(&self) {
        let _ = self.tx.send(LimboCommand::Unfence).await;
    }

    pub async fn on_parameters_change(&self, quorum: Option<usize>, sync_timeout: Option<Duration>) {
        let _ = self.tx.send(LimboCommand::OnParametersChange { quorum, sync_timeout }).await;
    }

    pub async fn is_ro(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LimboCommand::IsRo { reply }).await.is_err() {
            return true;
        }
        rx.await.unwrap_or(true)
    }

    pub async fn checkpoint(&self) -> Option<LimboCheckpoint> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LimboCommand::Checkpoint { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn stats(&self) -> (u64, Duration) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LimboCommand::Stats { reply }).await.is_err() {
            return (0, Duration::ZERO);
        }
        rx.await.unwrap_or((0, Duration::ZERO))
    }

    /// Waits for the entry at `index` (as returned by `append`) to reach a
    /// terminal state, implementing `spec.md` §4.G's `wait_complete` from
    /// outside the actor. The actor (`Limbo::check_complete`) owns the
    /// cascading-rollback timeout decision; this loop just polls it and,
    /// once it reports the entry finalized, reads the actual outcome off
    /// `txn` directly — the canonical place `signature` lives per
    /// `spec.md` §6's Transaction interface.
    pub async fn wait_complete(
        &self,
        id: EntryId,
        txn: &Arc<dyn TxnHandle>,
        poll_interval: Duration,
    ) -> LimboResult<()> {
        loop {
            let (reply, rx) = oneshot::channel();
            self.tx.send(LimboCommand::WaitComplete { id, reply }).await.map_err(|_| LimboError::Cancelled)?;
            match rx.await.map_err(|_| LimboError::Cancelled)? {
                wait::WaitOutcome::Pending => tokio::time::sleep(poll_interval).await,
                wait::WaitOutcome::Finalized => return wait::signature_to_result(txn.signature()),
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Submitter-task step: see `confirm::run_submitter`.
    pub(crate) async fn submitter_tick(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LimboCommand::SubmitterTick { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Retryer-task step: see `confirm::run_retryer`.
    pub(crate) async fn retryer_tick(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LimboCommand::RetryerTick { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub(crate) fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.wait_cond.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::InMemoryJournal;
    use crate::collab::StaticTermSource;

    pub(crate) fn test_config() -> LimboConfig {
        LimboConfig { quorum: 2, sync_timeout: Duration::from_millis(200), max_size: 1 << 20 }
    }

    pub(crate) fn new_test_limbo() -> Limbo {
        let journal = InMemoryJournal::new(16);
        let term_source = Arc::new(StaticTermSource::new(Term::ZERO));
        let mut limbo = Limbo::new(ReplicaId::new("r1").unwrap(), journal, term_source, &test_config());
        limbo.claim_self_owned();
        limbo.frozen_reasons = FrozenReasons::none();
        limbo
    }

    #[test]
    fn checkpoint_reflects_confirmed_vclock() {
        let mut limbo = new_test_limbo();
        limbo
            .confirmed_vclock
            .insert(ReplicaId::new("r2").unwrap(), LogSequenceNumber::new(7));
        let snap = limbo.checkpoint();
        assert_eq!(snap.confirmed_vclock, vec![(ReplicaId::new("r2").unwrap(), LogSequenceNumber::new(7))]);
    }
}
