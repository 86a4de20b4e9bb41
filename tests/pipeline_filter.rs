//! Universal property 6 from `spec.md` §8: split-brain rejection of stale
//! CONFIRM and PROMOTE/DEMOTE requests, driven through `LimboHandle`.

use std::sync::Arc;
use std::time::Duration;

use limbo_coordinator::collab::{InMemoryJournal, InMemoryTxn, StaticTermSource, SynchroRequest, TxnFlags, TxnHandle};
use limbo_coordinator::config::LimboConfig;
use limbo_coordinator::limbo::{self, EntryKind, Limbo, LimboError};
use limbo_coordinator::types::{LogSequenceNumber, ReplicaId, Term};

fn replica(id: &str) -> ReplicaId {
    ReplicaId::new(id).unwrap()
}

fn test_config() -> LimboConfig {
    LimboConfig { quorum: 2, sync_timeout: Duration::from_secs(1), max_size: 1 << 20 }
}

async fn spawn_limbo(config: &LimboConfig) -> limbo::LimboRuntime {
    let journal = InMemoryJournal::new(64);
    let term_source = Arc::new(StaticTermSource::new(Term::ZERO));
    let mut instance = Limbo::new(replica("r1"), journal, term_source, config);
    instance.claim_self_owned();
    limbo::spawn(instance)
}

/// Any CONFIRM with `lsn <= confirmed_lsn` (non-PROMOTE) is rejected.
#[tokio::test]
async fn stale_confirm_at_or_below_confirmed_lsn_is_rejected() {
    let config = test_config();
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id = handle.append(txn.clone(), 10, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id, LogSequenceNumber::new(5)).await.unwrap();
    handle.ack(replica("r2"), LogSequenceNumber::new(5)).await.unwrap();
    assert!(handle.wait_complete(id, &txn, Duration::from_millis(20)).await.is_ok());

    // confirmed_lsn is now 5; a CONFIRM at or below that is stale.
    let stale = SynchroRequest::confirm(replica("r1"), LogSequenceNumber::new(5), Term::ZERO);
    let err = handle.process(stale).await.unwrap_err();
    assert!(matches!(err, LimboError::Unsupported { .. }));

    runtime.shutdown().await;
}

/// Any PROMOTE/DEMOTE with `term <= promote_greatest_term` is rejected.
#[tokio::test]
async fn promote_at_or_below_greatest_term_is_rejected() {
    let config = test_config();
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let first = SynchroRequest::promote(replica("r1"), replica("r1"), LogSequenceNumber::ZERO, Term::new(3), Vec::new());
    handle.process(first).await.unwrap();

    let stale = SynchroRequest::promote(replica("r1"), replica("r2"), LogSequenceNumber::new(1), Term::new(3), Vec::new());
    let err = handle.process(stale).await.unwrap_err();
    assert!(matches!(err, LimboError::SplitBrain { .. }));

    let also_stale = SynchroRequest::promote(replica("r1"), replica("r2"), LogSequenceNumber::new(1), Term::new(2), Vec::new());
    let err = handle.process(also_stale).await.unwrap_err();
    assert!(matches!(err, LimboError::SplitBrain { .. }));

    runtime.shutdown().await;
}

/// DEMOTE too is subject to split-brain term rejection.
#[tokio::test]
async fn demote_at_or_below_greatest_term_is_rejected() {
    let config = test_config();
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let first = SynchroRequest::promote(replica("r1"), replica("r1"), LogSequenceNumber::ZERO, Term::new(4), Vec::new());
    handle.process(first).await.unwrap();

    let demote = SynchroRequest::demote(replica("r1"), replica("r1"), LogSequenceNumber::ZERO, Term::new(4), Vec::new());
    let err = handle.process(demote).await.unwrap_err();
    assert!(matches!(err, LimboError::SplitBrain { .. }));

    runtime.shutdown().await;
}
