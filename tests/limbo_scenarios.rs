//! End-to-end scenarios S1-S6 from `spec.md` §8, driven through
//! `LimboHandle` (the same surface the demo binary uses), quorum = 2,
//! two replicas (r1 = self, r2).

use std::sync::Arc;
use std::time::Duration;

use limbo_coordinator::collab::{InMemoryJournal, InMemoryTxn, StaticTermSource, SynchroRequest, TxnFlags, TxnHandle};
use limbo_coordinator::config::LimboConfig;
use limbo_coordinator::limbo::{self, EntryKind, Limbo, LimboError};
use limbo_coordinator::types::{LogSequenceNumber, ReplicaId, Term};

fn replica(id: &str) -> ReplicaId {
    ReplicaId::new(id).unwrap()
}

fn test_config(sync_timeout: Duration) -> LimboConfig {
    LimboConfig { quorum: 2, sync_timeout, max_size: 1 << 20 }
}

async fn spawn_limbo(config: &LimboConfig) -> limbo::LimboRuntime {
    let journal = InMemoryJournal::new(64);
    let term_source = Arc::new(StaticTermSource::new(Term::ZERO));
    let mut instance = Limbo::new(replica("r1"), journal, term_source, config);
    instance.claim_self_owned();
    limbo::spawn(instance)
}

#[tokio::test]
async fn s1_single_entry_commit() {
    let config = test_config(Duration::from_secs(1));
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id = handle.append(txn.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id, LogSequenceNumber::new(10)).await.unwrap();
    handle.ack(replica("r2"), LogSequenceNumber::new(10)).await.unwrap();

    let result = handle.wait_complete(id, &txn, Duration::from_millis(5)).await;
    assert!(result.is_ok());

    let checkpoint = handle.checkpoint().await.unwrap();
    assert_eq!(checkpoint.confirmed_vclock, vec![(replica("r1"), LogSequenceNumber::new(10))]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn s2_below_quorum_times_out_and_writes_rollback() {
    let config = test_config(Duration::from_millis(20));
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id = handle.append(txn.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id, LogSequenceNumber::new(11)).await.unwrap();

    let result = handle.wait_complete(id, &txn, Duration::from_millis(5)).await;
    assert!(matches!(result, Err(LimboError::SyncQuorumTimeout { lsn }) if lsn == LogSequenceNumber::new(11)));

    runtime.shutdown().await;
}

#[tokio::test]
async fn s3_cascading_rollback_in_reverse_order() {
    let config = test_config(Duration::from_millis(20));
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn_a: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let txn_b: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id_a = handle.append(txn_a.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    let id_b = handle.append(txn_b.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id_a, LogSequenceNumber::new(12)).await.unwrap();
    handle.assign_local_lsn(id_b, LogSequenceNumber::new(13)).await.unwrap();

    let result_a = handle.wait_complete(id_a, &txn_a, Duration::from_millis(5)).await;
    assert!(matches!(result_a, Err(LimboError::SyncQuorumTimeout { .. })));

    let result_b = handle.wait_complete(id_b, &txn_b, Duration::from_millis(5)).await;
    assert!(matches!(result_b, Err(LimboError::SyncRollback)));

    runtime.shutdown().await;
}

#[tokio::test]
async fn s4_confirm_race_with_rollback_completes_success() {
    let config = test_config(Duration::from_millis(30));
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id = handle.append(txn.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id, LogSequenceNumber::new(14)).await.unwrap();
    handle.ack(replica("r2"), LogSequenceNumber::new(14)).await.unwrap();

    let result = handle.wait_complete(id, &txn, Duration::from_millis(5)).await;
    assert!(result.is_ok());

    runtime.shutdown().await;
}

#[tokio::test]
async fn s5_split_brain_promote_leaves_state_unchanged() {
    let config = test_config(Duration::from_secs(1));
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    // Bootstrap promote_greatest_term to 5 through a real PROMOTE (r1 keeps
    // ownership of itself) before exercising the rejected one below.
    let bootstrap = SynchroRequest::promote(replica("r1"), replica("r1"), LogSequenceNumber::ZERO, Term::new(5), Vec::new());
    handle.process(bootstrap).await.unwrap();

    let req = SynchroRequest::promote(replica("r1"), replica("r2"), LogSequenceNumber::new(1), Term::new(5), Vec::new());
    let err = handle.process(req).await.unwrap_err();
    assert!(matches!(err, LimboError::SplitBrain { .. }));

    // Ownership is unchanged: r1 can still append to its own queue, r2 was
    // never installed as owner.
    let txn: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    assert!(handle.append(txn, 10, EntryKind::AckWait, replica("r1")).await.is_ok());

    runtime.shutdown().await;
}

#[tokio::test]
async fn s6_promote_clears_queue_and_installs_new_owner() {
    let config = test_config(Duration::from_secs(1));
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn_a: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let txn_b: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id_a = handle.append(txn_a.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    let id_b = handle.append(txn_b.clone(), 100, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id_a, LogSequenceNumber::new(20)).await.unwrap();
    handle.assign_local_lsn(id_b, LogSequenceNumber::new(21)).await.unwrap();
    handle.ack(replica("r2"), LogSequenceNumber::new(20)).await.unwrap();

    let vclock = vec![(replica("r2"), LogSequenceNumber::new(20))];
    let req = SynchroRequest::promote(replica("r1"), replica("r2"), LogSequenceNumber::new(20), Term::new(7), vclock);
    handle.process(req).await.unwrap();

    let result_a = handle.wait_complete(id_a, &txn_a, Duration::from_millis(5)).await;
    let result_b = handle.wait_complete(id_b, &txn_b, Duration::from_millis(5)).await;
    assert!(result_a.is_ok());
    assert!(matches!(result_b, Err(LimboError::SyncRollback)));

    runtime.shutdown().await;
}
