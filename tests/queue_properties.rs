//! Universal properties 1 and 5 from `spec.md` §8, driven through
//! `LimboHandle`: queue order tracks LSN order, and repeated/lower acks
//! from the same replica are no-ops.

use std::sync::Arc;
use std::time::Duration;

use limbo_coordinator::collab::{InMemoryJournal, InMemoryTxn, StaticTermSource, TxnFlags, TxnHandle};
use limbo_coordinator::config::LimboConfig;
use limbo_coordinator::limbo::{self, EntryKind, Limbo};
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

/// Property 1: for consecutive assigned entries e1 < e2 in queue, their
/// LSNs are strictly increasing, and quorum on e1's LSN alone must not
/// finalize e2 — finalization only reaches as far as the queue's
/// contiguous prefix whose LSN is covered.
#[tokio::test]
async fn queue_order_tracks_lsn_order() {
    let config = test_config();
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn_a: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let txn_b: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id_a = handle.append(txn_a.clone(), 10, EntryKind::AckWait, replica("r1")).await.unwrap();
    let id_b = handle.append(txn_b.clone(), 10, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id_a, LogSequenceNumber::new(10)).await.unwrap();
    handle.assign_local_lsn(id_b, LogSequenceNumber::new(11)).await.unwrap();

    // Quorum ack only reaches LSN 10: e_a may complete, e_b must not yet.
    handle.ack(replica("r2"), LogSequenceNumber::new(10)).await.unwrap();
    let result_a = handle.wait_complete(id_a, &txn_a, Duration::from_millis(20)).await;
    assert!(result_a.is_ok());
    assert!(!txn_b.flags().contains(TxnFlags::IS_DONE));

    // Quorum ack now reaches LSN 11: e_b completes too, in queue order.
    handle.ack(replica("r2"), LogSequenceNumber::new(11)).await.unwrap();
    let result_b = handle.wait_complete(id_b, &txn_b, Duration::from_millis(20)).await;
    assert!(result_b.is_ok());

    runtime.shutdown().await;
}

/// Property 5: `ack(r, L1); ack(r, L2)` with `L2 <= L1` is a no-op — it
/// must not regress or otherwise disturb already-observed progress.
#[tokio::test]
async fn repeated_lower_ack_is_a_no_op() {
    let config = test_config();
    let runtime = spawn_limbo(&config).await;
    let handle = &runtime.handle;

    let txn: Arc<dyn TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let id = handle.append(txn.clone(), 10, EntryKind::AckWait, replica("r1")).await.unwrap();
    handle.assign_local_lsn(id, LogSequenceNumber::new(10)).await.unwrap();

    handle.ack(replica("r2"), LogSequenceNumber::new(10)).await.unwrap();
    let result = handle.wait_complete(id, &txn, Duration::from_millis(20)).await;
    assert!(result.is_ok());

    // A lower/equal ack from the same replica after the entry has already
    // completed must not error or otherwise perturb state.
    assert!(handle.ack(replica("r2"), LogSequenceNumber::new(5)).await.is_ok());
    assert!(handle.ack(replica("r2"), LogSequenceNumber::new(10)).await.is_ok());

    runtime.shutdown().await;
}
