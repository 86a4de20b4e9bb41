// # limbo-demo
//
// Boots a Limbo coordinator over an in-memory journal and a handful of
// simulated replicas, appends a couple of ack-wait transactions, and
// drives them to CONFIRM through the synchro request pipeline. Stands in
// for the teacher's main.rs, which wires up subsystems and prints a
// startup banner before starting the network server.

use std::sync::Arc;
use std::time::Duration;

use limbo_coordinator::collab::{InMemoryJournal, InMemoryTxn, StaticTermSource, SynchroRequest, TxnFlags};
use limbo_coordinator::limbo::{self, EntryKind, Limbo};
use limbo_coordinator::types::{LogSequenceNumber, ReplicaId, Term};
use limbo_coordinator::{LimboConfig, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).with_thread_ids(true).with_level(true).init();

    print_banner();

    let config = LimboConfig::from_env();
    config.validate()?;
    print_config(&config);

    let replica_id = ReplicaId::new("node-1").map_err(|e| limbo_coordinator::DbError::Configuration(e.to_string()))?;
    let journal = InMemoryJournal::new(64);
    let term_source = Arc::new(StaticTermSource::new(Term::ZERO));

    let mut limbo = Limbo::new(replica_id.clone(), journal, term_source, &config);
    limbo.claim_self_owned();
    let runtime = limbo::spawn(limbo);
    let handle = runtime.handle.clone();

    tracing::info!("limbo coordinator ready, quorum={} sync_timeout={:?}", config.quorum, config.sync_timeout);
    println!();
    println!("╭─────────────────────────────────────────────────────────╮");
    println!("│  limbo-coordinator is running                            │");
    println!("│  owner: {:<50} │", replica_id.as_str());
    println!("│  quorum: {:<49} │", config.quorum);
    println!("╰─────────────────────────────────────────────────────────╯");
    println!();

    let txn: Arc<dyn limbo_coordinator::collab::TxnHandle> = InMemoryTxn::new(TxnFlags::WAIT_ACK);
    let entry_id = handle.append(txn.clone(), 128, EntryKind::AckWait, replica_id.clone()).await?;
    tracing::info!(%entry_id, "appended demo transaction");

    handle.assign_local_lsn(entry_id, LogSequenceNumber::new(1)).await?;

    for replica in ["node-2", "node-3"] {
        let ack_id = ReplicaId::new(replica).map_err(|e| limbo_coordinator::DbError::Configuration(e.to_string()))?;
        handle.ack(ack_id, LogSequenceNumber::new(1)).await?;
    }

    let outcome = handle.wait_complete(entry_id, &txn, Duration::from_millis(10)).await;
    match outcome {
        Ok(()) => tracing::info!("demo transaction committed"),
        Err(e) => tracing::warn!(error = %e, "demo transaction did not commit"),
    }

    let req = SynchroRequest::confirm(replica_id, LogSequenceNumber::new(1), Term::ZERO);
    if let Err(e) = handle.process(req).await {
        tracing::warn!(error = %e, "confirm request failed");
    }

    let (rollback_count, confirm_lag) = handle.stats().await;
    tracing::info!(rollback_count, confirm_lag_ms = confirm_lag.as_millis(), "final stats");

    runtime.shutdown().await;
    tracing::info!("limbo coordinator shut down");
    Ok(())
}

fn print_banner() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║         limbo-coordinator - sync-replication demo            ║");
    println!("║         v{:<52}   ║", limbo_coordinator::VERSION);
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

fn print_config(config: &LimboConfig) {
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ CONFIGURATION                                                │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│   Quorum:             {:<38} │", config.quorum);
    println!("│   Sync Timeout:       {:<38} │", format!("{:?}", config.sync_timeout));
    println!("│   Max Queue Size:     {:<38} │", format!("{} bytes", config.max_size));
    println!("└─────────────────────────────────────────────────────────────┘");
    println!();
}
