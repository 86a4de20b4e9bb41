// # limbo-admin
//
// Tiny admin CLI for a locally running limbo: fence/unfence/set-max-size/
// status. Stands in for the teacher's cli.rs (an interactive SQL client);
// this one drives the admin surface `spec.md` §4.I describes, against an
// in-process demo instance since the limbo has no wire-protocol of its
// own (out of scope per `spec.md` §1).

use std::sync::Arc;

use limbo_coordinator::collab::{InMemoryJournal, StaticTermSource};
use limbo_coordinator::limbo::{self, Limbo};
use limbo_coordinator::types::{ReplicaId, Term};
use limbo_coordinator::{DbError, LimboConfig, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());

    let config = LimboConfig::from_env();
    config.validate()?;
    let replica_id = ReplicaId::new("node-1").map_err(|e| DbError::Configuration(e.to_string()))?;
    let journal = InMemoryJournal::new(64);
    let term_source = Arc::new(StaticTermSource::new(Term::ZERO));
    let mut limbo = Limbo::new(replica_id, journal, term_source, &config);
    limbo.claim_self_owned();
    let runtime = limbo::spawn(limbo);
    let handle = &runtime.handle;

    match command.as_str() {
        "fence" => {
            handle.fence().await;
            println!("fenced");
        }
        "unfence" => {
            handle.unfence().await;
            println!("unfenced");
        }
        "set-max-size" => {
            let max_size: usize = std::env::args()
                .nth(2)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| DbError::Configuration("usage: limbo-admin set-max-size <bytes>".to_string()))?;
            handle.set_max_size(max_size).await;
            println!("max_size set to {max_size}");
        }
        "status" => {
            let is_ro = handle.is_ro().await;
            let (rollback_count, confirm_lag) = handle.stats().await;
            println!("read-only: {is_ro}");
            println!("rollback_count: {rollback_count}");
            println!("confirm_lag: {confirm_lag:?}");
        }
        other => {
            eprintln!("unknown command '{other}', expected one of: fence, unfence, set-max-size, status");
        }
    }

    runtime.shutdown().await;
    Ok(())
}
