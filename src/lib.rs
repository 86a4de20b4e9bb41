// limbo-coordinator - synchronous-replication commit coordinator
//
// The limbo sits between local transaction preparation and durable WAL
// writes, tracking the set of in-flight ACK-wait transactions, their
// per-replica acknowledgements, and the PROMOTE/DEMOTE/CONFIRM/ROLLBACK
// synchro request pipeline that finalizes them once quorum is reached.

pub mod collab;
pub mod config;
pub mod error;
pub mod limbo;
pub mod types;

pub use config::LimboConfig;
pub use error::{DbError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
