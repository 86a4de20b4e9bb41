//! Limbo configuration.
//!
//! Mirrors `replication::manager::ReplicationConfig`: a flat struct with
//! `Default`, loaded from environment variables with typed fallbacks, and
//! validated by a dedicated method before it reaches `Limbo::new`.

use std::time::Duration;

use crate::error::{DbError, Result};

/// Tunables for a single `Limbo` instance.
#[derive(Debug, Clone, Copy)]
pub struct LimboConfig {
    /// Number of acks (including the local write) required to reach quorum.
    pub quorum: usize,
    /// How long an ACK-wait entry may sit at the head of the queue before
    /// it triggers a cascading rollback.
    pub sync_timeout: Duration,
    /// Queue byte-size budget; `0` disables the limit.
    pub max_size: usize,
}

impl Default for LimboConfig {
    fn default() -> Self {
        Self {
            quorum: 1,
            sync_timeout: Duration::from_secs(30),
            max_size: 16 * 1024 * 1024,
        }
    }
}

impl LimboConfig {
    /// Loads from `LIMBO_QUORUM` / `LIMBO_SYNC_TIMEOUT_MS` / `LIMBO_MAX_SIZE`,
    /// falling back to `Default::default()` for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("LIMBO_QUORUM") {
            if let Ok(quorum) = raw.parse() {
                config.quorum = quorum;
            }
        }
        if let Ok(raw) = std::env::var("LIMBO_SYNC_TIMEOUT_MS") {
            if let Ok(ms) = raw.parse() {
                config.sync_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(raw) = std::env::var("LIMBO_MAX_SIZE") {
            if let Ok(max_size) = raw.parse() {
                config.max_size = max_size;
            }
        }

        config
    }

    /// Rejects a zero quorum or a zero timeout, mirroring
    /// `ReplicationManager::validate_config`.
    pub fn validate(&self) -> Result<()> {
        if self.quorum == 0 {
            return Err(DbError::Configuration("quorum must be greater than 0".to_string()));
        }
        if self.sync_timeout.is_zero() {
            return Err(DbError::Configuration("sync_timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}
