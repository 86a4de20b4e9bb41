use thiserror::Error;

use crate::limbo::error::LimboError;

/// Crate-wide error type.
///
/// Kept as a flat enum with string payloads for the subsystems that sit
/// around the limbo (journal I/O, serialization, configuration), the same
/// shape the rest of the database uses for its top-level `DbError` so that
/// a caller linking against both sees one consistent error surface.
/// `LimboError` carries its own rich, structured variants (`spec.md` §7)
/// and is folded in here only at the crate boundary.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("replication error: {0}")]
    Replication(#[from] LimboError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for DbError {
    fn from(e: bincode::error::EncodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for DbError {
    fn from(e: bincode::error::DecodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
