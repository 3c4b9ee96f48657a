//! Unified error hierarchy for the sync engine
//!
//! Distinguishes registry failures (fatal for a direction), adapter failures
//! (absorbed per activity), and configuration problems (abort before work).

use thiserror::Error;

use crate::adapter::AdapterError;
use crate::database::DatabaseError;

/// Top-level error type for all sync-engine operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Persistent-store failure; fatal for the running direction because
    /// idempotence depends on the registry being truthful
    #[error("Registry error: {0}")]
    Registry(#[from] DatabaseError),

    /// Adapter-reported failure
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Engine or direction misconfiguration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed direction string or unregistered platform pair
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    /// IO errors outside the registry (cache writes, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
