// Library interface for the actsync modules
// This allows integration tests to access the core functionality

pub mod adapter;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod window;

// Re-export commonly used types for convenience
pub use adapter::{AdapterError, AdapterRegistry, PlatformAdapter, RawActivity, UploadOutcome};
pub use config::EngineConfig;
pub use database::{SyncDatabase, SyncStatistics};
pub use error::{Result, SyncError};
pub use fingerprint::activity_fingerprint;
pub use matcher::{ActivityMatcher, MatchResult, MatchThresholds};
pub use models::{ActivityMetadata, Direction, FileFormat, Platform, SyncMode, SyncState};
pub use orchestrator::{DirectionResult, EngineStatus, SyncEngine};
pub use rate_limit::{PlatformLimits, RateLimitGovernor};
pub use window::{SyncWindowManager, WindowPolicy};
