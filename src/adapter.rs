//! Platform adapter contract
//!
//! Every fitness platform the engine talks to implements [`PlatformAdapter`].
//! Concrete adapters (OAuth flows, cookie handling, multipart uploads) live
//! outside the core; the orchestrator only sees this trait and never
//! interprets HTTP responses itself. Adapters are looked up by platform id in
//! an [`AdapterRegistry`], so the sync loop never branches on platform
//! identity.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::models::{ActivityMetadata, Platform, SyncMode};

/// Opaque platform payload for one listed activity.
///
/// Only the adapter that produced it knows the field names inside;
/// [`PlatformAdapter::to_metadata`] is the single place they are read.
#[derive(Debug, Clone)]
pub struct RawActivity {
    payload: serde_json::Value,
}

impl RawActivity {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// How an upload ended on the target platform. A duplicate response means
/// the activity is already there, which the engine treats as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted,
    Duplicate,
}

/// Discriminated adapter failure set.
///
/// Adapters refresh credentials and retry once internally; a surfaced
/// `NeedAuth` means that retry also failed and the user has to re-authorize.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0} is not configured")]
    NotConfigured(Platform),

    #[error("authentication expired; refresh credentials and retry")]
    NeedAuth,

    /// Timeouts, 5xx, connection resets, export-not-ready after retries
    #[error("transient platform error: {0}")]
    Transient(String),

    /// 400/404 on a specific activity, unsupported format, no original file
    #[error("permanent platform error: {0}")]
    Permanent(String),

    #[error("{platform} does not support {operation}")]
    Unsupported {
        platform: Platform,
        operation: &'static str,
    },
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Uniform interface over one fitness platform.
///
/// Any implementer offers some subset of the capability set; calling an
/// unsupported operation returns [`AdapterError::Unsupported`].
pub trait PlatformAdapter: Send {
    fn id(&self) -> Platform;

    /// Whether required credentials/secrets are present
    fn is_configured(&self) -> bool;

    /// Cheap connectivity probe against the live platform
    fn test_connection(&self) -> AdapterResult<bool>;

    /// List activities in `[after, before)`, at most `limit`.
    ///
    /// Migration mode must return items in ascending start-time order so the
    /// cursor can advance; incremental ordering is unspecified. Platforms
    /// without server-side time filters filter client-side.
    fn list_activities(
        &self,
        limit: usize,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        mode: SyncMode,
    ) -> AdapterResult<Vec<RawActivity>>;

    /// Normalize a raw listing into platform-neutral metadata
    fn to_metadata(&self, raw: &RawActivity) -> AdapterResult<ActivityMetadata>;

    /// The platform's own id for a raw listing
    fn extract_activity_id(&self, raw: &RawActivity) -> AdapterResult<String>;

    /// Manually entered activity with no underlying recording file; such
    /// activities are skipped as a sync source
    fn is_manual_activity(&self, _raw: &RawActivity) -> bool {
        false
    }

    /// Fetch the original recording into `out_path` (unzipping if the
    /// platform wraps exports)
    fn download_file(&self, activity_id: &str, out_path: &Path) -> AdapterResult<()>;

    /// Push a recording file; the adapter classifies the platform response
    fn upload_file(
        &self,
        path: &Path,
        name: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AdapterResult<UploadOutcome>;

    /// Drop any persisted session/cookies so the next call re-authenticates
    fn clear_session(&self) -> AdapterResult<()> {
        Ok(())
    }
}

/// Registry of available adapters, keyed by platform id
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Box<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter; a later registration for the same platform wins
    pub fn register(&mut self, adapter: Box<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, platform: Platform) -> AdapterResult<&dyn PlatformAdapter> {
        self.adapters
            .get(&platform)
            .map(|a| a.as_ref())
            .ok_or(AdapterError::NotConfigured(platform))
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut ids: Vec<Platform> = self.adapters.keys().copied().collect();
        ids.sort_by_key(|p| p.as_str());
        ids
    }
}
