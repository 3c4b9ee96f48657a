//! Sync orchestration
//!
//! Drives each requested direction to completion: window computation, rate
//! gating, source listing, and the per-activity pipeline (normalize →
//! fingerprint → dedupe → download-or-cache → upload → record). Per-activity
//! failures are absorbed into counters; registry failures abort a direction;
//! one `run_sync` call always returns a full result map.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterError, AdapterRegistry, PlatformAdapter, RawActivity, UploadOutcome};
use crate::cache::FileCache;
use crate::config::EngineConfig;
use crate::database::{SyncDatabase, SyncStatistics};
use crate::error::{Result, SyncError};
use crate::fingerprint::activity_fingerprint;
use crate::matcher::ActivityMatcher;
use crate::models::{Direction, FileFormat, Platform, SyncMode, SyncState};
use crate::rate_limit::{PlatformLimits, RateLimitGovernor, RateLimitStatus};
use crate::window::SyncWindowManager;

/// Per-direction counters for one `run_sync` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectionResult {
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
    pub processed: u32,

    /// Set when the direction aborted (config problem, list failure,
    /// registry failure); per-activity failures only bump `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full statistics blob returned by [`SyncEngine::status`]
#[derive(Debug, Serialize)]
pub struct EngineStatus {
    #[serde(flatten)]
    pub statistics: SyncStatistics,

    /// Governor state per platform
    pub api_limits: BTreeMap<String, RateLimitStatus>,

    pub cache_dir: String,
}

enum ActivityOutcome {
    Success,
    Skipped,
    Failed,
}

/// The sync engine: owns the registry, cache, governor, and adapter set
pub struct SyncEngine {
    db: SyncDatabase,
    adapters: AdapterRegistry,
    matcher: ActivityMatcher,
    windows: SyncWindowManager,
    governor: RateLimitGovernor,
    cache: FileCache,
    probe_radius: chrono::Duration,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Build an engine from configuration and a set of registered adapters.
    ///
    /// Opens (or creates) the registry database and cache root, and restores
    /// persisted rate-limit counters under the currently configured limits.
    pub fn new(config: &EngineConfig, adapters: AdapterRegistry) -> Result<Self> {
        if let Some(parent) = config
            .storage
            .database_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)?;
        }

        let db = SyncDatabase::new(&config.storage.database_path)?;
        let cache = FileCache::new(&config.storage.cache_dir)?;

        let mut governor = RateLimitGovernor::new();
        governor.restore(&db.load_rate_limits()?);
        for (platform, limits) in &config.rate_limits {
            if let Ok(platform) = platform.parse::<Platform>() {
                governor.set_limits(
                    platform,
                    PlatformLimits {
                        daily: limits.daily,
                        quarter_hour: limits.quarter_hour,
                    },
                );
            } else {
                warn!("ignoring rate limit config for unknown platform: {}", platform);
            }
        }

        Ok(Self {
            db,
            adapters,
            matcher: ActivityMatcher::new(config.matcher),
            windows: SyncWindowManager::new(config.window.to_policy()),
            governor,
            cache,
            probe_radius: config.probe_radius(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between activities; setting it ends the current batch
    /// cleanly and returns partial results
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn database(&self) -> &SyncDatabase {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut SyncDatabase {
        &mut self.db
    }

    pub fn windows(&self) -> &SyncWindowManager {
        &self.windows
    }

    /// Run the given directions sequentially; `None` means every direction
    /// whose sync rule is enabled. Always returns a result per direction.
    pub fn run_sync(
        &mut self,
        directions: Option<&[Direction]>,
        batch_size: usize,
        mode: SyncMode,
    ) -> Result<BTreeMap<String, DirectionResult>> {
        let directions: Vec<Direction> = match directions {
            Some(list) => list.to_vec(),
            None => self.db.enabled_directions()?,
        };

        let mut results = BTreeMap::new();
        for direction in &directions {
            info!("starting {} sync for {}", mode, direction);
            let result = self.sync_direction(direction, batch_size, mode);
            if let Some(err) = &result.error {
                error!("{} aborted: {}", direction, err);
            }
            results.insert(direction.to_string(), result);
        }

        self.db.save_rate_limits(&self.governor.snapshot())?;
        Ok(results)
    }

    fn sync_direction(
        &mut self,
        direction: &Direction,
        batch_size: usize,
        mode: SyncMode,
    ) -> DirectionResult {
        let mut result = DirectionResult::default();
        if let Err(e) = self.drive_direction(direction, batch_size, mode, &mut result) {
            result.error = Some(e.to_string());
        }
        result
    }

    fn drive_direction(
        &mut self,
        direction: &Direction,
        batch_size: usize,
        mode: SyncMode,
        result: &mut DirectionResult,
    ) -> Result<()> {
        let Self {
            db,
            adapters,
            matcher,
            windows,
            governor,
            cache,
            probe_radius,
            cancel,
        } = self;

        let source = direction.source;
        let target = direction.target;

        let source_adapter = adapters.get(source)?;
        let target_adapter = adapters.get(target)?;
        if !source_adapter.is_configured() {
            return Err(SyncError::Configuration(format!(
                "{} adapter is not configured",
                source
            )));
        }
        if !target_adapter.is_configured() {
            return Err(SyncError::Configuration(format!(
                "{} adapter is not configured",
                target
            )));
        }

        if !governor.can_request(source) {
            info!("{} rate limit reached, skipping {} this run", source, direction);
            return Ok(());
        }

        let (start, end) = match mode {
            SyncMode::Incremental => windows.incremental_window(db, source)?,
            SyncMode::Migration => windows.migration_window(db, direction)?,
        };

        if mode == SyncMode::Migration && windows.is_migration_complete(db, direction)? {
            info!("{} migration already complete", direction);
            return Ok(());
        }

        governor.record(source);
        let activities = source_adapter.list_activities(batch_size, start, end, mode)?;
        if activities.is_empty() {
            debug!("no activities on {} in [{}, {})", source, start, end);
            return Ok(());
        }
        info!("{}: processing {} activities from {}", direction, activities.len(), source);

        let mut latest_activity_time: Option<DateTime<Utc>> = None;

        for raw in &activities {
            if cancel.load(Ordering::Relaxed) {
                info!("cancellation requested, ending {} batch early", direction);
                break;
            }

            let (outcome, start_time) = process_one(
                db,
                cache,
                matcher,
                governor,
                *probe_radius,
                source_adapter,
                target_adapter,
                raw,
            )?;

            match outcome {
                ActivityOutcome::Success => result.success += 1,
                ActivityOutcome::Skipped => result.skipped += 1,
                ActivityOutcome::Failed => result.failed += 1,
            }
            result.processed += 1;

            if let Some(t) = start_time {
                latest_activity_time = Some(latest_activity_time.map_or(t, |prev: DateTime<Utc>| prev.max(t)));
            }

            // A partial batch is valid; the cursor commit below covers
            // whatever completed.
            if !governor.can_request(source) {
                info!("{} rate limit reached, stopping {} batch", source, direction);
                break;
            }
        }

        match mode {
            SyncMode::Migration => {
                if let Some(latest) = latest_activity_time {
                    windows.commit_migration_progress(db, direction, latest)?;
                }
            }
            SyncMode::Incremental => {
                let all_failed = result.processed > 0 && result.failed == result.processed;
                let cancelled_before_work =
                    cancel.load(Ordering::Relaxed) && result.processed == 0;
                if all_failed || cancelled_before_work {
                    warn!(
                        "{} batch did no useful work; keeping last-sync anchor",
                        direction
                    );
                } else {
                    db.set_last_sync(source, Utc::now())?;
                }
            }
        }

        Ok(())
    }

    /// Full statistics blob: registry totals plus governor state
    pub fn status(&self) -> Result<EngineStatus> {
        let statistics = self.db.statistics()?;

        let mut api_limits = BTreeMap::new();
        for platform in Platform::all() {
            api_limits.insert(platform.to_string(), self.governor.status(*platform));
        }

        Ok(EngineStatus {
            statistics,
            api_limits,
            cache_dir: self.cache.root().to_string_lossy().into_owned(),
        })
    }

    pub fn set_rule(&self, source: Platform, target: Platform, enabled: bool) -> Result<()> {
        self.db
            .set_sync_rule(&Direction::new(source, target), enabled)?;
        Ok(())
    }

    pub fn set_migration_start(&self, direction: &Direction, start: DateTime<Utc>) -> Result<()> {
        self.windows.set_migration_start(&self.db, direction, start)?;
        Ok(())
    }

    /// Age-based cache cleanup; returns the number of evicted entries
    pub fn cleanup_cache(&mut self, days: i64) -> Result<usize> {
        Ok(self.db.cleanup_file_cache_older_than(days)?)
    }

    /// Delegate session teardown to the adapter
    pub fn clear_adapter_session(&self, platform: Platform) -> Result<()> {
        self.adapters.get(platform)?.clear_session()?;
        Ok(())
    }

    /// Import the predecessor's JSON state file, renaming it to `.backup`
    /// after a successful import. Returns the imported record count.
    pub fn import_legacy_json(&mut self, json_path: &Path) -> Result<usize> {
        let imported = self.db.import_legacy_json(json_path)?;

        let mut backup = PathBuf::from(json_path);
        backup.set_extension("json.backup");
        if let Err(e) = fs::rename(json_path, &backup) {
            warn!("imported state but could not rename {}: {}", json_path.display(), e);
        } else {
            info!("legacy state imported; original renamed to {}", backup.display());
        }
        Ok(imported)
    }
}

/// One trip through the per-activity pipeline.
///
/// Adapter failures are absorbed into an outcome; only registry failures
/// propagate. The returned instant (when known) feeds the migration cursor
/// regardless of outcome, since skipped activities are safely behind us.
#[allow(clippy::too_many_arguments)]
fn process_one(
    db: &mut SyncDatabase,
    cache: &FileCache,
    matcher: &ActivityMatcher,
    governor: &mut RateLimitGovernor,
    probe_radius: chrono::Duration,
    source_adapter: &dyn PlatformAdapter,
    target_adapter: &dyn PlatformAdapter,
    raw: &RawActivity,
) -> Result<(ActivityOutcome, Option<DateTime<Utc>>)> {
    let source = source_adapter.id();
    let target = target_adapter.id();

    let meta = match source_adapter.to_metadata(raw) {
        Ok(meta) => meta,
        Err(e) => {
            warn!("failed to normalize activity from {}: {}", source, e);
            return Ok((ActivityOutcome::Failed, None));
        }
    };
    let activity_id = match source_adapter.extract_activity_id(raw) {
        Ok(id) => id,
        Err(e) => {
            warn!("activity from {} has no usable id: {}", source, e);
            return Ok((ActivityOutcome::Failed, Some(meta.start_time)));
        }
    };

    // Manually entered activities have no original file to move.
    if source_adapter.is_manual_activity(raw) {
        debug!("skipping manual activity {} on {}", activity_id, source);
        return Ok((ActivityOutcome::Skipped, Some(meta.start_time)));
    }

    let fingerprint = activity_fingerprint(&meta);

    if db.is_synced(&fingerprint, source, target)? {
        debug!("{} already synced {} -> {}", fingerprint, source, target);
        return Ok((ActivityOutcome::Skipped, Some(meta.start_time)));
    }

    // Duplicate probe: a fuzzy match under a different fingerprint that
    // already has a cached file lends it, saving a download.
    let candidates: Vec<_> = db
        .find_similar_by_time_and_sport(meta.start_time, &meta.sport_type, probe_radius)?
        .into_iter()
        .filter(|(fp, _)| fp != &fingerprint)
        .collect();
    let mut borrowed_file = None;
    if let Some((matched_fp, match_result)) = matcher.best_match(&meta, &candidates) {
        debug!(
            "duplicate probe matched {} (confidence {:.2})",
            matched_fp, match_result.confidence
        );
        borrowed_file = db.cached_file_any_format(&matched_fp)?.map(|(_, path)| path);
    }

    db.upsert_activity(&meta, source, &activity_id)?;

    let cache_file = match borrowed_file {
        Some(path) => path,
        None => match db.cached_file_any_format(&fingerprint)? {
            Some((format, path)) => {
                debug!("cache hit for {} ({})", fingerprint, format);
                path
            }
            None => {
                let out_path = cache.path_for(&fingerprint, FileFormat::Fit);
                governor.record(source);
                if let Err(e) = source_adapter.download_file(&activity_id, &out_path) {
                    warn!("download of {} from {} failed: {}", activity_id, source, e);
                    db.set_sync_status(&fingerprint, source, target, SyncState::Failed)?;
                    return Ok((ActivityOutcome::Failed, Some(meta.start_time)));
                }
                db.add_file_cache(&fingerprint, FileFormat::Fit, &out_path)?;
                out_path
            }
        },
    };

    match target_adapter.upload_file(&cache_file, Some(&meta.name), Some(&fingerprint)) {
        Ok(outcome) => {
            if outcome == UploadOutcome::Duplicate {
                debug!("{} reports duplicate for {}; counting as synced", target, fingerprint);
            }
            db.set_sync_status(&fingerprint, source, target, SyncState::Synced)?;
            info!("synced '{}': {} -> {}", meta.name, source, target);
            Ok((ActivityOutcome::Success, Some(meta.start_time)))
        }
        Err(e) => {
            match &e {
                AdapterError::NeedAuth => warn!(
                    "upload to {} failed: credentials expired, re-authorize and retry",
                    target
                ),
                _ => warn!("upload to {} failed: {}", target, e),
            }
            db.set_sync_status(&fingerprint, source, target, SyncState::Failed)?;
            Ok((ActivityOutcome::Failed, Some(meta.start_time)))
        }
    }
}
