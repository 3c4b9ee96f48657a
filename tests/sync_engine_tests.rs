use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use actsync::adapter::{
    AdapterError, AdapterRegistry, AdapterResult, PlatformAdapter, RawActivity, UploadOutcome,
};
use actsync::config::{EngineConfig, RateLimitSettings};
use actsync::fingerprint::activity_fingerprint;
use actsync::models::{format_instant, parse_instant, ActivityMetadata, Direction, Platform, SyncMode};
use actsync::orchestrator::SyncEngine;

// End-to-end scenarios driving the engine with scripted platform adapters.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum UploadBehavior {
    /// Accept every upload
    #[default]
    Accept,
    /// Accept the first upload, report duplicates afterwards (how real
    /// platforms behave on re-push)
    AcceptThenDuplicate,
    /// Always report the platform's duplicate signal
    Duplicate,
    /// Fail every upload
    Fail,
}

#[derive(Default)]
struct MockState {
    activities: Vec<serde_json::Value>,
    upload_behavior: UploadBehavior,
    fail_downloads: bool,
    uploads: Vec<(PathBuf, Option<String>, Option<String>)>,
    accepted_uploads: u32,
    downloads: u32,
    list_calls: Vec<(DateTime<Utc>, DateTime<Utc>, SyncMode)>,
}

struct MockAdapter {
    platform: Platform,
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    fn new(platform: Platform, state: Arc<Mutex<MockState>>) -> Self {
        Self { platform, state }
    }
}

impl PlatformAdapter for MockAdapter {
    fn id(&self) -> Platform {
        self.platform
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn test_connection(&self) -> AdapterResult<bool> {
        Ok(true)
    }

    fn list_activities(
        &self,
        limit: usize,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        mode: SyncMode,
    ) -> AdapterResult<Vec<RawActivity>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push((after, before, mode));

        let mut in_window: Vec<serde_json::Value> = state
            .activities
            .iter()
            .filter(|a| {
                let start = a["start"].as_str().and_then(parse_instant).unwrap();
                start >= after && start < before
            })
            .cloned()
            .collect();

        if mode == SyncMode::Migration {
            in_window.sort_by_key(|a| a["start"].as_str().and_then(parse_instant).unwrap());
        }
        in_window.truncate(limit);

        Ok(in_window.into_iter().map(RawActivity::new).collect())
    }

    fn to_metadata(&self, raw: &RawActivity) -> AdapterResult<ActivityMetadata> {
        let payload = raw.payload();
        let start = payload["start"]
            .as_str()
            .and_then(parse_instant)
            .ok_or_else(|| AdapterError::Permanent("bad start time".to_string()))?;
        Ok(ActivityMetadata {
            name: payload["name"].as_str().unwrap_or("").to_string(),
            sport_type: payload["sport"].as_str().unwrap_or("").to_string(),
            start_time: start,
            distance: payload["distance"].as_f64().unwrap_or(0.0),
            duration: payload["duration"].as_u64().unwrap_or(0) as u32,
            elevation_gain: payload["elevation_gain"].as_f64(),
        })
    }

    fn extract_activity_id(&self, raw: &RawActivity) -> AdapterResult<String> {
        raw.payload()["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Permanent("missing id".to_string()))
    }

    fn is_manual_activity(&self, raw: &RawActivity) -> bool {
        raw.payload()["manual"].as_bool().unwrap_or(false)
    }

    fn download_file(&self, _activity_id: &str, out_path: &Path) -> AdapterResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_downloads {
            return Err(AdapterError::Transient("export not ready".to_string()));
        }
        std::fs::write(out_path, b"fit-bytes")
            .map_err(|e| AdapterError::Transient(e.to_string()))?;
        state.downloads += 1;
        Ok(())
    }

    fn upload_file(
        &self,
        path: &Path,
        name: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AdapterResult<UploadOutcome> {
        let mut state = self.state.lock().unwrap();
        let behavior = state.upload_behavior;
        let seen_before = !state.uploads.is_empty();
        state.uploads.push((
            path.to_path_buf(),
            name.map(str::to_string),
            fingerprint.map(str::to_string),
        ));

        match behavior {
            UploadBehavior::Accept => {
                state.accepted_uploads += 1;
                Ok(UploadOutcome::Accepted)
            }
            UploadBehavior::AcceptThenDuplicate => {
                if seen_before {
                    Ok(UploadOutcome::Duplicate)
                } else {
                    state.accepted_uploads += 1;
                    Ok(UploadOutcome::Accepted)
                }
            }
            UploadBehavior::Duplicate => Ok(UploadOutcome::Duplicate),
            UploadBehavior::Fail => Err(AdapterError::Transient("upload rejected".to_string())),
        }
    }
}

struct Harness {
    _dir: TempDir,
    config: EngineConfig,
    engine: SyncEngine,
    source: Arc<Mutex<MockState>>,
    target: Arc<Mutex<MockState>>,
}

fn harness(source: Platform, target: Platform, quarter_hour_limit: Option<u32>) -> Harness {
    let dir = TempDir::new().unwrap();

    let mut config = EngineConfig::default();
    config.storage.database_path = dir.path().join("sync.db");
    config.storage.cache_dir = dir.path().join("activity_cache");
    config.rate_limits.clear();
    if let Some(quarter_hour) = quarter_hour_limit {
        config.rate_limits.insert(
            source.to_string(),
            RateLimitSettings {
                daily: 1000,
                quarter_hour,
            },
        );
    }

    let source_state = Arc::new(Mutex::new(MockState::default()));
    let target_state = Arc::new(Mutex::new(MockState::default()));

    let mut adapters = AdapterRegistry::new();
    adapters.register(Box::new(MockAdapter::new(source, Arc::clone(&source_state))));
    adapters.register(Box::new(MockAdapter::new(target, Arc::clone(&target_state))));

    let engine = SyncEngine::new(&config, adapters).unwrap();
    Harness {
        _dir: dir,
        config,
        engine,
        source: source_state,
        target: target_state,
    }
}

fn activity(id: &str, name: &str, sport: &str, start: DateTime<Utc>, distance: f64, duration: u32) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "sport": sport,
        "start": format_instant(start),
        "distance": distance,
        "duration": duration,
        "manual": false,
    })
}

fn direction(s: &str) -> Direction {
    s.parse().unwrap()
}

fn recent(days_ago: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days_ago)
}

/// S1: fresh incremental sync with no history lands the activity in the
/// registry, maps it on the source, marks the direction synced, and anchors
/// the last-sync timestamp.
#[test]
fn fresh_incremental_sync_registers_and_uploads() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);

    let start = recent(1);
    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", start, 5000.0, 1800)];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    let result = &results["strava_to_garmin"];
    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.processed, 1);
    assert!(result.error.is_none());

    let stats = h.engine.database().statistics().unwrap();
    assert_eq!(stats.total_activities, 1);
    assert_eq!(stats.platform_counts.get("strava"), Some(&1));
    assert_eq!(
        stats.sync_status.get("strava_to_garmin").and_then(|s| s.get("synced")),
        Some(&1)
    );
    assert!(stats.last_sync.contains_key("strava"));

    // The cache row is keyed by the metadata fingerprint.
    let meta = ActivityMetadata {
        name: "Morning Run".to_string(),
        sport_type: "Run".to_string(),
        start_time: start,
        distance: 5000.0,
        duration: 1800,
        elevation_gain: None,
    };
    let fp = activity_fingerprint(&meta);
    let cached = h.engine.database().cached_file_any_format(&fp).unwrap();
    assert!(cached.is_some());

    let target = h.target.lock().unwrap();
    assert_eq!(target.uploads.len(), 1);
    assert_eq!(target.uploads[0].1.as_deref(), Some("Morning Run"));
    assert_eq!(target.uploads[0].2.as_deref(), Some(fp.as_str()));
}

/// Property 3: a second identical incremental run changes nothing and pushes
/// zero additional accepted uploads.
#[test]
fn incremental_sync_is_idempotent() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    h.target.lock().unwrap().upload_behavior = UploadBehavior::AcceptThenDuplicate;

    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    let dirs = [direction("strava_to_garmin")];
    h.engine.run_sync(Some(&dirs), 10, SyncMode::Incremental).unwrap();
    let stats_first = h.engine.database().statistics().unwrap();

    let results = h.engine.run_sync(Some(&dirs), 10, SyncMode::Incremental).unwrap();
    let stats_second = h.engine.database().statistics().unwrap();

    // Registry state is unchanged and the re-push was duplicate-classified.
    assert_eq!(stats_first.total_activities, stats_second.total_activities);
    assert_eq!(stats_first.platform_counts, stats_second.platform_counts);
    assert_eq!(stats_first.sync_status, stats_second.sync_status);
    assert_eq!(h.target.lock().unwrap().accepted_uploads, 1);
    assert_eq!(results["strava_to_garmin"].failed, 0);

    // The file was downloaded exactly once; the second pass hit the cache.
    assert_eq!(h.source.lock().unwrap().downloads, 1);
}

/// S2: migration starts from the configured start time and resumes from the
/// committed cursor on the next invocation.
#[test]
fn migration_resumes_from_cursor() {
    let mut h = harness(Platform::Strava, Platform::Onedrive, None);
    let dir = direction("strava_to_onedrive");

    let custom_start = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
    h.engine.set_migration_start(&dir, custom_start).unwrap();

    let batch: Vec<serde_json::Value> = (0..10)
        .map(|i| {
            let start = Utc.with_ymd_and_hms(2015, 1, 3, 8, 0, 0).unwrap()
                + Duration::days(i64::from(i) * 5);
            activity(&format!("a{}", i), &format!("Ride {}", i), "Ride", start, 30000.0, 5400)
        })
        .collect();
    let latest = Utc.with_ymd_and_hms(2015, 1, 3, 8, 0, 0).unwrap() + Duration::days(45);
    h.source.lock().unwrap().activities = batch;

    let results = h
        .engine
        .run_sync(Some(&[dir]), 10, SyncMode::Migration)
        .unwrap();
    assert_eq!(results["strava_to_onedrive"].success, 10);

    // First list call honored the custom start.
    assert_eq!(h.source.lock().unwrap().list_calls[0].0, custom_start);

    let cursor = h
        .engine
        .windows()
        .migration_progress(h.engine.database(), &dir)
        .unwrap()
        .unwrap();
    assert_eq!(cursor, latest);

    // The next invocation picks up at the cursor, not the custom start.
    h.engine.run_sync(Some(&[dir]), 10, SyncMode::Migration).unwrap();
    assert_eq!(h.source.lock().unwrap().list_calls[1].0, cursor);
}

/// Property 4: the migration cursor never moves backwards, batch after batch.
#[test]
fn migration_cursor_is_monotonic() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    let dir = direction("strava_to_garmin");

    let t1 = Utc.with_ymd_and_hms(2016, 3, 1, 9, 0, 0).unwrap();
    h.source.lock().unwrap().activities =
        vec![activity("a1", "Run 1", "Run", t1, 8000.0, 2400)];
    h.engine.run_sync(Some(&[dir]), 10, SyncMode::Migration).unwrap();

    let cursor_after_first = h
        .engine
        .windows()
        .migration_progress(h.engine.database(), &dir)
        .unwrap()
        .unwrap();

    let t2 = t1 + Duration::days(30);
    h.source.lock().unwrap().activities =
        vec![activity("a2", "Run 2", "Run", t2, 8000.0, 2400)];
    h.engine.run_sync(Some(&[dir]), 10, SyncMode::Migration).unwrap();

    let cursor_after_second = h
        .engine
        .windows()
        .migration_progress(h.engine.database(), &dir)
        .unwrap()
        .unwrap();
    assert!(cursor_after_second >= cursor_after_first);
    assert_eq!(cursor_after_second, t2);
}

/// S3: an activity already synced in this direction is skipped without any
/// upload attempt or new registry rows.
#[test]
fn already_synced_activity_is_skipped() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);

    let start = recent(1);
    let meta = ActivityMetadata {
        name: "Morning Run".to_string(),
        sport_type: "Run".to_string(),
        start_time: start,
        distance: 5000.0,
        duration: 1800,
        elevation_gain: None,
    };

    // Seed the registry as if both sides already know this activity.
    let fp = {
        let db = h.engine.database_mut();
        let fp = db.upsert_activity(&meta, Platform::Strava, "123").unwrap();
        db.upsert_activity(&meta, Platform::Garmin, "999").unwrap();
        db.set_sync_status(&fp, Platform::Strava, Platform::Garmin, actsync::models::SyncState::Synced)
            .unwrap();
        fp
    };
    let stats_before = h.engine.database().statistics().unwrap();

    // The same ride comes back from the source as a fresh object.
    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", start, 5000.0, 1800)];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].skipped, 1);
    assert_eq!(results["strava_to_garmin"].success, 0);
    assert!(h.target.lock().unwrap().uploads.is_empty());
    assert_eq!(h.source.lock().unwrap().downloads, 0);

    let stats_after = h.engine.database().statistics().unwrap();
    assert_eq!(stats_before.total_activities, stats_after.total_activities);
    assert_eq!(stats_before.sync_status, stats_after.sync_status);
    assert!(h.engine.database().is_synced(&fp, Platform::Strava, Platform::Garmin).unwrap());
}

/// S4: manual (file-less) activities are skipped before touching the
/// registry, the cache, or the network.
#[test]
fn manual_activity_is_skipped_without_side_effects() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);

    let mut manual = activity("555", "Lunch Yoga", "Yoga", recent(1), 0.0, 2700);
    manual["manual"] = json!(true);
    h.source.lock().unwrap().activities = vec![manual];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].skipped, 1);
    assert_eq!(h.engine.database().statistics().unwrap().total_activities, 0);
    assert_eq!(h.source.lock().unwrap().downloads, 0);
    assert!(h.target.lock().unwrap().uploads.is_empty());
}

/// S5: a duplicate response from the target counts as success and records
/// the pairing as synced.
#[test]
fn duplicate_upload_response_counts_as_synced() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    h.target.lock().unwrap().upload_behavior = UploadBehavior::Duplicate;

    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].success, 1);
    assert_eq!(results["strava_to_garmin"].failed, 0);

    let stats = h.engine.database().statistics().unwrap();
    assert_eq!(
        stats.sync_status.get("strava_to_garmin").and_then(|s| s.get("synced")),
        Some(&1)
    );
}

/// S6: hitting the quarter-hour quota mid-batch stops the loop cleanly, the
/// cursor covers what completed, and untouched activities are neither
/// succeeded nor failed.
#[test]
fn rate_limit_stops_batch_and_commits_partial_cursor() {
    // One list call plus one download per activity; quota of three lets the
    // list and two downloads through before the between-activity check trips.
    let mut h = harness(Platform::Strava, Platform::Garmin, Some(3));
    let dir = direction("strava_to_garmin");

    let base = Utc.with_ymd_and_hms(2017, 5, 1, 7, 0, 0).unwrap();
    h.source.lock().unwrap().activities = (0..3)
        .map(|i| {
            activity(
                &format!("a{}", i),
                &format!("Run {}", i),
                "Run",
                base + Duration::days(i64::from(i)),
                5000.0,
                1800,
            )
        })
        .collect();

    let results = h.engine.run_sync(Some(&[dir]), 10, SyncMode::Migration).unwrap();

    let result = &results["strava_to_garmin"];
    assert_eq!(result.processed, 2);
    assert_eq!(result.success, 2);
    assert_eq!(result.failed, 0);
    assert!(result.error.is_none());
    assert_eq!(h.target.lock().unwrap().uploads.len(), 2);

    let cursor = h
        .engine
        .windows()
        .migration_progress(h.engine.database(), &dir)
        .unwrap()
        .unwrap();
    assert_eq!(cursor, base + Duration::days(1));
}

/// A batch where every activity fails must not advance the incremental
/// anchor, so the next run sees the same activities again.
#[test]
fn fully_failed_batch_keeps_last_sync_anchor() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    h.target.lock().unwrap().upload_behavior = UploadBehavior::Fail;

    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].failed, 1);
    assert!(results["strava_to_garmin"].error.is_none());
    assert_eq!(h.engine.database().get_last_sync(Platform::Strava).unwrap(), None);

    let stats = h.engine.database().statistics().unwrap();
    assert_eq!(
        stats.sync_status.get("strava_to_garmin").and_then(|s| s.get("failed")),
        Some(&1)
    );
}

/// A failed download marks the pairing failed and moves on.
#[test]
fn failed_download_counts_failed_and_continues() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    h.source.lock().unwrap().fail_downloads = true;

    h.source.lock().unwrap().activities = vec![
        activity("1", "Run A", "Run", recent(2), 5000.0, 1800),
        activity("2", "Run B", "Run", recent(1), 6000.0, 2100),
    ];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].failed, 2);
    assert_eq!(results["strava_to_garmin"].processed, 2);
    assert!(results["strava_to_garmin"].error.is_none());
    assert!(h.target.lock().unwrap().uploads.is_empty());
}

/// A fuzzy cross-platform duplicate with a cached file lends it, so no
/// download happens for the re-recorded activity.
#[test]
fn duplicate_probe_borrows_cached_file() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);

    // An earlier sighting from Garmin, two minutes off the Strava clock,
    // with its file already cached.
    let start = recent(1);
    let garmin_meta = ActivityMetadata {
        name: "Evening Ride".to_string(),
        sport_type: "cycling".to_string(),
        start_time: start - Duration::minutes(2),
        distance: 30000.0,
        duration: 5400,
        elevation_gain: None,
    };
    let garmin_fp = activity_fingerprint(&garmin_meta);
    let blob = h.config.storage.cache_dir.join(format!("{}.fit", garmin_fp));
    std::fs::write(&blob, b"fit-bytes").unwrap();
    {
        let db = h.engine.database_mut();
        db.upsert_activity(&garmin_meta, Platform::Garmin, "g1").unwrap();
        db.add_file_cache(&garmin_fp, actsync::models::FileFormat::Fit, &blob).unwrap();
    }

    h.source.lock().unwrap().activities =
        vec![activity("s1", "Evening Ride", "Ride", start, 30000.0, 5400)];

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].success, 1);
    // The borrowed file made the download unnecessary.
    assert_eq!(h.source.lock().unwrap().downloads, 0);
    let target = h.target.lock().unwrap();
    assert_eq!(target.uploads.len(), 1);
    assert_eq!(target.uploads[0].0, blob);
}

/// An unregistered platform aborts its direction with an error while other
/// directions still run; the result map is always complete.
#[test]
fn missing_adapter_errors_one_direction_only() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    let dirs = [direction("igpsport_to_intervals_icu"), direction("strava_to_garmin")];
    let results = h.engine.run_sync(Some(&dirs), 10, SyncMode::Incremental).unwrap();

    assert_eq!(results.len(), 2);
    assert!(results["igpsport_to_intervals_icu"].error.is_some());
    assert_eq!(results["strava_to_garmin"].success, 1);
}

/// With no explicit directions, the enabled sync rules drive the run.
#[test]
fn default_directions_follow_sync_rules() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);

    // Stock rules enable strava<->garmin both ways; turn one off.
    h.engine.set_rule(Platform::Garmin, Platform::Strava, false).unwrap();

    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    let results = h.engine.run_sync(None, 10, SyncMode::Incremental).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.contains_key("strava_to_garmin"));
}

/// Cancellation between activities ends the run cleanly with a partial
/// result and leaves the incremental anchor untouched.
#[test]
fn cancellation_returns_partial_result() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    h.engine.cancel_handle().store(true, Ordering::Relaxed);

    let results = h
        .engine
        .run_sync(Some(&[direction("strava_to_garmin")]), 10, SyncMode::Incremental)
        .unwrap();

    assert_eq!(results["strava_to_garmin"].processed, 0);
    assert!(results["strava_to_garmin"].error.is_none());
    assert_eq!(h.engine.database().get_last_sync(Platform::Strava).unwrap(), None);
}

/// A completed migration direction becomes a no-op.
#[test]
fn completed_migration_short_circuits() {
    let mut h = harness(Platform::Strava, Platform::Garmin, None);
    let dir = direction("strava_to_garmin");

    h.engine
        .windows()
        .commit_migration_progress(h.engine.database(), &dir, Utc::now() - Duration::hours(2))
        .unwrap();

    h.source.lock().unwrap().activities =
        vec![activity("123", "Morning Run", "Run", recent(1), 5000.0, 1800)];

    let results = h.engine.run_sync(Some(&[dir]), 10, SyncMode::Migration).unwrap();
    assert_eq!(results["strava_to_garmin"].processed, 0);
    assert!(h.source.lock().unwrap().list_calls.is_empty());
}
