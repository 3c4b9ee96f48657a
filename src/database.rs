use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::{
    format_instant, normalize_sport_type, parse_instant, are_similar_sports, ActivityMetadata,
    Direction, FileFormat, Platform, SyncState,
};
use crate::fingerprint::activity_fingerprint;
use crate::rate_limit::RateLimitSnapshot;

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Aggregated registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatistics {
    /// Distinct fingerprinted activities known to the registry
    pub total_activities: i64,

    /// Mapped activity count per platform
    pub platform_counts: BTreeMap<String, i64>,

    /// Status histogram per direction, e.g. `strava_to_garmin -> {synced: 12}`
    pub sync_status: BTreeMap<String, BTreeMap<String, i64>>,

    /// Last incremental sync instant per source platform
    pub last_sync: BTreeMap<String, String>,

    /// File cache index rows
    pub cache_files: i64,

    pub database_path: String,
}

/// Persistent registry and state store for the sync engine.
///
/// Single-writer SQLite database holding the fingerprinted activity table,
/// platform mappings, per-direction sync statuses, the file cache index, and
/// the key/value sync config. The orchestrator reads and writes exclusively
/// through this type.
pub struct SyncDatabase {
    conn: Connection,
    path: PathBuf,
}

impl SyncDatabase {
    /// Create or open a registry database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path.as_ref())?;
        let mut db = Self {
            conn,
            path: db_path.as_ref().to_path_buf(),
        };

        db.init_schema()?;
        Ok(db)
    }

    /// Initialize schema, indexes, and default sync rules
    fn init_schema(&mut self) -> Result<(), DatabaseError> {
        // WAL allows concurrent readers alongside the single writer.
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activity_records (
                fingerprint TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sport_type TEXT NOT NULL,
                start_time TEXT NOT NULL,
                distance REAL NOT NULL,
                duration INTEGER NOT NULL,
                elevation_gain REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS platform_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL,
                platform TEXT NOT NULL,
                activity_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (fingerprint) REFERENCES activity_records (fingerprint),
                UNIQUE(fingerprint, platform)
            );

            CREATE TABLE IF NOT EXISTS sync_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL,
                source_platform TEXT NOT NULL,
                target_platform TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (fingerprint) REFERENCES activity_records (fingerprint),
                UNIQUE(fingerprint, source_platform, target_platform)
            );

            CREATE TABLE IF NOT EXISTS file_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL,
                file_format TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (fingerprint) REFERENCES activity_records (fingerprint),
                UNIQUE(fingerprint, file_format)
            );

            CREATE TABLE IF NOT EXISTS sync_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_limits (
                platform TEXT PRIMARY KEY,
                daily_calls INTEGER NOT NULL DEFAULT 0,
                quarter_hour_calls INTEGER NOT NULL DEFAULT 0,
                daily_limit INTEGER NOT NULL,
                quarter_hour_limit INTEGER NOT NULL,
                daily_reset_at TEXT NOT NULL,
                quarter_reset_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_start_time
                ON activity_records (start_time);
            CREATE INDEX IF NOT EXISTS idx_mappings_platform
                ON platform_mappings (platform);
            CREATE INDEX IF NOT EXISTS idx_file_cache_created
                ON file_cache (created_at);
            "#,
        )?;

        self.seed_default_config()?;
        debug!("registry schema ready at {}", self.path.display());
        Ok(())
    }

    /// The stock bidirectional pair ships enabled; everything else opts in.
    fn seed_default_config(&self) -> Result<(), DatabaseError> {
        let now = format_instant(Utc::now());
        for key in ["sync_rule_strava_to_garmin", "sync_rule_garmin_to_strava"] {
            self.conn.execute(
                "INSERT OR IGNORE INTO sync_config (key, value, updated_at) VALUES (?1, 'true', ?2)",
                params![key, now],
            )?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically record an activity sighting: insert-or-update the activity
    /// row (preserving `created_at`) and the platform mapping. Returns the
    /// fingerprint. Idempotent.
    pub fn upsert_activity(
        &mut self,
        meta: &ActivityMetadata,
        platform: Platform,
        activity_id: &str,
    ) -> Result<String, DatabaseError> {
        let fingerprint = activity_fingerprint(meta);
        let now = format_instant(Utc::now());

        let tx = self.conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO activity_records
                (fingerprint, name, sport_type, start_time, distance, duration, elevation_gain, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(fingerprint) DO UPDATE SET
                name = excluded.name,
                sport_type = excluded.sport_type,
                start_time = excluded.start_time,
                distance = excluded.distance,
                duration = excluded.duration,
                elevation_gain = excluded.elevation_gain,
                updated_at = excluded.updated_at
            "#,
            params![
                fingerprint,
                meta.name,
                meta.sport_type,
                format_instant(meta.start_time),
                meta.distance,
                meta.duration,
                meta.elevation_gain,
                now,
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO platform_mappings (fingerprint, platform, activity_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(fingerprint, platform) DO UPDATE SET
                activity_id = excluded.activity_id
            "#,
            params![fingerprint, platform.as_str(), activity_id, now],
        )?;

        tx.commit()?;
        debug!("upserted activity {} ({} on {})", fingerprint, activity_id, platform);
        Ok(fingerprint)
    }

    /// Upsert the sync state for one (fingerprint, source, target) triple
    pub fn set_sync_status(
        &self,
        fingerprint: &str,
        source: Platform,
        target: Platform,
        status: SyncState,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            r#"
            INSERT INTO sync_status (fingerprint, source_platform, target_platform, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(fingerprint, source_platform, target_platform) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
            params![
                fingerprint,
                source.as_str(),
                target.as_str(),
                status.as_str(),
                format_instant(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// An activity counts as synced only when a `synced` status row exists
    /// AND the fingerprint is mapped on both sides. A stale status row not
    /// backed by actual presence on both platforms reads as not-synced.
    pub fn is_synced(
        &self,
        fingerprint: &str,
        source: Platform,
        target: Platform,
    ) -> Result<bool, DatabaseError> {
        let platform_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM platform_mappings WHERE fingerprint = ?1 AND platform IN (?2, ?3)",
            params![fingerprint, source.as_str(), target.as_str()],
            |row| row.get(0),
        )?;

        if platform_count < 2 {
            return Ok(false);
        }

        let status: Option<String> = self
            .conn
            .query_row(
                r#"
                SELECT status FROM sync_status
                WHERE fingerprint = ?1 AND source_platform = ?2 AND target_platform = ?3
                "#,
                params![fingerprint, source.as_str(), target.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(status.as_deref() == Some(SyncState::Synced.as_str()))
    }

    /// Coarse candidate set for the matcher: activities whose start falls
    /// within `radius` of the probe and whose sport is the same normalized
    /// form or in the same similarity family.
    pub fn find_similar_by_time_and_sport(
        &self,
        start_time: DateTime<Utc>,
        sport_type: &str,
        radius: Duration,
    ) -> Result<Vec<(String, ActivityMetadata)>, DatabaseError> {
        let lo = format_instant(start_time - radius);
        let hi = format_instant(start_time + radius);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT fingerprint, name, sport_type, start_time, distance, duration, elevation_gain
            FROM activity_records
            WHERE start_time BETWEEN ?1 AND ?2
            ORDER BY start_time
            "#,
        )?;

        let rows = stmt.query_map(params![lo, hi], |row| {
            let fingerprint: String = row.get("fingerprint")?;
            Ok((fingerprint, Self::metadata_from_row(row)?))
        })?;

        let probe_sport = normalize_sport_type(sport_type);
        let mut candidates = Vec::new();
        for row in rows {
            let (fingerprint, meta) = row?;
            let candidate_sport = normalize_sport_type(&meta.sport_type);
            if candidate_sport == probe_sport || are_similar_sports(&candidate_sport, &probe_sport)
            {
                candidates.push((fingerprint, meta));
            }
        }
        Ok(candidates)
    }

    fn metadata_from_row(row: &Row) -> rusqlite::Result<ActivityMetadata> {
        let start_str: String = row.get("start_time")?;
        let start_time = parse_instant(&start_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unparsable start_time: {}", start_str).into(),
            )
        })?;

        Ok(ActivityMetadata {
            name: row.get("name")?,
            sport_type: row.get("sport_type")?,
            start_time,
            distance: row.get("distance")?,
            duration: row.get("duration")?,
            elevation_gain: row.get("elevation_gain")?,
        })
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM sync_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, format_instant(Utc::now())],
        )?;
        debug!("config set: {} = {}", key, value);
        Ok(())
    }

    pub fn get_last_sync(&self, platform: Platform) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Ok(self
            .get_config(&format!("last_sync_{}", platform))?
            .as_deref()
            .and_then(parse_instant))
    }

    pub fn set_last_sync(
        &self,
        platform: Platform,
        sync_time: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.set_config(&format!("last_sync_{}", platform), &format_instant(sync_time))
    }

    pub fn is_sync_enabled(&self, direction: &Direction) -> Result<bool, DatabaseError> {
        let value = self.get_config(&format!("sync_rule_{}", direction))?;
        Ok(value.as_deref() == Some("true"))
    }

    pub fn set_sync_rule(&self, direction: &Direction, enabled: bool) -> Result<(), DatabaseError> {
        self.set_config(
            &format!("sync_rule_{}", direction),
            if enabled { "true" } else { "false" },
        )
    }

    /// Directions whose sync rule is enabled, used as the default direction
    /// set when the caller does not name any
    pub fn enabled_directions(&self) -> Result<Vec<Direction>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM sync_config WHERE key LIKE 'sync_rule_%' AND value = 'true' ORDER BY key",
        )?;
        let keys = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut directions = Vec::new();
        for key in keys {
            let key = key?;
            let name = key.trim_start_matches("sync_rule_");
            match name.parse::<Direction>() {
                Ok(direction) => directions.push(direction),
                Err(_) => warn!("ignoring unrecognized sync rule key: {}", key),
            }
        }
        Ok(directions)
    }

    /// Record a cache file for (fingerprint, format). The size is read from
    /// disk; a missing file records size zero.
    pub fn add_file_cache(
        &self,
        fingerprint: &str,
        format: FileFormat,
        file_path: &Path,
    ) -> Result<(), DatabaseError> {
        let file_size = fs::metadata(file_path).map(|m| m.len()).unwrap_or(0);

        self.conn.execute(
            r#"
            INSERT INTO file_cache (fingerprint, file_format, file_path, file_size, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(fingerprint, file_format) DO UPDATE SET
                file_path = excluded.file_path,
                file_size = excluded.file_size,
                created_at = excluded.created_at
            "#,
            params![
                fingerprint,
                format.extension(),
                file_path.to_string_lossy(),
                file_size as i64,
                format_instant(Utc::now()),
            ],
        )?;
        debug!("cached file indexed: {}.{}", fingerprint, format);
        Ok(())
    }

    /// A hit requires the index row, the blob on disk, and (when a size was
    /// recorded) an unchanged blob size
    pub fn get_cached_file(
        &self,
        fingerprint: &str,
        format: FileFormat,
    ) -> Result<Option<PathBuf>, DatabaseError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT file_path, file_size FROM file_cache WHERE fingerprint = ?1 AND file_format = ?2",
                params![fingerprint, format.extension()],
                |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0))),
            )
            .optional()?;

        Ok(row.and_then(|(path, recorded_size)| {
            let path = PathBuf::from(path);
            let on_disk = fs::metadata(&path).map(|m| m.len() as i64).ok()?;
            if recorded_size > 0 && on_disk != recorded_size {
                warn!(
                    "cache blob {} changed size ({} recorded, {} on disk); treating as miss",
                    path.display(),
                    recorded_size,
                    on_disk
                );
                return None;
            }
            Some(path)
        }))
    }

    /// First available cached file in format preference order
    pub fn cached_file_any_format(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(FileFormat, PathBuf)>, DatabaseError> {
        for format in FileFormat::all() {
            if let Some(path) = self.get_cached_file(fingerprint, *format)? {
                return Ok(Some((*format, path)));
            }
        }
        Ok(None)
    }

    /// Delete cache index rows older than `days` and best-effort unlink their
    /// blobs. A file that is already gone is not an error; a file that cannot
    /// be removed logs a warning. Returns the number of deleted rows.
    pub fn cleanup_file_cache_older_than(&mut self, days: i64) -> Result<usize, DatabaseError> {
        let cutoff = format_instant(Utc::now() - Duration::days(days));

        let tx = self.conn.transaction()?;

        let old_files: Vec<String> = {
            let mut stmt = tx.prepare("SELECT file_path FROM file_cache WHERE created_at < ?1")?;
            let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let deleted = tx.execute("DELETE FROM file_cache WHERE created_at < ?1", params![cutoff])?;
        tx.commit()?;

        for file_path in old_files {
            let path = Path::new(&file_path);
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!("failed to remove cache file {}: {}", file_path, e);
                }
            }
        }

        debug!("cleaned up {} expired cache records", deleted);
        Ok(deleted)
    }

    /// Aggregate registry statistics for status displays
    pub fn statistics(&self) -> Result<SyncStatistics, DatabaseError> {
        let total_activities: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM activity_records", [], |row| row.get(0))?;

        let mut platform_counts = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT platform, COUNT(*) FROM platform_mappings GROUP BY platform")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (platform, count) = row?;
            platform_counts.insert(platform, count);
        }

        let mut sync_status: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_platform, target_platform, status, COUNT(*)
            FROM sync_status
            GROUP BY source_platform, target_platform, status
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows {
            let (source, target, status, count) = row?;
            sync_status
                .entry(format!("{}_to_{}", source, target))
                .or_default()
                .insert(status, count);
        }

        let mut last_sync = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM sync_config WHERE key LIKE 'last_sync_%' AND value != ''",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            last_sync.insert(key.trim_start_matches("last_sync_").to_string(), value);
        }

        let cache_files: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM file_cache", [], |row| row.get(0))?;

        Ok(SyncStatistics {
            total_activities,
            platform_counts,
            sync_status,
            last_sync,
            cache_files,
            database_path: self.path.to_string_lossy().into_owned(),
        })
    }

    /// Persist governor counters so quota accounting survives restarts
    pub fn save_rate_limits(&mut self, snapshots: &[RateLimitSnapshot]) -> Result<(), DatabaseError> {
        let tx = self.conn.transaction()?;
        for snap in snapshots {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO api_limits
                    (platform, daily_calls, quarter_hour_calls, daily_limit, quarter_hour_limit, daily_reset_at, quarter_reset_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    snap.platform.as_str(),
                    snap.daily_calls,
                    snap.quarter_hour_calls,
                    snap.daily_limit,
                    snap.quarter_hour_limit,
                    format_instant(snap.daily_reset_at),
                    format_instant(snap.quarter_reset_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load previously persisted governor counters; rows for platforms that
    /// no longer parse are skipped with a warning.
    pub fn load_rate_limits(&self) -> Result<Vec<RateLimitSnapshot>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT platform, daily_calls, quarter_hour_calls, daily_limit, quarter_hour_limit,
                   daily_reset_at, quarter_reset_at
            FROM api_limits
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (platform, daily_calls, quarter_hour_calls, daily_limit, quarter_hour_limit, daily_reset, quarter_reset) =
                row?;
            let Ok(platform) = platform.parse::<Platform>() else {
                warn!("ignoring rate-limit row for unknown platform: {}", platform);
                continue;
            };
            let (Some(daily_reset_at), Some(quarter_reset_at)) =
                (parse_instant(&daily_reset), parse_instant(&quarter_reset))
            else {
                warn!("ignoring rate-limit row with unparsable reset time for {}", platform);
                continue;
            };
            snapshots.push(RateLimitSnapshot {
                platform,
                daily_calls,
                quarter_hour_calls,
                daily_limit,
                quarter_hour_limit,
                daily_reset_at,
                quarter_reset_at,
            });
        }
        Ok(snapshots)
    }

    /// One-shot import of the predecessor's JSON state file.
    ///
    /// Returns the number of imported activity records. The caller is
    /// responsible for renaming the source file afterwards.
    pub fn import_legacy_json(&mut self, json_path: &Path) -> Result<usize, DatabaseError> {
        let raw = fs::read_to_string(json_path)?;
        let data: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        let now = format_instant(Utc::now());
        let tx = self.conn.transaction()?;
        let mut imported = 0usize;

        if let Some(records) = data.get("sync_records").and_then(|v| v.as_object()) {
            for (fingerprint, record) in records {
                let metadata = record.get("metadata").cloned().unwrap_or_default();
                let start_time = metadata
                    .get("start_time")
                    .and_then(|v| v.as_str())
                    .and_then(parse_instant);
                let Some(start_time) = start_time else {
                    warn!("skipping legacy record {} with unparsable start time", fingerprint);
                    continue;
                };

                let created_at = record
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&now);

                tx.execute(
                    r#"
                    INSERT OR REPLACE INTO activity_records
                        (fingerprint, name, sport_type, start_time, distance, duration, elevation_gain, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                    "#,
                    params![
                        fingerprint,
                        metadata.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                        metadata.get("sport_type").and_then(|v| v.as_str()).unwrap_or(""),
                        format_instant(start_time),
                        metadata.get("distance").and_then(|v| v.as_f64()).unwrap_or(0.0),
                        metadata.get("duration").and_then(|v| v.as_i64()).unwrap_or(0),
                        metadata.get("elevation_gain").and_then(|v| v.as_f64()),
                        created_at,
                    ],
                )?;

                if let Some(platforms) = record.get("platforms").and_then(|v| v.as_object()) {
                    for (platform, activity_id) in platforms {
                        tx.execute(
                            r#"
                            INSERT OR REPLACE INTO platform_mappings (fingerprint, platform, activity_id, created_at)
                            VALUES (?1, ?2, ?3, ?4)
                            "#,
                            params![
                                fingerprint,
                                platform,
                                activity_id.as_str().unwrap_or_default(),
                                created_at,
                            ],
                        )?;
                    }
                }

                if let Some(statuses) = record.get("sync_status").and_then(|v| v.as_object()) {
                    for (direction, status) in statuses {
                        let Some((source, target)) = direction.split_once("_to_") else {
                            continue;
                        };
                        tx.execute(
                            r#"
                            INSERT OR REPLACE INTO sync_status
                                (fingerprint, source_platform, target_platform, status, updated_at)
                            VALUES (?1, ?2, ?3, ?4, ?5)
                            "#,
                            params![
                                fingerprint,
                                source,
                                target,
                                status.as_str().unwrap_or("pending"),
                                created_at,
                            ],
                        )?;
                    }
                }

                if let Some(files) = record.get("files").and_then(|v| v.as_object()) {
                    for (format, file_path) in files {
                        let Some(file_path) = file_path.as_str() else {
                            continue;
                        };
                        let path = Path::new(file_path);
                        if !path.exists() {
                            continue;
                        }
                        let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                        tx.execute(
                            r#"
                            INSERT OR REPLACE INTO file_cache
                                (fingerprint, file_format, file_path, file_size, created_at)
                            VALUES (?1, ?2, ?3, ?4, ?5)
                            "#,
                            params![fingerprint, format, file_path, file_size as i64, created_at],
                        )?;
                    }
                }

                imported += 1;
            }
        }

        if let Some(config) = data.get("sync_config") {
            if let Some(last_sync) = config.get("last_sync").and_then(|v| v.as_object()) {
                for (platform, value) in last_sync {
                    if let Some(value) = value.as_str().filter(|v| !v.is_empty()) {
                        tx.execute(
                            "INSERT OR REPLACE INTO sync_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
                            params![format!("last_sync_{}", platform), value, now],
                        )?;
                    }
                }
            }
            if let Some(rules) = config.get("sync_rules").and_then(|v| v.as_object()) {
                for (direction, enabled) in rules {
                    tx.execute(
                        "INSERT OR REPLACE INTO sync_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
                        params![
                            format!("sync_rule_{}", direction),
                            if enabled.as_bool().unwrap_or(false) { "true" } else { "false" },
                            now,
                        ],
                    )?;
                }
            }
        }

        tx.commit()?;
        debug!("imported {} legacy sync records from {}", imported, json_path.display());
        Ok(imported)
    }
}
