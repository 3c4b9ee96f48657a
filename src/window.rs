//! Sync window computation
//!
//! Yields the `[start, end)` time range a direction considers in one batch.
//! Incremental mode tops up from the per-source last-sync timestamp with an
//! overlap so border activities are not missed; migration mode walks history
//! forward from a persisted per-direction cursor and survives interruption.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use crate::database::{DatabaseError, SyncDatabase};
use crate::models::{format_instant, parse_instant, Direction, Platform};

/// Window-policy knobs; all instants UTC
#[derive(Debug, Clone, Copy)]
pub struct WindowPolicy {
    /// First-sync (and stale-sync reset) lookback in days
    pub lookback_days: i64,

    /// Overlap subtracted from the last-sync anchor in hours
    pub overlap_hours: i64,

    /// Minimum catch-up window in days for frequent syncers
    pub min_window_days: i64,

    /// Migration start when neither a cursor nor a custom start exists
    pub default_migration_start: DateTime<Utc>,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            overlap_hours: 1,
            min_window_days: 7,
            // Earliest plausible recorded-activity era.
            default_migration_start: Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

/// Computes sync windows and owns the migration cursor bookkeeping
#[derive(Debug, Clone, Default)]
pub struct SyncWindowManager {
    policy: WindowPolicy,
}

impl SyncWindowManager {
    pub fn new(policy: WindowPolicy) -> Self {
        Self { policy }
    }

    /// Incremental window for a source platform, ending now
    pub fn incremental_window(
        &self,
        db: &SyncDatabase,
        platform: Platform,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DatabaseError> {
        self.incremental_window_at(db, platform, Utc::now())
    }

    pub fn incremental_window_at(
        &self,
        db: &SyncDatabase,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DatabaseError> {
        let lookback = Duration::days(self.policy.lookback_days);

        let start = match db.get_last_sync(platform)? {
            None => {
                debug!("{}: first sync, {}-day lookback", platform, self.policy.lookback_days);
                now - lookback
            }
            Some(last_sync) if now - last_sync > lookback => {
                // Too stale to trust the anchor; behave like a first sync.
                debug!("{}: last sync too old, resetting to {}-day lookback", platform, self.policy.lookback_days);
                now - lookback
            }
            Some(last_sync) => {
                let anchored = last_sync - Duration::hours(self.policy.overlap_hours);
                let floor = now - Duration::days(self.policy.min_window_days);
                anchored.min(floor)
            }
        };

        Ok((start, now))
    }

    /// Migration window for a direction, ending now
    pub fn migration_window(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DatabaseError> {
        self.migration_window_at(db, direction, Utc::now())
    }

    pub fn migration_window_at(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DatabaseError> {
        let start = match self.migration_progress(db, direction)? {
            Some(cursor) => {
                debug!("{}: resuming migration from {}", direction, cursor);
                cursor
            }
            None => match self.migration_start(db, direction)? {
                Some(custom) => {
                    debug!("{}: first migration batch from custom start {}", direction, custom);
                    custom
                }
                None => {
                    debug!("{}: first migration batch from default start", direction);
                    self.policy.default_migration_start
                }
            },
        };

        Ok((start, now))
    }

    /// Chronological cursor of the last migrated activity, if any
    pub fn migration_progress(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Ok(db
            .get_config(&format!("migration_progress_{}", direction))?
            .as_deref()
            .and_then(parse_instant))
    }

    /// Advance the cursor; never moves backwards
    pub fn commit_migration_progress(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
        latest_activity_time: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let cursor = match self.migration_progress(db, direction)? {
            Some(prior) => prior.max(latest_activity_time),
            None => latest_activity_time,
        };
        db.set_config(
            &format!("migration_progress_{}", direction),
            &format_instant(cursor),
        )?;
        debug!("{}: migration progress committed at {}", direction, cursor);
        Ok(())
    }

    /// User-chosen start of the historical backfill
    pub fn migration_start(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Ok(db
            .get_config(&format!("migration_start_time_{}", direction))?
            .as_deref()
            .and_then(parse_instant))
    }

    pub fn set_migration_start(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
        start: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        db.set_config(
            &format!("migration_start_time_{}", direction),
            &format_instant(start),
        )
    }

    /// A direction whose cursor is within a day of now has caught up
    pub fn is_migration_complete(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
    ) -> Result<bool, DatabaseError> {
        self.is_migration_complete_at(db, direction, Utc::now())
    }

    pub fn is_migration_complete_at(
        &self,
        db: &SyncDatabase,
        direction: &Direction,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        match self.migration_progress(db, direction)? {
            Some(cursor) => Ok(now - cursor <= Duration::days(1)),
            None => Ok(false),
        }
    }
}
