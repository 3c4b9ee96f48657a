use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fitness platforms known to the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Strava,
    Garmin,
    GarminCn,
    Igpsport,
    Onedrive,
    IntervalsIcu,
    Mywhoosh,
}

impl Platform {
    /// Canonical lower-case identifier used in config keys and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Strava => "strava",
            Platform::Garmin => "garmin",
            Platform::GarminCn => "garmin_cn",
            Platform::Igpsport => "igpsport",
            Platform::Onedrive => "onedrive",
            Platform::IntervalsIcu => "intervals_icu",
            Platform::Mywhoosh => "mywhoosh",
        }
    }

    pub fn all() -> &'static [Platform] {
        &[
            Platform::Strava,
            Platform::Garmin,
            Platform::GarminCn,
            Platform::Igpsport,
            Platform::Onedrive,
            Platform::IntervalsIcu,
            Platform::Mywhoosh,
        ]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strava" => Ok(Platform::Strava),
            "garmin" => Ok(Platform::Garmin),
            "garmin_cn" => Ok(Platform::GarminCn),
            "igpsport" => Ok(Platform::Igpsport),
            "onedrive" => Ok(Platform::Onedrive),
            "intervals_icu" => Ok(Platform::IntervalsIcu),
            "mywhoosh" => Ok(Platform::Mywhoosh),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// An ordered (source, target) pair describing a unidirectional sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Direction {
    pub source: Platform,
    pub target: Platform,
}

impl Direction {
    pub fn new(source: Platform, target: Platform) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_to_{}", self.source, self.target)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, target) = s
            .split_once("_to_")
            .ok_or_else(|| format!("Invalid sync direction: {}", s))?;
        Ok(Self {
            source: source.parse()?,
            target: target.parse()?,
        })
    }
}

/// How a direction scans its source platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Top-up from the per-source last-sync timestamp with overlap
    Incremental,
    /// Chronological historical backfill resuming from a per-direction cursor
    Migration,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => f.write_str("incremental"),
            SyncMode::Migration => f.write_str("migration"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(SyncMode::Incremental),
            "migration" => Ok(SyncMode::Migration),
            _ => Err(format!("Unknown sync mode: {}", s)),
        }
    }
}

/// Activity file formats the cache understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Fit,
    Tcx,
    Gpx,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Fit => "fit",
            FileFormat::Tcx => "tcx",
            FileFormat::Gpx => "gpx",
        }
    }

    /// Preference order when probing the cache for an existing file
    pub fn all() -> &'static [FileFormat] {
        &[FileFormat::Fit, FileFormat::Tcx, FileFormat::Gpx]
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(FileFormat::Fit),
            "tcx" => Ok(FileFormat::Tcx),
            "gpx" => Ok(FileFormat::Gpx),
            _ => Err(format!("Unknown file format: {}", s)),
        }
    }
}

/// Per-(fingerprint, source, target) sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "failed" => Ok(SyncState::Failed),
            _ => Err(format!("Unknown sync state: {}", s)),
        }
    }
}

/// Normalized, platform-neutral description of one recorded workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    /// Activity title as shown on the source platform
    pub name: String,

    /// Sport type label from the source platform
    pub sport_type: String,

    /// Start instant in UTC
    pub start_time: DateTime<Utc>,

    /// Total distance in meters
    pub distance: f64,

    /// Elapsed duration in seconds
    pub duration: u32,

    /// Total elevation gain in meters, when the platform reports it
    pub elevation_gain: Option<f64>,
}

/// Map a platform's sport label onto the engine's normalized vocabulary.
///
/// Lower-cases, replaces spaces with underscores, then collapses known
/// aliases. Unknown labels pass through unchanged.
pub fn normalize_sport_type(raw: &str) -> String {
    let key = raw.to_lowercase().replace(' ', "_");
    match key.as_str() {
        "run" | "running" | "trail_run" | "treadmill_running" => "running".to_string(),
        "ride" | "cycling" | "virtual_ride" | "e_bike_ride" | "mountain_bike_ride"
        | "road_bike_ride" => "cycling".to_string(),
        "swim" | "swimming" | "open_water_swimming" | "pool_swimming" => "swimming".to_string(),
        "walk" | "walking" | "hike" | "hiking" => "walking".to_string(),
        _ => key,
    }
}

/// Whether two already-normalized sport labels belong to the same family
pub fn are_similar_sports(a: &str, b: &str) -> bool {
    const GROUPS: &[&[&str]] = &[
        &["running", "trail_running", "treadmill_running"],
        &["cycling", "mountain_biking", "road_cycling", "virtual_cycling"],
        &["swimming", "open_water_swimming", "pool_swimming"],
        &["walking", "hiking"],
    ];

    GROUPS
        .iter()
        .any(|group| group.contains(&a) && group.contains(&b))
}

/// Parse a stored or user-supplied instant, promoting naive values to UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (optionally with fraction), and
/// bare `YYYY-MM-DD` (midnight).
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }

    None
}

/// Fixed-width UTC rendering used for every instant the engine persists.
///
/// The format sorts lexicographically, which the registry relies on for
/// time-window queries over TEXT columns.
pub fn format_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_direction_roundtrip() {
        let d: Direction = "strava_to_garmin".parse().unwrap();
        assert_eq!(d.source, Platform::Strava);
        assert_eq!(d.target, Platform::Garmin);
        assert_eq!(d.to_string(), "strava_to_garmin");
    }

    #[test]
    fn test_direction_with_compound_platform_names() {
        let d: Direction = "garmin_cn_to_garmin".parse().unwrap();
        assert_eq!(d.source, Platform::GarminCn);
        assert_eq!(d.target, Platform::Garmin);

        let d: Direction = "igpsport_to_intervals_icu".parse().unwrap();
        assert_eq!(d.source, Platform::Igpsport);
        assert_eq!(d.target, Platform::IntervalsIcu);

        let d: Direction = "garmin_to_garmin_cn".parse().unwrap();
        assert_eq!(d.target, Platform::GarminCn);
    }

    #[test]
    fn test_direction_rejects_malformed() {
        assert!("strava".parse::<Direction>().is_err());
        assert!("strava_to_mars".parse::<Direction>().is_err());
    }

    #[test]
    fn test_sport_normalization() {
        assert_eq!(normalize_sport_type("Run"), "running");
        assert_eq!(normalize_sport_type("Trail Run"), "running");
        assert_eq!(normalize_sport_type("virtual_ride"), "cycling");
        assert_eq!(normalize_sport_type("E Bike Ride"), "cycling");
        assert_eq!(normalize_sport_type("open_water_swimming"), "swimming");
        assert_eq!(normalize_sport_type("Hike"), "walking");
        assert_eq!(normalize_sport_type("Rowing"), "rowing");
        assert_eq!(normalize_sport_type("Alpine Ski"), "alpine_ski");
    }

    #[test]
    fn test_similar_sports() {
        assert!(are_similar_sports("walking", "hiking"));
        assert!(are_similar_sports("cycling", "virtual_cycling"));
        assert!(!are_similar_sports("running", "cycling"));
        assert!(!are_similar_sports("rowing", "rowing"));
    }

    #[test]
    fn test_parse_instant_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 14, 6, 0, 0).unwrap();
        assert_eq!(parse_instant("2025-06-14T06:00:00Z"), Some(expected));
        assert_eq!(parse_instant("2025-06-14T06:00:00+00:00"), Some(expected));
        assert_eq!(parse_instant("2025-06-14T06:00:00"), Some(expected));

        let midnight = Utc.with_ymd_and_hms(2025, 6, 14, 0, 0, 0).unwrap();
        assert_eq!(parse_instant("2025-06-14"), Some(midnight));

        assert_eq!(parse_instant(""), None);
        assert_eq!(parse_instant("not a date"), None);
    }

    #[test]
    fn test_format_instant_is_fixed_width() {
        let t = Utc.with_ymd_and_hms(2025, 6, 14, 6, 0, 0).unwrap();
        assert_eq!(format_instant(t), "2025-06-14T06:00:00Z");
        assert_eq!(parse_instant(&format_instant(t)), Some(t));
    }
}
