//! Activity fingerprinting
//!
//! Collapses the same workout recorded on different platforms (or different
//! devices) onto one 32-hex digest by hashing a coarsened projection of its
//! metadata. Platform-assigned IDs never participate, so the fingerprint is
//! the cross-platform primary key of the registry.

use md5::{Digest, Md5};

use crate::models::{normalize_sport_type, ActivityMetadata};

/// Distance is bucketed into 50-metre bins before hashing
const DISTANCE_BUCKET_METERS: f64 = 50.0;

/// Duration is bucketed into 30-second bins before hashing
const DURATION_BUCKET_SECONDS: f64 = 30.0;

/// Compute the 32-character lowercase hex fingerprint for an activity.
///
/// Two activities whose start times fall in the same minute, whose normalized
/// sports agree, and whose distance and duration land in the same buckets
/// produce the same digest.
pub fn activity_fingerprint(meta: &ActivityMetadata) -> String {
    let digest = Md5::digest(canonical_projection(meta).as_bytes());
    format!("{:x}", digest)
}

/// The canonical key-sorted serialization that gets hashed.
///
/// Key order, separators, and number rendering are part of the stored data
/// format: any change invalidates every fingerprint already in a registry.
pub fn canonical_projection(meta: &ActivityMetadata) -> String {
    let distance = bucket(meta.distance, DISTANCE_BUCKET_METERS);
    let duration = bucket(f64::from(meta.duration), DURATION_BUCKET_SECONDS);
    let sport = normalize_sport_type(&meta.sport_type);
    let minute = meta.start_time.format("%Y-%m-%dT%H:%M");

    format!(
        "{{\"distance\":{},\"duration\":{},\"sport_type\":\"{}\",\"start_time\":\"{}\"}}",
        distance, duration, sport, minute
    )
}

fn bucket(value: f64, size: f64) -> i64 {
    ((value / size).round() as i64) * (size as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn meta(sport: &str, secs_offset: i64, distance: f64, duration: u32) -> ActivityMetadata {
        ActivityMetadata {
            name: "Morning Run".to_string(),
            sport_type: sport.to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 6, 14, 6, 0, 0).unwrap()
                + Duration::seconds(secs_offset),
            distance,
            duration,
            elevation_gain: None,
        }
    }

    #[test]
    fn test_canonical_projection_format() {
        let m = meta("Run", 0, 5000.0, 1800);
        assert_eq!(
            canonical_projection(&m),
            r#"{"distance":5000,"duration":1800,"sport_type":"running","start_time":"2025-06-14T06:00"}"#
        );
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = activity_fingerprint(&meta("Run", 0, 5000.0, 1800));
        assert_eq!(fp.len(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let m = meta("Ride", 0, 40210.5, 5403);
        assert_eq!(activity_fingerprint(&m), activity_fingerprint(&m.clone()));
    }

    #[test]
    fn test_fingerprint_ignores_platform_label_variants() {
        // Strava says "Run", Garmin says "running"; same digest either way.
        let a = meta("Run", 0, 5000.0, 1800);
        let b = meta("running", 0, 5000.0, 1800);
        assert_eq!(activity_fingerprint(&a), activity_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_tolerates_small_drift() {
        let a = meta("Run", 10, 5000.0, 1800);
        let b = meta("Run", 40, 5010.0, 1805);
        assert_eq!(activity_fingerprint(&a), activity_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_separates_minutes() {
        let a = meta("Run", 59, 5000.0, 1800);
        let b = meta("Run", 60, 5000.0, 1800);
        assert_ne!(activity_fingerprint(&a), activity_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_separates_sports() {
        let a = meta("Run", 0, 5000.0, 1800);
        let b = meta("Walk", 0, 5000.0, 1800);
        assert_ne!(activity_fingerprint(&a), activity_fingerprint(&b));
    }

    proptest! {
        // Activities inside half a bucket of each other always collide.
        #[test]
        fn prop_fingerprint_stable_within_tolerances(
            base_secs in 0i64..59,
            distance in 0.0f64..100_000.0,
            duration in 0u32..50_000,
            d_jitter in -24.0f64..24.0,
            s_jitter in -14i32..14,
        ) {
            let a = meta("Run", base_secs, distance, duration);
            // Keep both readings inside the same bucket by jittering around
            // the bucket center rather than the raw value.
            let centered_d = (distance / 50.0).round() * 50.0;
            let centered_s = ((f64::from(duration) / 30.0).round() * 30.0) as i64;
            let b = meta(
                "Run",
                base_secs,
                (centered_d + d_jitter).max(0.0),
                u32::try_from((centered_s + i64::from(s_jitter)).max(0)).unwrap(),
            );
            let centered = meta("Run", base_secs, centered_d, u32::try_from(centered_s.max(0)).unwrap());
            prop_assert_eq!(activity_fingerprint(&b), activity_fingerprint(&centered));
            // And the original reading maps to the same bucket as its center.
            prop_assert_eq!(activity_fingerprint(&a), activity_fingerprint(&centered));
        }

        #[test]
        fn prop_fingerprint_always_32_lower_hex(
            secs in 0i64..86_400,
            distance in 0.0f64..500_000.0,
            duration in 0u32..200_000,
        ) {
            let fp = activity_fingerprint(&meta("Ride", secs, distance, duration));
            prop_assert_eq!(fp.len(), 32);
            prop_assert!(fp.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }
}
