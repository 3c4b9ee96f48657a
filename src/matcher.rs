//! Fuzzy cross-platform activity matching
//!
//! Decides whether two activity records describe the same workout even when
//! their fingerprints differ (clock drift across devices, distance rounding
//! at bucket edges). Four weighted factors feed a confidence score; time and
//! sport agreement are hard requirements.

use std::cmp::Ordering;

use crate::models::{are_similar_sports, normalize_sport_type, ActivityMetadata};

const TIME_WEIGHT: f64 = 0.4;
const SPORT_WEIGHT: f64 = 0.2;
const DISTANCE_WEIGHT: f64 = 0.2;
const DURATION_WEIGHT: f64 = 0.2;

/// Tunable matcher thresholds
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct MatchThresholds {
    /// Maximum start-time difference in minutes
    pub time_tolerance_minutes: f64,

    /// Maximum distance difference as a percentage of the average
    pub distance_tolerance_percent: f64,

    /// Maximum duration difference as a percentage of the average
    pub duration_tolerance_percent: f64,

    /// Minimum weighted confidence for a positive match
    pub min_confidence: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            time_tolerance_minutes: 5.0,
            distance_tolerance_percent: 5.0,
            duration_tolerance_percent: 10.0,
            min_confidence: 0.7,
        }
    }
}

/// Outcome of comparing two activities
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub is_match: bool,

    /// Weighted confidence in [0, 1]
    pub confidence: f64,

    /// Human-readable factor-by-factor explanation
    pub reasons: Vec<String>,
}

/// Weighted activity matcher
#[derive(Debug, Clone, Default)]
pub struct ActivityMatcher {
    thresholds: MatchThresholds,
}

impl ActivityMatcher {
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    /// Compare two activities. Symmetric in its arguments.
    pub fn match_activities(&self, a: &ActivityMetadata, b: &ActivityMetadata) -> MatchResult {
        let mut reasons = Vec::with_capacity(4);

        let (time_match, time_confidence, reason) = self.check_time(a, b);
        reasons.push(reason);

        let (sport_match, sport_confidence, reason) = self.check_sport(a, b);
        reasons.push(reason);

        let (_, distance_confidence, reason) = self.check_distance(a, b);
        reasons.push(reason);

        let (_, duration_confidence, reason) = self.check_duration(a, b);
        reasons.push(reason);

        let confidence = time_confidence * TIME_WEIGHT
            + sport_confidence * SPORT_WEIGHT
            + distance_confidence * DISTANCE_WEIGHT
            + duration_confidence * DURATION_WEIGHT;

        MatchResult {
            is_match: time_match && sport_match && confidence >= self.thresholds.min_confidence,
            confidence,
            reasons,
        }
    }

    /// All matching candidates, best first
    pub fn find_matches(
        &self,
        target: &ActivityMetadata,
        candidates: &[(String, ActivityMetadata)],
    ) -> Vec<(String, MatchResult)> {
        let mut matches: Vec<(String, MatchResult)> = candidates
            .iter()
            .filter_map(|(fingerprint, candidate)| {
                let result = self.match_activities(target, candidate);
                result.is_match.then(|| (fingerprint.clone(), result))
            })
            .collect();

        matches.sort_by(|x, y| {
            y.1.confidence
                .partial_cmp(&x.1.confidence)
                .unwrap_or(Ordering::Equal)
        });
        matches
    }

    /// Highest-confidence matching candidate, if any
    pub fn best_match(
        &self,
        target: &ActivityMetadata,
        candidates: &[(String, ActivityMetadata)],
    ) -> Option<(String, MatchResult)> {
        self.find_matches(target, candidates).into_iter().next()
    }

    fn check_time(&self, a: &ActivityMetadata, b: &ActivityMetadata) -> (bool, f64, String) {
        let diff_seconds = (a.start_time - b.start_time).num_seconds().unsigned_abs() as f64;
        let tolerance_seconds = self.thresholds.time_tolerance_minutes * 60.0;

        if diff_seconds <= tolerance_seconds {
            let confidence = (1.0 - diff_seconds / tolerance_seconds).max(0.0);
            (
                true,
                confidence,
                format!("time match ({:.1} min apart)", diff_seconds / 60.0),
            )
        } else {
            (
                false,
                0.0,
                format!("time mismatch ({:.1} min apart)", diff_seconds / 60.0),
            )
        }
    }

    fn check_sport(&self, a: &ActivityMetadata, b: &ActivityMetadata) -> (bool, f64, String) {
        let sport_a = normalize_sport_type(&a.sport_type);
        let sport_b = normalize_sport_type(&b.sport_type);

        if sport_a == sport_b {
            (true, 1.0, format!("sport match ({})", sport_a))
        } else if are_similar_sports(&sport_a, &sport_b) {
            (true, 0.8, format!("similar sports ({} / {})", sport_a, sport_b))
        } else {
            (
                false,
                0.0,
                format!("sport mismatch ({} vs {})", sport_a, sport_b),
            )
        }
    }

    fn check_distance(&self, a: &ActivityMetadata, b: &ActivityMetadata) -> (bool, f64, String) {
        Self::check_relative(
            a.distance,
            b.distance,
            self.thresholds.distance_tolerance_percent,
            "distance",
        )
    }

    fn check_duration(&self, a: &ActivityMetadata, b: &ActivityMetadata) -> (bool, f64, String) {
        Self::check_relative(
            f64::from(a.duration),
            f64::from(b.duration),
            self.thresholds.duration_tolerance_percent,
            "duration",
        )
    }

    /// Shared shape for distance and duration: zero readings are treated as
    /// "not recorded" rather than disagreement.
    fn check_relative(a: f64, b: f64, tolerance_percent: f64, label: &str) -> (bool, f64, String) {
        if a == 0.0 && b == 0.0 {
            return (true, 1.0, format!("{} match (both zero)", label));
        }
        if a == 0.0 || b == 0.0 {
            return (true, 0.5, format!("{} partial match (one zero)", label));
        }

        let diff_percent = ((a - b).abs() / ((a + b) / 2.0)) * 100.0;

        if diff_percent <= tolerance_percent {
            let confidence = (1.0 - diff_percent / tolerance_percent).max(0.0);
            (
                true,
                confidence,
                format!("{} match ({:.1}% apart)", label, diff_percent),
            )
        } else {
            (
                false,
                0.0,
                format!("{} mismatch ({:.1}% apart)", label, diff_percent),
            )
        }
    }
}
