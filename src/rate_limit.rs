//! Per-platform API rate-limit accounting
//!
//! Platforms with published quotas (Strava) get a daily counter and a
//! rolling quarter-hour counter that gate outbound list/download calls. The
//! orchestrator asks [`RateLimitGovernor::can_request`] before a batch and
//! between activities, and attributes calls with [`RateLimitGovernor::record`].
//! Hitting a limit is not an error; the batch just ends early.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Platform;

/// Strava publishes 200 requests per day; stay under it with a margin.
pub const STRAVA_DAILY_LIMIT: u32 = 180;

/// Strava publishes 100 requests per 15 minutes; stay under it with a margin.
pub const STRAVA_QUARTER_HOUR_LIMIT: u32 = 90;

const DAILY_WINDOW_SECONDS: i64 = 86_400;
const QUARTER_HOUR_WINDOW_SECONDS: i64 = 900;

/// Configured ceilings for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimits {
    pub daily: u32,
    pub quarter_hour: u32,
}

impl PlatformLimits {
    pub fn strava() -> Self {
        Self {
            daily: STRAVA_DAILY_LIMIT,
            quarter_hour: STRAVA_QUARTER_HOUR_LIMIT,
        }
    }
}

/// Serializable counter state, used for optional persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub platform: Platform,
    pub daily_calls: u32,
    pub quarter_hour_calls: u32,
    pub daily_limit: u32,
    pub quarter_hour_limit: u32,
    pub daily_reset_at: DateTime<Utc>,
    pub quarter_reset_at: DateTime<Utc>,
}

/// Point-in-time view for status displays
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RateLimitStatus {
    Unlimited {
        unlimited: bool,
    },
    Limited {
        daily_remaining: u32,
        quarter_hour_remaining: u32,
        can_request: bool,
    },
}

#[derive(Debug, Clone)]
struct CounterState {
    daily_calls: u32,
    quarter_hour_calls: u32,
    daily_reset_at: DateTime<Utc>,
    quarter_reset_at: DateTime<Utc>,
    limits: PlatformLimits,
}

impl CounterState {
    fn new(limits: PlatformLimits, now: DateTime<Utc>) -> Self {
        Self {
            daily_calls: 0,
            quarter_hour_calls: 0,
            daily_reset_at: now,
            quarter_reset_at: now,
            limits,
        }
    }

    /// Each counter resets when its own window has fully elapsed.
    fn roll_windows(&mut self, now: DateTime<Utc>) {
        if now - self.daily_reset_at >= Duration::seconds(DAILY_WINDOW_SECONDS) {
            self.daily_calls = 0;
            self.daily_reset_at = now;
        }
        if now - self.quarter_reset_at >= Duration::seconds(QUARTER_HOUR_WINDOW_SECONDS) {
            self.quarter_hour_calls = 0;
            self.quarter_reset_at = now;
        }
    }

    fn has_headroom(&self) -> bool {
        self.daily_calls < self.limits.daily && self.quarter_hour_calls < self.limits.quarter_hour
    }
}

/// Tracks API usage per platform; platforms never registered are unlimited
#[derive(Debug, Default)]
pub struct RateLimitGovernor {
    states: HashMap<Platform, CounterState>,
}

impl RateLimitGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Governor with the stock Strava quota registered
    pub fn with_defaults() -> Self {
        let mut governor = Self::new();
        governor.register(Platform::Strava, PlatformLimits::strava());
        governor
    }

    pub fn register(&mut self, platform: Platform, limits: PlatformLimits) {
        self.register_at(platform, limits, Utc::now());
    }

    pub fn register_at(&mut self, platform: Platform, limits: PlatformLimits, now: DateTime<Utc>) {
        self.states.insert(platform, CounterState::new(limits, now));
    }

    /// Apply (possibly changed) configured limits without touching counters;
    /// registers the platform fresh when it has no state yet
    pub fn set_limits(&mut self, platform: Platform, limits: PlatformLimits) {
        match self.states.get_mut(&platform) {
            Some(state) => state.limits = limits,
            None => self.register(platform, limits),
        }
    }

    /// Whether another attributed call to `platform` is currently allowed
    pub fn can_request(&mut self, platform: Platform) -> bool {
        self.can_request_at(platform, Utc::now())
    }

    pub fn can_request_at(&mut self, platform: Platform, now: DateTime<Utc>) -> bool {
        match self.states.get_mut(&platform) {
            Some(state) => {
                state.roll_windows(now);
                state.has_headroom()
            }
            None => true,
        }
    }

    /// Attribute one outbound call; no-op for unregistered platforms
    pub fn record(&mut self, platform: Platform) {
        self.record_at(platform, Utc::now());
    }

    pub fn record_at(&mut self, platform: Platform, now: DateTime<Utc>) {
        if let Some(state) = self.states.get_mut(&platform) {
            state.roll_windows(now);
            state.daily_calls += 1;
            state.quarter_hour_calls += 1;
        }
    }

    pub fn status(&self, platform: Platform) -> RateLimitStatus {
        self.status_at(platform, Utc::now())
    }

    pub fn status_at(&self, platform: Platform, now: DateTime<Utc>) -> RateLimitStatus {
        match self.states.get(&platform) {
            None => RateLimitStatus::Unlimited { unlimited: true },
            Some(state) => {
                // Read-only view: apply window rolls virtually.
                let mut effective = state.clone();
                effective.roll_windows(now);
                RateLimitStatus::Limited {
                    daily_remaining: effective.limits.daily.saturating_sub(effective.daily_calls),
                    quarter_hour_remaining: effective
                        .limits
                        .quarter_hour
                        .saturating_sub(effective.quarter_hour_calls),
                    can_request: effective.has_headroom(),
                }
            }
        }
    }

    /// Platforms currently under management
    pub fn platforms(&self) -> Vec<Platform> {
        self.states.keys().copied().collect()
    }

    pub fn snapshot(&self) -> Vec<RateLimitSnapshot> {
        self.states
            .iter()
            .map(|(platform, state)| RateLimitSnapshot {
                platform: *platform,
                daily_calls: state.daily_calls,
                quarter_hour_calls: state.quarter_hour_calls,
                daily_limit: state.limits.daily,
                quarter_hour_limit: state.limits.quarter_hour,
                daily_reset_at: state.daily_reset_at,
                quarter_reset_at: state.quarter_reset_at,
            })
            .collect()
    }

    pub fn restore(&mut self, snapshots: &[RateLimitSnapshot]) {
        for snap in snapshots {
            self.states.insert(
                snap.platform,
                CounterState {
                    daily_calls: snap.daily_calls,
                    quarter_hour_calls: snap.quarter_hour_calls,
                    daily_reset_at: snap.daily_reset_at,
                    quarter_reset_at: snap.quarter_reset_at,
                    limits: PlatformLimits {
                        daily: snap.daily_limit,
                        quarter_hour: snap.quarter_hour_limit,
                    },
                },
            );
        }
    }
}
