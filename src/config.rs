use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::matcher::MatchThresholds;
use crate::models::parse_instant;
use crate::rate_limit::{PlatformLimits, RateLimitGovernor};
use crate::window::WindowPolicy;

/// Engine configuration, loaded from a TOML file with full defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Registry database and file cache locations
    pub storage: StorageSettings,

    /// Activity matcher thresholds
    pub matcher: MatchThresholds,

    /// Sync window policy knobs
    pub window: WindowSettings,

    /// Per-platform API quotas; platforms absent here are unlimited
    pub rate_limits: BTreeMap<String, RateLimitSettings>,

    /// Orchestrator behavior
    pub sync: SyncSettings,

    /// Logging setup
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            matcher: MatchThresholds::default(),
            window: WindowSettings::default(),
            rate_limits: default_rate_limits(),
            sync: SyncSettings::default(),
            log: LogConfig::default(),
        }
    }
}

/// On-disk locations for persistent state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite registry database path
    pub database_path: PathBuf,

    /// Root directory for cached activity files
    pub cache_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".actsync");
        Self {
            database_path: base.join("sync_database.db"),
            cache_dir: base.join("activity_cache"),
        }
    }
}

/// Serializable mirror of [`WindowPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub lookback_days: i64,
    pub overlap_hours: i64,
    pub min_window_days: i64,

    /// ISO 8601 instant or date; unset means the built-in 2008 epoch
    pub default_migration_start: Option<String>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        let policy = WindowPolicy::default();
        Self {
            lookback_days: policy.lookback_days,
            overlap_hours: policy.overlap_hours,
            min_window_days: policy.min_window_days,
            default_migration_start: None,
        }
    }
}

impl WindowSettings {
    pub fn to_policy(&self) -> WindowPolicy {
        let mut policy = WindowPolicy {
            lookback_days: self.lookback_days,
            overlap_hours: self.overlap_hours,
            min_window_days: self.min_window_days,
            ..WindowPolicy::default()
        };
        if let Some(start) = self
            .default_migration_start
            .as_deref()
            .and_then(parse_instant)
        {
            policy.default_migration_start = start;
        }
        policy
    }
}

/// API quota for one platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub daily: u32,
    pub quarter_hour: u32,
}

/// Orchestrator behavior knobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Duplicate-probe radius around an activity's start time, in minutes
    pub duplicate_probe_radius_minutes: i64,

    /// Default age threshold for cache cleanup, in days
    pub cache_retention_days: i64,

    /// Activities per direction per run when the caller does not say
    pub default_batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            duplicate_probe_radius_minutes: 60,
            cache_retention_days: 30,
            default_batch_size: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize configuration")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".actsync")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        match Self::load_from_file(Self::default_config_path()) {
            Ok(config) => config,
            Err(_) => Self::default(),
        }
    }

    /// Build a governor from the configured quotas. Keys that do not name a
    /// known platform are ignored.
    pub fn rate_limit_governor(&self) -> RateLimitGovernor {
        let mut governor = RateLimitGovernor::new();
        for (platform, limits) in &self.rate_limits {
            if let Ok(platform) = platform.parse() {
                governor.register(
                    platform,
                    PlatformLimits {
                        daily: limits.daily,
                        quarter_hour: limits.quarter_hour,
                    },
                );
            }
        }
        governor
    }

    pub fn probe_radius(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.sync.duplicate_probe_radius_minutes)
    }
}

/// Stock config carries the published Strava quota with a safety margin
pub fn default_rate_limits() -> BTreeMap<String, RateLimitSettings> {
    let mut limits = BTreeMap::new();
    limits.insert(
        "strava".to_string(),
        RateLimitSettings {
            daily: crate::rate_limit::STRAVA_DAILY_LIMIT,
            quarter_hour: crate::rate_limit::STRAVA_QUARTER_HOUR_LIMIT,
        },
    );
    limits
}
