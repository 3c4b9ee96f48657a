use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use actsync::adapter::AdapterRegistry;
use actsync::config::EngineConfig;
use actsync::logging::{init_logging, LogLevel};
use actsync::models::{parse_instant, Direction, Platform, SyncMode};
use actsync::orchestrator::{DirectionResult, SyncEngine};
use actsync::rate_limit::RateLimitStatus;

/// actsync - fitness activity synchronization engine
///
/// Moves recorded workout files between fitness platforms, deduplicating
/// across platforms by activity fingerprint and resuming historical
/// migrations where they left off.
#[derive(Parser)]
#[command(name = "actsync")]
#[command(version = "0.1.0")]
#[command(about = "Fitness activity synchronization engine", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass over the given directions
    Sync {
        /// Directions like strava_to_garmin; defaults to all enabled rules
        #[arg(value_name = "DIRECTION")]
        directions: Vec<String>,

        /// Activities per direction in this pass
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Sync mode (incremental, migration)
        #[arg(short, long, default_value = "incremental")]
        mode: String,
    },

    /// Show registry statistics and rate-limit state
    Status {
        /// Emit the full status blob as JSON
        #[arg(long)]
        json: bool,
    },

    /// Enable or disable a sync direction rule
    Rule {
        /// Source platform
        source: String,

        /// Target platform
        target: String,

        /// Disable instead of enable
        #[arg(long)]
        disable: bool,
    },

    /// Set where a direction's historical migration starts
    MigrationStart {
        /// Direction like strava_to_onedrive
        direction: String,

        /// ISO 8601 instant or date, e.g. 2015-01-01
        start: String,
    },

    /// Delete cached activity files older than the given age
    Cleanup {
        /// Age threshold in days
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Drop a platform adapter's persisted session
    ClearSession {
        /// Platform whose session to clear
        platform: String,
    },

    /// Import state from the legacy JSON database
    ImportLegacy {
        /// Path to the legacy JSON file
        file: PathBuf,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_or_default(),
    };

    if cli.quiet {
        config.log.level = LogLevel::Error;
    } else if cli.verbose >= 2 {
        config.log.level = LogLevel::Trace;
    } else if cli.verbose == 1 {
        config.log.level = LogLevel::Debug;
    }
    let _log_guard = init_logging(&config.log)?;

    // Platform adapters are deployment-specific and register here; the stock
    // binary manages local state and reports missing adapters on sync.
    let adapters = AdapterRegistry::new();
    let mut engine = SyncEngine::new(&config, adapters)?;

    match cli.command {
        Commands::Sync {
            directions,
            batch_size,
            mode,
        } => {
            let mode: SyncMode = mode
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let parsed: Vec<Direction> = directions
                .iter()
                .map(|d| d.parse::<Direction>().map_err(|e| anyhow!(e)))
                .collect::<Result<_>>()?;
            let batch_size = batch_size.unwrap_or(config.sync.default_batch_size);

            let results = engine.run_sync(
                if parsed.is_empty() { None } else { Some(&parsed) },
                batch_size,
                mode,
            )?;
            display_sync_results(&results);
        }

        Commands::Status { json } => {
            let status = engine.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                display_status(&status);
            }
        }

        Commands::Rule {
            source,
            target,
            disable,
        } => {
            let source: Platform = source.parse().map_err(|e: String| anyhow!(e))?;
            let target: Platform = target.parse().map_err(|e: String| anyhow!(e))?;
            engine.set_rule(source, target, !disable)?;
            println!(
                "rule {}_to_{} {}",
                source,
                target,
                if disable { "disabled".yellow() } else { "enabled".green() }
            );
        }

        Commands::MigrationStart { direction, start } => {
            let direction: Direction = direction.parse().map_err(|e: String| anyhow!(e))?;
            let start = parse_instant(&start)
                .ok_or_else(|| anyhow!("unparsable start time: {}", start))?;
            engine.set_migration_start(&direction, start)?;
            println!("migration for {} will start at {}", direction, start);
        }

        Commands::Cleanup { days } => {
            let days = days.unwrap_or(config.sync.cache_retention_days);
            let removed = engine.cleanup_cache(days)?;
            println!("removed {} cache entries older than {} days", removed, days);
        }

        Commands::ClearSession { platform } => {
            let platform: Platform = platform.parse().map_err(|e: String| anyhow!(e))?;
            engine.clear_adapter_session(platform)?;
            println!("cleared session for {}", platform);
        }

        Commands::ImportLegacy { file } => {
            let imported = engine
                .import_legacy_json(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("imported {} legacy sync records", imported);
        }
    }

    Ok(())
}

fn display_sync_results(results: &std::collections::BTreeMap<String, DirectionResult>) {
    println!("\n{}", "Sync results".bold());
    println!("{}", "=".repeat(50));

    let mut totals = DirectionResult::default();
    for (direction, result) in results {
        let label = direction.replace("_to_", " -> ").to_uppercase();
        println!("\n{}", label.bold());
        println!("  success: {}", result.success.to_string().green());
        println!("  failed:  {}", result.failed.to_string().red());
        println!("  skipped: {}", result.skipped.to_string().yellow());
        if let Some(err) = &result.error {
            println!("  error:   {}", err.red());
        }

        totals.success += result.success;
        totals.failed += result.failed;
        totals.skipped += result.skipped;
        totals.processed += result.processed;
    }

    println!("\n{}", "-".repeat(50));
    println!(
        "processed {} activities: {} synced, {} failed, {} skipped",
        totals.processed, totals.success, totals.failed, totals.skipped
    );
    if totals.processed > 0 {
        let rate = f64::from(totals.success) / f64::from(totals.processed) * 100.0;
        println!("success rate: {:.1}%", rate);
    }
}

#[derive(Tabled)]
struct PlatformRow {
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Activities")]
    activities: i64,
}

#[derive(Tabled)]
struct DirectionRow {
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Count")]
    count: i64,
}

fn display_status(status: &actsync::orchestrator::EngineStatus) {
    println!("\n{}", "Sync status".bold());
    println!("{}", "=".repeat(50));
    println!(
        "total activity records: {}",
        status.statistics.total_activities
    );

    if !status.statistics.platform_counts.is_empty() {
        let rows: Vec<PlatformRow> = status
            .statistics
            .platform_counts
            .iter()
            .map(|(platform, count)| PlatformRow {
                platform: platform.to_uppercase(),
                activities: *count,
            })
            .collect();
        println!("\n{}", Table::new(rows));
    }

    if !status.statistics.sync_status.is_empty() {
        let rows: Vec<DirectionRow> = status
            .statistics
            .sync_status
            .iter()
            .flat_map(|(direction, histogram)| {
                histogram.iter().map(move |(state, count)| DirectionRow {
                    direction: direction.replace("_to_", " -> "),
                    status: state.clone(),
                    count: *count,
                })
            })
            .collect();
        println!("\n{}", Table::new(rows));
    }

    if status.statistics.last_sync.is_empty() {
        println!("\nlast sync: never");
    } else {
        println!("\nlast sync:");
        for (platform, at) in &status.statistics.last_sync {
            println!("  {}: {}", platform.to_uppercase(), at);
        }
    }

    let quota_lines: Vec<String> = status
        .api_limits
        .iter()
        .filter_map(|(platform, limit)| match limit {
            RateLimitStatus::Unlimited { .. } => None,
            RateLimitStatus::Limited {
                daily_remaining,
                quarter_hour_remaining,
                ..
            } => Some(format!(
                "  {}: {} calls left today, {} this quarter hour",
                platform.to_uppercase(),
                daily_remaining,
                quarter_hour_remaining
            )),
        })
        .collect();
    if !quota_lines.is_empty() {
        println!("\napi limits:");
        for line in quota_lines {
            println!("{}", line);
        }
    }

    println!("\ncache: {} entries under {}", status.statistics.cache_files, status.cache_dir);
    println!("database: {}", status.statistics.database_path);
}
