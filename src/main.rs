//! # Geolife CLI (`geolife`)
//!
//! The `geolife` binary is the primary interface for the loader. It provides
//! commands for database initialization, dataset ingestion, the bulk
//! label-flag pass, database stats, and analytical reports.
//!
//! ## Usage
//!
//! ```bash
//! geolife --config ./config/geolife.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `geolife init` | Create the SQLite database and run schema migrations |
//! | `geolife ingest [ROOT]` | Parse, match, and load trajectory files |
//! | `geolife mark-labeled [MANIFEST]` | Bulk `has_label` update from a flat id manifest |
//! | `geolife stats` | Database overview |
//! | `geolife query <report>` | Analytical reports over the loaded data |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! geolife init --config ./config/geolife.toml
//!
//! # Load the dataset configured under [dataset]
//! geolife ingest
//!
//! # See what a run would commit without writing anything
//! geolife ingest --dry-run
//!
//! # Rankings and aggregates
//! geolife query top-users --limit 20
//! geolife query distance --user 112 --year 2008 --mode walk
//! geolife query nearby --lat 39.916 --lon 116.397
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use geolife_ingest::progress::ProgressMode;
use geolife_ingest::{config, ingest, migrate, report, stats};

/// Geolife loader CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/geolife.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "geolife",
    about = "Geolife trajectory loader — ingest GPS trajectories into SQLite and query them",
    version,
    long_about = "Ingests the Geolife GPS trajectory dataset into a three-table SQLite schema \
    (users, activities, trackpoints), matching trajectory files to transportation-mode labels \
    by exact start/end timestamp equality, and answers analytical queries over the result."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/geolife.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the users, activities, and
    /// trackpoints tables with their indexes. Idempotent.
    Init,

    /// Ingest trajectory files from the dataset root.
    ///
    /// Walks user directories, parses each `.plt` file, matches it against
    /// the user's labels, and commits accepted activities with their
    /// trackpoints. Skipped files are reported with reasons; a single bad
    /// file never aborts the run.
    Ingest {
        /// Dataset root. Defaults to `dataset.root` from the config.
        root: Option<PathBuf>,

        /// Parse and match without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of trajectory files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Mark users from a manifest as labeled.
    ///
    /// Reads a flat file of user ids (one per line) and sets `has_label` for
    /// each. Runs after initial user population.
    MarkLabeled {
        /// Manifest path. Defaults to `dataset.labeled_ids` from the config.
        manifest: Option<PathBuf>,
    },

    /// Show database statistics.
    ///
    /// Prints table totals, database size, and a per-user breakdown.
    Stats,

    /// Run an analytical report.
    Query {
        #[command(subcommand)]
        report: ReportCommand,
    },
}

/// Analytical reports (read-only).
#[derive(Subcommand)]
enum ReportCommand {
    /// Row counts for users, activities, and trackpoints.
    Summary,

    /// Average number of activities per user.
    AvgActivities,

    /// Users ranked by activity count.
    TopUsers {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Distinct users that used a transportation mode.
    ModeUsers {
        #[arg(long, default_value = "taxi")]
        mode: String,
    },

    /// Activity counts per transportation mode.
    Modes,

    /// Year with the most activities and most recorded hours.
    BusiestYear,

    /// Total haversine distance for one user, year, and mode.
    Distance {
        #[arg(long, default_value = "112")]
        user: String,
        #[arg(long, default_value_t = 2008)]
        year: i32,
        #[arg(long, default_value = "walk")]
        mode: String,
    },

    /// Users ranked by total altitude gained (sentinel altitudes excluded).
    AltitudeGain {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Users with activities containing a >5 minute sampling gap.
    Gaps,

    /// Distinct users with a trackpoint near a coordinate.
    Nearby {
        #[arg(long, default_value_t = 39.916)]
        lat: f64,
        #[arg(long, default_value_t = 116.397)]
        lon: f64,
        /// Containment box half-width in degrees.
        #[arg(long, default_value_t = 0.005)]
        tolerance: f64,
    },

    /// Each user's most used transportation mode.
    FavoriteMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            root,
            dry_run,
            limit,
            progress,
        } => {
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(s) => match ProgressMode::parse(s) {
                    Some(mode) => mode,
                    None => bail!("Unknown progress mode: '{}'. Use off, human, or json.", s),
                },
            };
            ingest::run_ingest(&cfg, root, dry_run, limit, mode).await?;
        }
        Commands::MarkLabeled { manifest } => {
            ingest::run_mark_labeled(&cfg, manifest).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Query { report } => match report {
            ReportCommand::Summary => report::run_summary(&cfg).await?,
            ReportCommand::AvgActivities => report::run_avg_activities(&cfg).await?,
            ReportCommand::TopUsers { limit } => report::run_top_users(&cfg, limit).await?,
            ReportCommand::ModeUsers { mode } => report::run_mode_users(&cfg, &mode).await?,
            ReportCommand::Modes => report::run_modes(&cfg).await?,
            ReportCommand::BusiestYear => report::run_busiest_year(&cfg).await?,
            ReportCommand::Distance { user, year, mode } => {
                report::run_distance(&cfg, &user, year, &mode).await?
            }
            ReportCommand::AltitudeGain { limit } => {
                report::run_altitude_gain(&cfg, limit).await?
            }
            ReportCommand::Gaps => report::run_gaps(&cfg).await?,
            ReportCommand::Nearby {
                lat,
                lon,
                tolerance,
            } => report::run_nearby(&cfg, lat, lon, tolerance).await?,
            ReportCommand::FavoriteMode => report::run_favorite_modes(&cfg).await?,
        },
    }

    Ok(())
}
