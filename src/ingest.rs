//! Ingestion pipeline orchestration.
//!
//! Coordinates the full load: dataset scan → per-user label index → per-file
//! parse → match → activity + trackpoint writes. Failures are isolated per
//! file, and store write failures per user: neither aborts the run. The only
//! fatal mid-run condition is a rollback that itself fails, because that
//! leaves an orphaned activity that must be reconciled out-of-band rather
//! than hidden.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::dataset::{scan_dataset, UserEntry};
use crate::db;
use crate::error::SkipReason;
use crate::labels::{parse_labeled_ids, LabelIndex};
use crate::matcher::{match_activity, MatchOutcome};
use crate::progress::{IngestProgressEvent, ProgressMode, ProgressReporter};
use crate::store::{SqliteStore, Store};
use crate::trajectory::parse_plt;

/// Summary of one ingest run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub users: u64,
    pub files_scanned: u64,
    pub activities_committed: u64,
    pub trackpoints_written: u64,
    pub points_dropped: u64,
    /// Per-file terminal rejections with their reasons.
    pub skipped: Vec<(PathBuf, SkipReason)>,
    /// Users whose label file existed but failed to parse. Their files all
    /// ran against an empty index.
    pub label_errors: Vec<(String, String)>,
}

impl IngestReport {
    /// Skip counts grouped by reason kind, in stable order.
    pub fn skip_breakdown(&self) -> BTreeMap<&'static str, u64> {
        let mut counts = BTreeMap::new();
        for (_, reason) in &self.skipped {
            *counts.entry(reason.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// What happened to a single trajectory file.
enum FileOutcome {
    Committed { points: u64, dropped: u64 },
    Skipped(SkipReason),
}

/// Run the pipeline over pre-scanned user entries. `dry_run` performs the
/// full parse and match but writes nothing. `limit` caps the number of
/// trajectory files processed across the whole run.
pub async fn ingest_dataset(
    store: &dyn Store,
    users: &[UserEntry],
    progress: &dyn ProgressReporter,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    let total_files: u64 = users.iter().map(|u| u.trajectories.len() as u64).sum();
    let mut processed: u64 = 0;

    'users: for user in users {
        report.users += 1;

        if !dry_run {
            if let Err(err) = store.upsert_user(&user.id, user.labels_file.is_some()).await {
                // A store write failure is scoped to this user: every one of
                // their files is recorded as skipped and the run moves on.
                let detail = format!("user upsert failed: {:#}", err);
                for path in &user.trajectories {
                    report.files_scanned += 1;
                    report
                        .skipped
                        .push((path.clone(), SkipReason::Persistence(detail.clone())));
                }
                continue;
            }
        }

        // Labels load once per user. A present-but-unparseable label file is
        // surfaced, then the user runs against an empty index, so every one
        // of their files is rejected instead of mislabeled.
        let labels = match &user.labels_file {
            Some(path) => match LabelIndex::parse(path) {
                Ok(index) => index,
                Err(err) => {
                    report.label_errors.push((user.id.clone(), format!("{:#}", err)));
                    LabelIndex::empty()
                }
            },
            None => LabelIndex::empty(),
        };

        for path in &user.trajectories {
            if let Some(lim) = limit {
                if processed as usize >= lim {
                    break 'users;
                }
            }
            processed += 1;
            report.files_scanned += 1;
            progress.report(IngestProgressEvent::Ingesting {
                user: user.id.clone(),
                n: processed,
                total: total_files,
            });

            match process_file(store, &user.id, path, &labels, dry_run).await? {
                FileOutcome::Committed { points, dropped } => {
                    report.activities_committed += 1;
                    report.trackpoints_written += points;
                    report.points_dropped += dropped;
                }
                FileOutcome::Skipped(reason) => {
                    report.skipped.push((path.clone(), reason));
                }
            }
        }
    }

    Ok(report)
}

/// Parse, match, and commit one trajectory file. The returned error is fatal
/// for the run and is raised only when a rollback fails, leaving an orphan.
async fn process_file(
    store: &dyn Store,
    user_id: &str,
    path: &Path,
    labels: &LabelIndex,
    dry_run: bool,
) -> Result<FileOutcome> {
    let trajectory = match parse_plt(path) {
        Ok(t) => t,
        Err(reason) => return Ok(FileOutcome::Skipped(reason)),
    };

    let span = match match_activity(&trajectory, labels) {
        MatchOutcome::Accepted(span) => span,
        MatchOutcome::Rejected(reason) => return Ok(FileOutcome::Skipped(reason)),
    };

    let points = trajectory.points.len() as u64;
    let dropped = trajectory.dropped_lines() as u64;

    if dry_run {
        return Ok(FileOutcome::Committed { points, dropped });
    }

    let activity_id = match store
        .insert_activity(user_id, Some(&span.mode), span.start, span.end)
        .await
    {
        Ok(id) => id,
        Err(err) => {
            return Ok(FileOutcome::Skipped(SkipReason::Persistence(format!(
                "activity insert failed: {:#}",
                err
            ))));
        }
    };

    if let Err(write_err) = store.insert_trackpoints(activity_id, &trajectory.points).await {
        // The activity row is already visible; it must not survive with zero
        // or partial trackpoints.
        if let Err(rollback_err) = store.delete_activity(activity_id).await {
            return Err(anyhow!(
                "orphaned activity {} for {}: trackpoint write failed ({:#}) and rollback failed ({:#})",
                activity_id,
                path.display(),
                write_err,
                rollback_err
            ));
        }
        return Ok(FileOutcome::Skipped(SkipReason::Persistence(format!(
            "trackpoint write failed, activity rolled back: {:#}",
            write_err
        ))));
    }

    Ok(FileOutcome::Committed { points, dropped })
}

/// CLI entry point for `geolife ingest`.
pub async fn run_ingest(
    config: &Config,
    root: Option<PathBuf>,
    dry_run: bool,
    limit: Option<usize>,
    progress_mode: ProgressMode,
) -> Result<()> {
    let root = root.unwrap_or_else(|| config.dataset.root.clone());
    let reporter = progress_mode.reporter();

    reporter.report(IngestProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let users = scan_dataset(&root)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.ingest.batch_size);

    let report = ingest_dataset(&store, &users, reporter.as_ref(), dry_run, limit).await?;

    if dry_run {
        println!("ingest {} (dry-run)", root.display());
    } else {
        println!("ingest {}", root.display());
    }
    println!("  users: {}", report.users);
    println!("  files scanned: {}", report.files_scanned);
    if dry_run {
        println!("  activities matched: {}", report.activities_committed);
        println!("  trackpoints parsed: {}", report.trackpoints_written);
    } else {
        println!("  activities committed: {}", report.activities_committed);
        println!("  trackpoints written: {}", report.trackpoints_written);
    }
    if report.points_dropped > 0 {
        println!("  malformed points dropped: {}", report.points_dropped);
    }
    println!("  files skipped: {}", report.skipped.len());
    for (kind, count) in report.skip_breakdown() {
        println!("    {}: {}", kind, count);
    }
    if !report.label_errors.is_empty() {
        println!("  label files failed: {}", report.label_errors.len());
        for (user, err) in &report.label_errors {
            println!("    {}: {}", user, err);
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// CLI entry point for `geolife mark-labeled`.
pub async fn run_mark_labeled(config: &Config, manifest: Option<PathBuf>) -> Result<()> {
    let manifest = manifest
        .or_else(|| config.dataset.labeled_ids.clone())
        .ok_or_else(|| {
            anyhow!("no manifest given and dataset.labeled_ids is not set in the config")
        })?;

    let ids = parse_labeled_ids(&manifest)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.ingest.batch_size);
    let changed = store.mark_labeled(&ids).await?;

    println!("mark-labeled {}", manifest.display());
    println!("  manifest ids: {}", ids.len());
    println!("  users updated: {}", changed);
    println!("ok");

    pool.close().await;
    Ok(())
}
