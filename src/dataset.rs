//! Dataset directory traversal.
//!
//! The Geolife layout is fixed: `root/<user id>/Trajectory/*.plt` plus an
//! optional `root/<user id>/labels.txt`. Each immediate child directory of
//! the root is presumed to be a user code. Ordering is made deterministic so
//! repeated runs visit users and files identically.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Everything the pipeline needs to know about one user directory.
#[derive(Debug, Clone)]
pub struct UserEntry {
    /// Directory name, used verbatim as the user id (e.g. `010`).
    pub id: String,
    /// Present iff a `labels.txt` exists for this user.
    pub labels_file: Option<PathBuf>,
    /// All `.plt` files under `Trajectory/`, sorted by path.
    pub trajectories: Vec<PathBuf>,
}

/// Scan the dataset root into per-user entries. A missing or unreadable root
/// is fatal for the run; an individual user directory without a `Trajectory/`
/// folder simply contributes zero files.
pub fn scan_dataset(root: &Path) -> Result<Vec<UserEntry>> {
    if !root.is_dir() {
        bail!("dataset root does not exist: {}", root.display());
    }

    let plt_set = build_globset(&["**/*.plt".to_string()])?;

    let mut users = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().to_string();
        let user_dir = entry.path();

        let labels_file = {
            let path = user_dir.join("labels.txt");
            path.is_file().then_some(path)
        };

        let trajectories = scan_trajectories(&user_dir.join("Trajectory"), &plt_set)?;

        users.push(UserEntry {
            id,
            labels_file,
            trajectories,
        });
    }

    users.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(users)
}

fn scan_trajectories(dir: &Path, plt_set: &GlobSet) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if plt_set.is_match(relative.to_string_lossy().as_ref()) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
