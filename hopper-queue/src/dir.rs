//! Queue directory primitives.
//!
//! Everything the queue engine does to the filesystem goes through this
//! module: creating state directories, counting and listing the regular
//! files inside them, finding the lexicographically first entry, and the
//! atomic rename that transfers message ownership between states.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tokio::fs;

use crate::error::Result;

/// Ensure `path` exists as a directory, creating parents as needed.
/// Idempotent.
///
/// # Errors
/// Surfaces any filesystem error other than the directory already existing.
pub async fn setup(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

/// Number of regular files directly inside `dir`.
///
/// # Errors
/// Fails if the directory cannot be read.
pub async fn file_count(dir: &Path) -> Result<usize> {
    let mut entries = fs::read_dir(dir).await?;
    let mut count = 0;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            count += 1;
        }
    }

    Ok(count)
}

/// The regular file in `dir` with the lexicographically lowest filename,
/// or `None` when the directory holds no files.
///
/// Message filenames begin with the push timestamp, so this approximates
/// oldest-first without promising anything about same-millisecond ties.
///
/// # Errors
/// Fails if the directory cannot be read.
pub async fn first_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut lowest: Option<(OsString, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if lowest.as_ref().is_none_or(|(current, _)| name < *current) {
            lowest = Some((name, entry.path()));
        }
    }

    Ok(lowest.map(|(_, path)| path))
}

/// Snapshot of all regular files directly inside `dir`, sorted by filename.
///
/// # Errors
/// Fails if the directory cannot be read.
pub async fn all_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();

    Ok(files)
}

/// Atomically rename `src` into `dest_dir`, optionally under a new filename.
///
/// Both paths must live on the same filesystem; rename atomicity is the
/// only concurrency primitive the queue relies on. Returns the new path.
///
/// # Errors
/// Surfaces the rename failure, including losing a race to another caller.
pub async fn move_file(src: &Path, dest_dir: &Path, new_name: Option<&str>) -> Result<PathBuf> {
    let name = match new_name {
        Some(name) => OsString::from(name),
        None => src
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| crate::QueueError::BadName(src.display().to_string()))?,
    };
    let dest = dest_dir.join(name);

    fs::rename(src, &dest).await?;

    Ok(dest)
}
