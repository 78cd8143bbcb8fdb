//! Work-directory inspection helpers.
//!
//! Downloaders deposit files into long-lived work directories; these
//! helpers find the artifacts later stages care about and snapshot
//! directory state for download delta validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Snapshot of a directory: filename to modification time. Unreadable
/// entries are skipped; a missing directory yields an empty snapshot.
/// `*.log` files are excluded — the pipeline's own entity log lives in the
/// work directory and would otherwise register as a download change.
#[must_use]
pub fn directory_state(work_dir: &Path) -> BTreeMap<String, SystemTime> {
    let mut state = BTreeMap::new();
    let Ok(entries) = std::fs::read_dir(work_dir) else {
        return state;
    };

    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_lowercase().ends_with(".log") {
            continue;
        }
        if let Ok(modified) = metadata.modified() {
            state.insert(name, modified);
        }
    }

    state
}

/// Filenames that are new or modified between two snapshots.
#[must_use]
pub fn changed_files(
    before: &BTreeMap<String, SystemTime>,
    after: &BTreeMap<String, SystemTime>,
) -> Vec<String> {
    after
        .iter()
        .filter(|(name, mtime)| before.get(*name) != Some(mtime))
        .map(|(name, _)| name.clone())
        .collect()
}

/// The most recently modified `*.shp` in the directory, if any.
#[must_use]
pub fn find_newest_shapefile(work_dir: &Path) -> Option<PathBuf> {
    newest_with_extension(work_dir, "shp")
}

/// The basename of the most recently modified `*.zip`, if any.
#[must_use]
pub fn find_newest_zip(work_dir: &Path) -> Option<String> {
    newest_with_extension(work_dir, "zip")
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
}

/// The largest regular file in the directory, if any.
#[must_use]
pub fn find_largest_file(work_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(work_dir).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            metadata.is_file().then(|| (metadata.len(), entry.path()))
        })
        .max_by_key(|(size, _)| *size)
        .map(|(_, path)| path)
}

fn newest_with_extension(work_dir: &Path, extension: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(work_dir).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let matches = path
                .extension()
                .is_some_and(|e| e.to_string_lossy().to_lowercase() == extension);
            if !matches {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}
