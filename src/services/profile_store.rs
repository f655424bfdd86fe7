//! Named snapshots of a client's auth state.
//!
//! Layout under the snapshot root of one platform:
//!
//! ```text
//! <root>/<name>/metadata.json   {"name": "<name>"}
//! <root>/<name>/data            copy of the auth directory (or file)
//! <root>/.staging/<name>         save in progress, renamed into place when complete
//! ```
//!
//! Restoring is not transactional. If the copy back fails halfway the live state is left
//! partially populated and nothing is rolled back.

use super::process::{ProcessCoordinator, ProcessError, ProcessTarget, StopOutcome};
use crate::models::Platform;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use thiserror::Error;
use walkdir::WalkDir;

const METADATA_FILE: &str = "metadata.json";
const DATA_ENTRY: &str = "data";
/// Scratch area under the snapshot root for saves in progress. Never a snapshot itself.
const STAGING_DIR: &str = ".staging";

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Nothing to save: {0} does not exist. Log in to the client first.")]
    SourceNotFound(Utf8PathBuf),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Invalid snapshot name: {0:?}")]
    InvalidName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

fn io_err(path: &Utf8Path) -> impl FnOnce(io::Error) -> ProfileError + '_ {
    move |source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Where a client keeps its logged-in session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// A whole directory (Epic).
    Directory(Utf8PathBuf),
    /// A single file (Riot's private settings, Legendary's `user.json`).
    File(Utf8PathBuf),
}

impl AuthState {
    pub fn path(&self) -> &Utf8Path {
        match self {
            AuthState::Directory(p) | AuthState::File(p) => p,
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            AuthState::Directory(p) => p.is_dir(),
            AuthState::File(p) => p.is_file(),
        }
    }

    fn remove(&self) -> Result<(), ProfileError> {
        let path = self.path();
        let result = match self {
            AuthState::Directory(p) => fs::remove_dir_all(p),
            AuthState::File(p) => fs::remove_file(p),
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_err(path)(e)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub name: String,
}

/// A saved identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub platform: Platform,
    pub name: String,
    pub stored_path: Utf8PathBuf,
    pub metadata: SnapshotMetadata,
}

/// Save, list and restore snapshots for one platform.
#[derive(Clone)]
pub struct ProfileStore {
    platform: Platform,
    auth_state: AuthState,
    snapshot_root: Utf8PathBuf,
    process_target: Option<ProcessTarget>,
    coordinator: ProcessCoordinator,
}

impl ProfileStore {
    pub fn new(
        platform: Platform,
        auth_state: AuthState,
        snapshot_root: impl Into<Utf8PathBuf>,
        process_target: Option<ProcessTarget>,
        coordinator: ProcessCoordinator,
    ) -> Self {
        Self {
            platform,
            auth_state,
            snapshot_root: snapshot_root.into(),
            process_target,
            coordinator,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Processes stopped before a restore, if the client has any.
    pub fn process_target(&self) -> Option<&ProcessTarget> {
        self.process_target
            .as_ref()
            .filter(|t| !t.process_names.is_empty())
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    pub fn snapshot_root(&self) -> &Utf8Path {
        &self.snapshot_root
    }

    /// Copy the live auth state into `<root>/<name>`, replacing any snapshot of that name.
    pub fn save_snapshot(&self, name: &str) -> Result<Snapshot, ProfileError> {
        validate_name(name)?;

        if !self.auth_state.exists() {
            return Err(ProfileError::SourceNotFound(
                self.auth_state.path().to_path_buf(),
            ));
        }

        // Build the new copy next to the old one; the old snapshot survives a failed copy.
        let staging = self.snapshot_root.join(STAGING_DIR).join(name);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(io_err(&staging))?;
        }
        fs::create_dir_all(&staging).map_err(io_err(&staging))?;

        let metadata = SnapshotMetadata {
            name: name.to_string(),
        };
        if let Err(e) = write_snapshot(&self.auth_state, &staging, &metadata) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let dir = self.snapshot_root.join(name);
        replace_dir(&staging, &dir)?;
        let stored = dir.join(DATA_ENTRY);

        tracing::info!("Saved {} snapshot \"{}\" to {}", self.platform, name, dir);

        Ok(Snapshot {
            platform: self.platform,
            name: name.to_string(),
            stored_path: stored,
            metadata,
        })
    }

    /// Every snapshot with a readable `metadata.json`, sorted by name.
    pub fn list_snapshots(&self) -> Vec<Snapshot> {
        let Ok(entries) = fs::read_dir(&self.snapshot_root) else {
            return Vec::new();
        };

        let mut snapshots: Vec<Snapshot> = entries
            .flatten()
            .filter_map(|entry| {
                let path = Utf8PathBuf::from_path_buf(entry.path()).ok()?;
                if !path.is_dir() {
                    return None;
                }
                self.read_snapshot(&path)
            })
            .collect();

        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Look up a single snapshot by name.
    pub fn snapshot(&self, name: &str) -> Option<Snapshot> {
        validate_name(name).ok()?;
        self.read_snapshot(&self.snapshot_root.join(name))
    }

    fn read_snapshot(&self, dir: &Utf8Path) -> Option<Snapshot> {
        let metadata_path = dir.join(METADATA_FILE);
        let text = fs::read_to_string(&metadata_path).ok()?;
        let metadata: SnapshotMetadata = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Skipping malformed snapshot {}: {}", metadata_path, e);
                return None;
            }
        };

        Some(Snapshot {
            platform: self.platform,
            name: dir.file_name().unwrap_or(metadata.name.as_str()).to_string(),
            stored_path: dir.join(DATA_ENTRY),
            metadata,
        })
    }

    /// Make `name` the live auth state.
    ///
    /// Stops the client first (if it has processes), deletes the live state, then copies
    /// the snapshot back. Returns how the stop went so callers can warn on a timeout.
    pub async fn restore_snapshot(&self, name: &str) -> Result<Option<StopOutcome>, ProfileError> {
        let snapshot = self
            .snapshot(name)
            .filter(|s| s.stored_path.exists())
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;

        let stop = match self.process_target() {
            Some(target) => Some(self.coordinator.stop(target).await?),
            None => None,
        };

        self.auth_state.remove()?;
        copy_auth_state(&self.auth_state, &snapshot.stored_path, self.auth_state.path())?;

        tracing::info!("Restored {} snapshot \"{}\"", self.platform, name);
        Ok(stop)
    }
}

/// Snapshot names become directory names.
fn validate_name(name: &str) -> Result<(), ProfileError> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name == STAGING_DIR
        || name.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']);

    if bad {
        return Err(ProfileError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn write_snapshot(
    auth_state: &AuthState,
    dir: &Utf8Path,
    metadata: &SnapshotMetadata,
) -> Result<(), ProfileError> {
    copy_auth_state(auth_state, auth_state.path(), &dir.join(DATA_ENTRY))?;

    let metadata_path = dir.join(METADATA_FILE);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| io_err(&metadata_path)(io::Error::other(e)))?;
    fs::write(&metadata_path, json).map_err(io_err(&metadata_path))
}

/// Move `staged` to `dest`. An existing `dest` is set aside first and put back if the
/// move fails.
fn replace_dir(staged: &Utf8Path, dest: &Utf8Path) -> Result<(), ProfileError> {
    if !dest.exists() {
        return fs::rename(staged, dest).map_err(io_err(dest));
    }

    let previous = Utf8PathBuf::from(format!("{}.previous", staged));
    if previous.exists() {
        fs::remove_dir_all(&previous).map_err(io_err(&previous))?;
    }
    fs::rename(dest, &previous).map_err(io_err(dest))?;

    if let Err(e) = fs::rename(staged, dest) {
        let _ = fs::rename(&previous, dest);
        return Err(io_err(dest)(e));
    }
    if let Err(e) = fs::remove_dir_all(&previous) {
        tracing::debug!("Leaving stale {}: {}", previous, e);
    }
    Ok(())
}

fn copy_auth_state(kind: &AuthState, from: &Utf8Path, to: &Utf8Path) -> Result<(), ProfileError> {
    match kind {
        AuthState::Directory(_) => copy_tree(from, to),
        AuthState::File(_) => {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            fs::copy(from, to).map_err(io_err(from))?;
            Ok(())
        }
    }
}

/// Recursive copy of `src` into `dst`, creating `dst`.
pub fn copy_tree(src: &Utf8Path, dst: &Utf8Path) -> Result<(), ProfileError> {
    fs::create_dir_all(dst).map_err(io_err(dst))?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| io_err(src)(io::Error::from(e)))?;
        let relative = entry
            .path()
            .strip_prefix(src.as_std_path())
            .map_err(|e| io_err(src)(io::Error::other(e)))?;
        let target = dst.as_std_path().join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_err(dst))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(io_err(dst))?;
        } else {
            tracing::debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }

    Ok(())
}
