//! Snapshot persistence.
//!
//! The whole state is written as one JSON document wrapped in a small
//! envelope. Writes go to a sibling temporary file which is synced and then
//! renamed over the target, so a failed write never leaves a torn snapshot.

use super::aggregate::{State, StateAggregate};
use crate::core::error::{CoreError, CoreResult};
use crate::model::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Envelope format written by this version.
pub const SNAPSHOT_FORMAT: u32 = 1;

/// Consecutive write failures after which each failure is logged at error level.
pub const FAILURE_ALERT_THRESHOLD: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format: u32,
    saved_at: DateTime<Utc>,
    state: State,
}

/// Summary of a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub format: u32,
    pub saved_at: DateTime<Utc>,
    pub version: u64,
    pub counts: Vec<(EntityKind, usize)>,
}

impl SnapshotInfo {
    fn from_parts(format: u32, saved_at: DateTime<Utc>, state: &State) -> Self {
        Self {
            format,
            saved_at,
            version: state.version,
            counts: EntityKind::ALL
                .iter()
                .map(|kind| (*kind, state.count(*kind)))
                .collect(),
        }
    }
}

/// Snapshot file owner for one node.
#[derive(Debug)]
pub struct Persistence {
    path: PathBuf,
    consecutive_failures: AtomicU32,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of write failures since the last successful write.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Serialize under the read lock, then write outside it.
    pub fn write_snapshot(&self, aggregate: &StateAggregate) -> CoreResult<()> {
        let bytes = aggregate.with_read_lock(encode_state)?;
        write_atomic(&self.path, &bytes)
    }

    /// Write a detached state (used by offline tooling).
    pub fn write_state(&self, state: &State) -> CoreResult<()> {
        let bytes = encode_state(state)?;
        write_atomic(&self.path, &bytes)
    }

    /// Write a snapshot, logging instead of failing.
    ///
    /// Returns whether the write succeeded.
    pub fn save(&self, aggregate: &StateAggregate) -> bool {
        match self.write_snapshot(aggregate) {
            Ok(()) => {
                let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
                if previous > 0 {
                    tracing::info!(path = %self.path.display(), previous_failures = previous, "snapshot write recovered");
                } else {
                    tracing::debug!(path = %self.path.display(), "snapshot written");
                }
                true
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= FAILURE_ALERT_THRESHOLD {
                    tracing::error!(path = %self.path.display(), failures, error = %err, "snapshot writes keep failing");
                } else {
                    tracing::warn!(path = %self.path.display(), failures, error = %err, "snapshot write failed");
                }
                false
            }
        }
    }

    /// Load the snapshot at startup. A missing file yields `None`.
    pub fn load_snapshot(&self) -> CoreResult<Option<State>> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_snapshot(&self.path).map(|(_, state)| Some(state))
    }
}

fn encode_state(state: &State) -> CoreResult<Vec<u8>> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        format: u32,
        saved_at: DateTime<Utc>,
        state: &'a State,
    }

    serde_json::to_vec_pretty(&Borrowed {
        format: SNAPSHOT_FORMAT,
        saved_at: Utc::now(),
        state,
    })
    .map_err(|err| CoreError::persistence(format!("failed to encode snapshot: {}", err)))
}

/// Parse a snapshot file.
pub fn read_snapshot(path: &Path) -> CoreResult<(SnapshotInfo, State)> {
    let bytes = std::fs::read(path).map_err(|err| {
        CoreError::persistence(format!("failed to read {}: {}", path.display(), err))
    })?;
    let envelope: SnapshotEnvelope = serde_json::from_slice(&bytes).map_err(|err| {
        CoreError::persistence(format!("failed to parse {}: {}", path.display(), err))
    })?;
    if envelope.format != SNAPSHOT_FORMAT {
        return Err(CoreError::persistence(format!(
            "unsupported snapshot format {} in {}",
            envelope.format,
            path.display()
        )));
    }
    let info = SnapshotInfo::from_parts(envelope.format, envelope.saved_at, &envelope.state);
    Ok((info, envelope.state))
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| {
            CoreError::persistence(format!("failed to create {}: {}", parent.display(), err))
        })?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        std::fs::rename(&temp, path)
    })();

    result.map_err(|err| {
        let _ = std::fs::remove_file(&temp);
        CoreError::persistence(format!("failed to write {}: {}", path.display(), err))
    })
}
