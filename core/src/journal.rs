//! Checkpoint journal: per-path sealing state plus the set of produced
//! Merkle roots, persisted as one JSON document per calendar day.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::ts;

/// Filename suffix of the daily journal document.
pub const JOURNAL_SUFFIX: &str = "_checkpoints.json";

/// Errors emitted by journal load/save.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The on-disk document did not parse.
    #[error("journal parse failure: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// Storage or I/O failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// One sealed byte range `[from_pos, to_pos)` of a log file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Lowercase hex keccak-256 of the raw bytes in the range.
    pub hash: String,
    /// Anchor timestamp before sealing.
    #[serde(with = "crate::ts::serde_micros")]
    pub from_date: NaiveDateTime,
    /// Anchor timestamp after sealing.
    #[serde(with = "crate::ts::serde_micros")]
    pub to_date: NaiveDateTime,
    /// Start offset, equal to the previous entry's `to_pos`.
    pub from_pos: u64,
    /// End offset, exclusive.
    pub to_pos: u64,
    /// Shared batch root, attached by the batch worker; never changed after.
    #[serde(default)]
    pub root_hash: Option<String>,
    /// Sibling hashes proving membership under `root_hash`. The key is
    /// absent from the serialized form until the batch worker attaches it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proofs: Option<Vec<String>>,
}

/// Sealing state for one currently-active log file path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointState {
    /// Timestamp of the most recent message accounted for.
    #[serde(with = "crate::ts::serde_micros")]
    pub last_ts: NaiveDateTime,
    /// Offset below which every byte is sealed or predates the anchor.
    pub last_pos: u64,
    /// Sealed ranges, contiguous and monotone.
    pub history: Vec<HistoryEntry>,
}

/// The whole persisted state: path map plus every root ever produced.
///
/// Serialized with path keys at the top level beside the reserved `roots`
/// key, which holds the sorted list form of the set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Journal {
    /// Every Merkle root this instance has produced.
    #[serde(default)]
    pub roots: BTreeSet<String>,
    /// Per-path checkpoint state, keyed by log file path.
    #[serde(flatten)]
    pub paths: BTreeMap<String, CheckpointState>,
}

/// Shared journal handle: the mutex-guarded state plus its directory.
///
/// All mutation by the writer and the batch worker goes through one handle;
/// the mutex is held across range hashing and saves.
#[derive(Debug)]
pub struct JournalHandle {
    dir: PathBuf,
    inner: Mutex<Journal>,
}

impl JournalHandle {
    /// Load today's journal from `dir`, or start empty if none exists.
    ///
    /// A parse failure is fatal here; callers treat it as a startup error.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, JournalError> {
        let dir = dir.as_ref().to_path_buf();
        let file = journal_file(&dir, ts::now().date());
        let journal = if file.exists() {
            let bytes = fs::read(&file)
                .with_context(|| format!("failed to read journal {}", file.display()))?;
            let journal: Journal = serde_json::from_slice(&bytes)?;
            tracing::info!(
                path = %file.display(),
                paths = journal.paths.len(),
                roots = journal.roots.len(),
                "existing journal found, loading"
            );
            journal
        } else {
            Journal::default()
        };
        Ok(Self {
            dir,
            inner: Mutex::new(journal),
        })
    }

    /// Acquire the journal mutex.
    pub fn lock(&self) -> MutexGuard<'_, Journal> {
        self.inner.lock()
    }

    /// Clone the current state; for read-only consumers.
    pub fn snapshot(&self) -> Journal {
        self.inner.lock().clone()
    }

    /// Persist `journal` to today's dated file.
    ///
    /// Callers already hold the mutex and pass the guarded value down. The
    /// write goes to a temp sibling and is renamed into place so a crashed
    /// save leaves the previous document intact.
    pub fn save_locked(&self, journal: &Journal) -> Result<(), JournalError> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create checkpoint directory {}", self.dir.display())
        })?;
        let path = journal_file(&self.dir, ts::now().date());
        let tmp = path.with_extension("json.tmp");
        let encoded = serde_json::to_vec(journal)?;
        fs::write(&tmp, encoded)
            .with_context(|| format!("failed to write journal {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| {
            format!(
                "failed to persist journal {} -> {}",
                tmp.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

/// Dated journal filename under `dir` for `date`.
pub fn journal_file(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}{}", date.format("%Y-%m-%d"), JOURNAL_SUFFIX))
}
