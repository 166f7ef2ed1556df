//! Per-path checkpoint state machine.
//!
//! The writer reports every append here. A path's first sighting anchors it;
//! afterwards a message arriving more than one checkpoint window after the
//! anchor seals the accumulated byte range into a history entry.

use std::collections::btree_map::Entry;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDateTime};
use tiny_keccak::{Hasher, Keccak};

use crate::journal::{CheckpointState, HistoryEntry, JournalError, JournalHandle};

/// Read granularity when streaming a byte range through the hasher.
pub const SEAL_CHUNK: usize = 1024;

/// Record an append of `path` at `ts` that left the file at `current_pos`,
/// sealing a checkpoint when the window has elapsed.
///
/// Holds the journal mutex across the range hashing and the save; sealing is
/// bounded by one window of bytes per path.
pub fn record_append(
    handle: &JournalHandle,
    window: Duration,
    path: &Path,
    ts: NaiveDateTime,
    current_pos: u64,
) -> Result<(), JournalError> {
    let mut journal = handle.lock();
    let key = path.to_string_lossy().into_owned();

    let state = match journal.paths.entry(key) {
        Entry::Vacant(slot) => {
            // No prior anchor point; the first message begins a range.
            slot.insert(CheckpointState {
                last_ts: ts,
                last_pos: current_pos,
                history: Vec::new(),
            });
            return Ok(());
        }
        Entry::Occupied(slot) => slot.into_mut(),
    };

    if ts - state.last_ts <= window {
        return Ok(());
    }
    if current_pos == state.last_pos {
        // A non-empty append always advances the file; nothing to seal.
        return Ok(());
    }

    let digest = hash_range(path, state.last_pos, current_pos)?;
    tracing::debug!(
        path = %path.display(),
        from_pos = state.last_pos,
        to_pos = current_pos,
        "sealing checkpoint"
    );
    state.history.push(HistoryEntry {
        hash: hex::encode(digest),
        from_date: state.last_ts,
        to_date: ts,
        from_pos: state.last_pos,
        to_pos: current_pos,
        root_hash: None,
        proofs: None,
    });
    state.last_pos = current_pos;
    state.last_ts = ts;

    handle.save_locked(&journal)
}

/// Stream `[from_pos, to_pos)` of `path` through one keccak-256 hasher.
///
/// The hasher covers the entire range; the offline verifier recomputes the
/// same digest. A file missing or shorter than `to_pos` is corruption and
/// surfaces as an error.
pub fn hash_range(path: &Path, from_pos: u64, to_pos: u64) -> anyhow::Result<[u8; 32]> {
    if to_pos < from_pos {
        bail!(
            "checkpoint range of {} ends before it starts ({from_pos}..{to_pos})",
            path.display()
        );
    }
    let mut file = File::open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    file.seek(SeekFrom::Start(from_pos))
        .with_context(|| format!("failed to seek log file {}", path.display()))?;

    let mut keccak = Keccak::v256();
    let mut buf = [0u8; SEAL_CHUNK];
    let mut remaining = to_pos - from_pos;
    while remaining > 0 {
        let want = remaining.min(SEAL_CHUNK as u64) as usize;
        let read = file
            .read(&mut buf[..want])
            .with_context(|| format!("failed to read log file {}", path.display()))?;
        if read == 0 {
            bail!(
                "log file {} is shorter than recorded position {to_pos}",
                path.display()
            );
        }
        keccak.update(&buf[..read]);
        remaining -= read as u64;
    }
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::keccak256;
    use crate::ts;
    use std::fs;

    fn minute(offset_secs: i64) -> NaiveDateTime {
        ts::parse_micros("2024-03-09T10:00:00.000000").unwrap() + Duration::seconds(offset_secs)
    }

    fn window() -> Duration {
        Duration::seconds(3)
    }

    #[test]
    fn first_sighting_anchors_without_sealing() {
        let dir = tempfile::tempdir().unwrap();
        let handle = JournalHandle::load(dir.path().join("checkpoints")).unwrap();
        let log = dir.path().join("10.0.0.1.log");
        fs::write(&log, b"first line\n").unwrap();

        record_append(&handle, window(), &log, minute(0), 11).unwrap();

        let journal = handle.snapshot();
        let state = &journal.paths[&log.to_string_lossy().into_owned()];
        assert_eq!(state.last_pos, 11);
        assert_eq!(state.last_ts, minute(0));
        assert!(state.history.is_empty());
    }

    #[test]
    fn within_window_leaves_the_anchor_alone() {
        let dir = tempfile::tempdir().unwrap();
        let handle = JournalHandle::load(dir.path().join("checkpoints")).unwrap();
        let log = dir.path().join("10.0.0.1.log");
        fs::write(&log, b"aaaa\nbbbb\n").unwrap();

        record_append(&handle, window(), &log, minute(0), 5).unwrap();
        record_append(&handle, window(), &log, minute(2), 10).unwrap();

        let journal = handle.snapshot();
        let state = &journal.paths[&log.to_string_lossy().into_owned()];
        assert_eq!(state.last_pos, 5);
        assert_eq!(state.last_ts, minute(0));
        assert!(state.history.is_empty());
    }

    #[test]
    fn past_window_seals_the_accumulated_range() {
        let dir = tempfile::tempdir().unwrap();
        let handle = JournalHandle::load(dir.path().join("checkpoints")).unwrap();
        let log = dir.path().join("10.0.0.1.log");
        fs::write(&log, b"aaaa\nbbbb\ncccc\n").unwrap();

        record_append(&handle, window(), &log, minute(0), 5).unwrap();
        record_append(&handle, window(), &log, minute(2), 10).unwrap();
        record_append(&handle, window(), &log, minute(4), 15).unwrap();

        let journal = handle.snapshot();
        let state = &journal.paths[&log.to_string_lossy().into_owned()];
        assert_eq!(state.last_pos, 15);
        assert_eq!(state.last_ts, minute(4));
        assert_eq!(state.history.len(), 1);

        let entry = &state.history[0];
        assert_eq!((entry.from_pos, entry.to_pos), (5, 15));
        assert_eq!(entry.from_date, minute(0));
        assert_eq!(entry.to_date, minute(4));
        assert_eq!(entry.hash, hex::encode(keccak256(b"bbbb\ncccc\n")));
        assert!(entry.root_hash.is_none());
        assert!(entry.proofs.is_none());
    }

    #[test]
    fn consecutive_seals_are_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let handle = JournalHandle::load(dir.path().join("checkpoints")).unwrap();
        let log = dir.path().join("10.0.0.1.log");
        fs::write(&log, vec![b'x'; 40]).unwrap();

        record_append(&handle, window(), &log, minute(0), 10).unwrap();
        record_append(&handle, window(), &log, minute(4), 20).unwrap();
        record_append(&handle, window(), &log, minute(8), 40).unwrap();

        let journal = handle.snapshot();
        let state = &journal.paths[&log.to_string_lossy().into_owned()];
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].to_pos, state.history[1].from_pos);
        assert_eq!(state.history[0].to_date, state.history[1].from_date);
        assert_eq!(state.last_pos, state.history[1].to_pos);
    }

    #[test]
    fn digest_covers_the_whole_range_across_chunks() {
        // A range wider than one read buffer must fold every chunk into the
        // same digest, not just the last one.
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("wide.log");
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&log, &payload).unwrap();

        let digest = hash_range(&log, 100, 4600).unwrap();
        assert_eq!(digest, keccak256(&payload[100..4600]));
    }

    #[test]
    fn truncated_log_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("short.log");
        fs::write(&log, b"tiny").unwrap();

        let err = hash_range(&log, 0, 999).unwrap_err();
        assert!(err.to_string().contains("shorter than recorded position"));
    }

    #[test]
    fn missing_log_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("gone.log");
        assert!(hash_range(&log, 0, 10).is_err());
    }
}
