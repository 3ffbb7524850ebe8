//! Hash-based diff between two checkpoints
//!
//! Change detection compares content hashes only. A path present on one
//! side and absent on the other is an addition or deletion; a path present
//! on both sides with differing hashes is a modification. No line-level
//! diff is computed, so per-file addition/deletion counts are reported as
//! zero placeholders. The token delta is the arithmetic difference of the
//! two checkpoints' cumulative counts.

use crate::error::Result;
use crate::store::SnapshotStore;
use crate::types::{CheckpointDiff, FileDiff, FileSnapshot};
use std::collections::HashMap;

/// Diff two persisted checkpoints of one session
pub fn compute(
    store: &SnapshotStore,
    from_checkpoint_id: &str,
    to_checkpoint_id: &str,
) -> Result<CheckpointDiff> {
    let from_checkpoint = store.load_checkpoint(from_checkpoint_id)?;
    let to_checkpoint = store.load_checkpoint(to_checkpoint_id)?;

    let from_snapshots = store.load_file_snapshots(from_checkpoint_id)?;
    let to_snapshots = store.load_file_snapshots(to_checkpoint_id)?;

    let mut diff = diff_snapshots(&from_snapshots, &to_snapshots);
    diff.from_checkpoint_id = from_checkpoint_id.to_string();
    diff.to_checkpoint_id = to_checkpoint_id.to_string();
    diff.token_delta =
        to_checkpoint.metadata.total_tokens - from_checkpoint.metadata.total_tokens;

    Ok(diff)
}

/// Compare two snapshot sets by path and hash
///
/// Tombstones count as absent: a file that exists in `from` and is a
/// deletion record in `to` shows up as deleted, not modified. Output lists
/// are sorted by path so results are deterministic.
pub fn diff_snapshots(from: &[FileSnapshot], to: &[FileSnapshot]) -> CheckpointDiff {
    let from_map = live_snapshots(from);
    let to_map = live_snapshots(to);

    let mut modified_files = Vec::new();
    let mut added_files = Vec::new();
    let mut deleted_files = Vec::new();

    for (path, from_snapshot) in &from_map {
        match to_map.get(path) {
            Some(to_snapshot) => {
                if from_snapshot.hash != to_snapshot.hash {
                    modified_files.push(FileDiff {
                        path: (*path).to_string(),
                        additions: 0,
                        deletions: 0,
                        diff_content: None,
                    });
                }
            }
            None => deleted_files.push((*path).to_string()),
        }
    }

    for path in to_map.keys() {
        if !from_map.contains_key(path) {
            added_files.push((*path).to_string());
        }
    }

    modified_files.sort_by(|a, b| a.path.cmp(&b.path));
    added_files.sort();
    deleted_files.sort();

    CheckpointDiff {
        from_checkpoint_id: String::new(),
        to_checkpoint_id: String::new(),
        modified_files,
        added_files,
        deleted_files,
        token_delta: 0,
    }
}

fn live_snapshots(snapshots: &[FileSnapshot]) -> HashMap<&str, &FileSnapshot> {
    snapshots
        .iter()
        .filter(|s| !s.is_deleted)
        .map(|s| (s.file_path.as_str(), s))
        .collect()
}
