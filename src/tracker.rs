//! Dirty-file tracking for one session's working tree
//!
//! ## Overview
//!
//! The tracker maintains per-path state (last hash, existence, pending
//! modification) between checkpoints. It is fed from two directions:
//! direct path notifications for tools that name the file they touch, and
//! a command heuristic for shell executions whose file effects cannot be
//! known precisely.
//!
//! The shell heuristic is a deliberate over-approximation: when a command
//! mentions any known file-mutating program, every tracked file is marked
//! modified. False positives cost one redundant re-snapshot; false
//! negatives would lose real changes, so the trade always goes this way.
//!
//! Tracker state is transient and never persisted; its effect is captured
//! in the snapshots each checkpoint writes.

use crate::utils::hash_data;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Programs whose presence in a shell command marks all tracked files dirty
const MUTATING_PROGRAMS: &[&str] = &[
    "echo", "cat", "cp", "mv", "rm", "touch", "sed", "awk", "npm", "yarn", "pnpm", "bun", "cargo",
    "make", "gcc", "g++",
];

/// Tools that name the file they modify in their input payload
const DIRECT_EDIT_TOOLS: &[&str] = &["edit", "write", "multiedit"];

/// Recorded state of one tracked path
#[derive(Debug, Clone)]
pub struct FileState {
    /// SHA-256 of the content when last observed (empty when absent)
    pub last_hash: String,
    /// Whether the path changed since the last checkpoint
    pub is_modified: bool,
    /// When the path was last observed
    pub last_modified: DateTime<Utc>,
    /// Whether the path existed on disk when last observed
    pub exists: bool,
}

/// Per-session dirty-file tracker
#[derive(Debug)]
pub struct FileTracker {
    project_root: PathBuf,
    tracked: HashMap<String, FileState>,
}

impl FileTracker {
    /// Create a tracker rooted at the project directory
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            tracked: HashMap::new(),
        }
    }

    /// Number of tracked paths
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// Whether any paths are tracked
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Whether a relative path is already tracked
    pub fn is_tracked(&self, rel_path: &str) -> bool {
        self.tracked.contains_key(rel_path)
    }

    /// Iterate over tracked paths and their states
    pub fn states(&self) -> impl Iterator<Item = (&String, &FileState)> {
        self.tracked.iter()
    }

    /// Observe the current on-disk state of a path and record whether it changed
    ///
    /// Reads existence and content hash under the project root and compares
    /// with the prior record. A path counts as modified when its hash or
    /// existence differs, or when a modification is already pending. An
    /// unreadable file is treated as absent.
    pub fn track_file_modification(&mut self, rel_path: &str) {
        let full_path = self.project_root.join(rel_path);
        let (hash, exists) = observe(&full_path);

        let is_modified = match self.tracked.get(rel_path) {
            Some(prior) => prior.last_hash != hash || prior.exists != exists || prior.is_modified,
            None => true,
        };

        trace!(path = rel_path, exists, is_modified, "tracked file state");
        self.tracked.insert(
            rel_path.to_string(),
            FileState {
                last_hash: hash,
                is_modified,
                last_modified: Utc::now(),
                exists,
            },
        );
    }

    /// Map an observed tool use to its file effects
    ///
    /// Direct-edit tools name their target in `input.file_path` and are
    /// tracked precisely. Shell executions go through the command
    /// heuristic.
    pub fn track_tool_use(&mut self, tool_name: &str, input: &Value) {
        let tool = tool_name.to_ascii_lowercase();

        if DIRECT_EDIT_TOOLS.contains(&tool.as_str()) {
            if let Some(file_path) = input.get("file_path").and_then(Value::as_str) {
                self.track_file_modification(file_path);
            }
        } else if tool == "bash" {
            if let Some(command) = input.get("command").and_then(Value::as_str) {
                self.track_shell_side_effects(command);
            }
        }
    }

    /// Mark every tracked file modified if the command mentions a mutating program
    fn track_shell_side_effects(&mut self, command: &str) {
        if MUTATING_PROGRAMS.iter().any(|cmd| command.contains(cmd)) {
            debug!(
                tracked = self.tracked.len(),
                "shell command may mutate files, marking all tracked files modified"
            );
            for state in self.tracked.values_mut() {
                state.is_modified = true;
            }
        }
    }

    /// Record that a path was snapshotted with the given content hash
    pub fn mark_clean(&mut self, rel_path: &str, hash: String) {
        if let Some(state) = self.tracked.get_mut(rel_path) {
            state.last_hash = hash;
            state.is_modified = false;
        }
    }
}

/// Read existence and content hash for a path (unreadable counts as absent)
fn observe(path: &Path) -> (String, bool) {
    match fs::read(path) {
        Ok(content) => (hash_data(&content), true),
        Err(_) => (String::new(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn tracker_with_file(name: &str, content: &str) -> (FileTracker, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(name), content).unwrap();
        let tracker = FileTracker::new(dir.path().to_path_buf());
        (tracker, dir)
    }

    #[test]
    fn test_first_observation_is_modified() {
        let (mut tracker, _dir) = tracker_with_file("a.txt", "1");
        tracker.track_file_modification("a.txt");

        let state = tracker.tracked.get("a.txt").unwrap();
        assert!(state.is_modified);
        assert!(state.exists);
        assert!(!state.last_hash.is_empty());
    }

    #[test]
    fn test_unchanged_content_after_clean_is_not_modified() {
        let (mut tracker, _dir) = tracker_with_file("a.txt", "1");
        tracker.track_file_modification("a.txt");

        let hash = tracker.tracked.get("a.txt").unwrap().last_hash.clone();
        tracker.mark_clean("a.txt", hash);

        tracker.track_file_modification("a.txt");
        assert!(!tracker.tracked.get("a.txt").unwrap().is_modified);
    }

    #[test]
    fn test_deletion_is_observed() {
        let (mut tracker, dir) = tracker_with_file("a.txt", "1");
        tracker.track_file_modification("a.txt");
        let hash = tracker.tracked.get("a.txt").unwrap().last_hash.clone();
        tracker.mark_clean("a.txt", hash);

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        tracker.track_file_modification("a.txt");

        let state = tracker.tracked.get("a.txt").unwrap();
        assert!(!state.exists);
        assert!(state.is_modified);
        assert!(state.last_hash.is_empty());
    }

    #[test]
    fn test_direct_edit_tool_tracks_target() {
        let (mut tracker, _dir) = tracker_with_file("src_main.rs", "fn main() {}");
        tracker.track_tool_use("Edit", &json!({"file_path": "src_main.rs"}));
        assert!(tracker.is_tracked("src_main.rs"));
    }

    #[test]
    fn test_shell_heuristic_marks_all_tracked_files() {
        let (mut tracker, _dir) = tracker_with_file("a.txt", "1");
        tracker.track_file_modification("a.txt");
        let hash = tracker.tracked.get("a.txt").unwrap().last_hash.clone();
        tracker.mark_clean("a.txt", hash);

        tracker.track_tool_use("bash", &json!({"command": "cargo build --release"}));
        assert!(tracker.tracked.get("a.txt").unwrap().is_modified);
    }

    #[test]
    fn test_benign_shell_command_leaves_state_alone() {
        let (mut tracker, _dir) = tracker_with_file("a.txt", "1");
        tracker.track_file_modification("a.txt");
        let hash = tracker.tracked.get("a.txt").unwrap().last_hash.clone();
        tracker.mark_clean("a.txt", hash);

        tracker.track_tool_use("bash", &json!({"command": "ls -la"}));
        assert!(!tracker.tracked.get("a.txt").unwrap().is_modified);
    }

    #[test]
    fn test_unknown_tool_is_ignored() {
        let (mut tracker, _dir) = tracker_with_file("a.txt", "1");
        tracker.track_tool_use("glob", &json!({"pattern": "**/*.rs"}));
        assert!(tracker.is_empty());
    }
}
