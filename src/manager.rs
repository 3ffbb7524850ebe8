//! Per-session checkpoint orchestration
//!
//! ## Overview
//!
//! A [`CheckpointManager`] owns everything one session needs: the dirty-file
//! tracker, the in-memory message buffer, the timeline, and the snapshot
//! store. It is the only component that touches the project's working tree.
//!
//! All mutating operations go through one internal lock, so checkpoint
//! creation and restoration on the same session are mutually exclusive: a
//! restore can never read a half-assembled snapshot set and a create can
//! never race the tracker's state. Operations are synchronous and block the
//! calling thread; callers needing responsiveness offload the call
//! themselves.
//!
//! ## Checkpoint assembly
//!
//! `create_checkpoint` walks the project tree to pick up files the tracker
//! has not seen yet, then snapshots every tracked path by re-reading and
//! re-hashing it. This is a full re-snapshot each time, not an incremental
//! diff; deduplication in the store makes the redundancy cheap. Paths that
//! vanished from disk become tombstone snapshots, so a restore knows to
//! remove them.

use crate::diff;
use crate::error::{Result, RewindError};
use crate::store::SnapshotStore;
use crate::timeline::SessionTimeline;
use crate::tracker::FileTracker;
use crate::transcript::TranscriptEntry;
use crate::types::{
    Checkpoint, CheckpointDiff, CheckpointMetadata, CheckpointResult, CheckpointSettings,
    CheckpointStrategy, FileSnapshot, MAX_TRACKED_FILE_SIZE,
};
use crate::utils::{hash_data, permissions_of, set_permissions};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Model recorded when the transcript never names one
const DEFAULT_MODEL: &str = "sonnet";

/// Tool names the smart auto-checkpoint policy treats as file-mutating
const DESTRUCTIVE_TOOLS: &[&str] = &["write", "edit", "multiedit", "bash"];

/// Mutable state guarded by the manager's lock
struct ManagerState {
    tracker: FileTracker,
    timeline: SessionTimeline,
    messages: Vec<String>,
}

/// Checkpoint lifecycle for one session
///
/// Created via [`SessionRegistry::acquire`] in normal use; constructing one
/// directly is supported for hosts that manage lifetimes themselves.
///
/// [`SessionRegistry::acquire`]: crate::registry::SessionRegistry::acquire
pub struct CheckpointManager {
    project_id: String,
    session_id: String,
    project_root: PathBuf,
    store: SnapshotStore,
    inner: Mutex<ManagerState>,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("project_id", &self.project_id)
            .field("session_id", &self.session_id)
            .field("project_root", &self.project_root)
            .finish()
    }
}

impl CheckpointManager {
    /// Create a manager for one session
    ///
    /// Opens (initializing if needed) the session's snapshot store under
    /// `state_root` and loads its persisted timeline. The tracker starts
    /// empty and fills up as files are observed.
    pub fn new(
        project_id: impl Into<String>,
        session_id: impl Into<String>,
        project_root: PathBuf,
        state_root: &Path,
    ) -> Result<Self> {
        let project_id = project_id.into();
        let session_id = session_id.into();

        let store = SnapshotStore::open(state_root, &session_id)?;
        let timeline = store.load_or_init_timeline(&session_id);

        Ok(Self {
            project_id,
            session_id,
            project_root: project_root.clone(),
            store,
            inner: Mutex::new(ManagerState {
                tracker: FileTracker::new(project_root),
                timeline,
                messages: Vec::new(),
            }),
        })
    }

    /// Session this manager serves
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Project this manager serves
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Buffer a transcript line and feed any tool uses to the tracker
    ///
    /// Malformed lines are buffered but otherwise ignored; the transcript
    /// belongs to the caller and one bad line must not poison tracking.
    pub fn track_message(&self, line: &str) {
        let mut state = self.inner.lock();
        state.messages.push(line.to_string());

        match TranscriptEntry::parse(line) {
            Ok(entry) => {
                for (name, input) in entry.tool_uses() {
                    state.tracker.track_tool_use(name, input);
                }
            }
            Err(e) => {
                debug!(error = %e, "ignoring transcript line that fails the schema");
            }
        }
    }

    /// Observe one path under the project root
    pub fn track_file_modification(&self, rel_path: &str) {
        self.inner.lock().tracker.track_file_modification(rel_path);
    }

    /// Consult the session's auto-checkpoint policy for one transcript line
    ///
    /// The engine never creates checkpoints on its own; this only answers
    /// whether the configured strategy would want one after this line.
    pub fn should_auto_checkpoint(&self, line: &str) -> bool {
        let Ok(entry) = TranscriptEntry::parse(line) else {
            return false;
        };

        let state = self.inner.lock();
        if !state.timeline.auto_checkpoint_enabled {
            return false;
        }
        match state.timeline.checkpoint_strategy {
            CheckpointStrategy::Manual => false,
            CheckpointStrategy::PerPrompt => entry.user_prompt().is_some(),
            CheckpointStrategy::PerToolUse => entry.has_tool_use(),
            CheckpointStrategy::Smart => entry
                .tool_uses()
                .any(|(name, _)| DESTRUCTIVE_TOOLS.contains(&name.to_ascii_lowercase().as_str())),
        }
    }

    /// Create a checkpoint of the project's current state
    ///
    /// Walks the project tree for untracked files, snapshots every tracked
    /// path, extracts session metadata from the message buffer, persists
    /// the whole set, and records the new node in the timeline. Per-file
    /// read and write failures become warnings on the returned result; the
    /// checkpoint commits regardless.
    ///
    /// Pass `parent_checkpoint_id` to branch from a specific point; without
    /// it the new node attaches under the timeline root.
    pub fn create_checkpoint(
        &self,
        description: Option<String>,
        parent_checkpoint_id: Option<String>,
    ) -> Result<CheckpointResult> {
        let mut state = self.inner.lock();
        self.create_locked(&mut state, description, parent_checkpoint_id)
    }

    /// Restore the working tree to a checkpoint
    ///
    /// Filesystem-only: every non-deleted snapshot is written back byte for
    /// byte (permission bits reapplied best-effort), every tombstone removes
    /// its file, and the timeline's current pointer moves. The message
    /// transcript is not rewound.
    pub fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<()> {
        let mut state = self.inner.lock();
        self.restore_locked(&mut state, checkpoint_id)
    }

    /// Restore a checkpoint, then branch from it
    ///
    /// The new checkpoint carries `checkpoint_id` as its explicit parent,
    /// which is what creates a fork in the timeline instead of extending
    /// the current tip.
    pub fn fork_from_checkpoint(
        &self,
        checkpoint_id: &str,
        description: Option<String>,
    ) -> Result<CheckpointResult> {
        let mut state = self.inner.lock();
        self.restore_locked(&mut state, checkpoint_id)?;
        self.create_locked(&mut state, description, Some(checkpoint_id.to_string()))
    }

    /// Every checkpoint in the timeline, pre-order
    pub fn list_checkpoints(&self) -> Vec<Checkpoint> {
        let state = self.inner.lock();
        state
            .timeline
            .all_checkpoints()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of the session's timeline
    pub fn timeline(&self) -> SessionTimeline {
        self.inner.lock().timeline.clone()
    }

    /// Checkpoint the working tree currently reflects
    pub fn current_checkpoint_id(&self) -> Option<String> {
        self.inner.lock().timeline.current_checkpoint_id.clone()
    }

    /// Auto-checkpoint settings stored with the timeline
    pub fn settings(&self) -> CheckpointSettings {
        self.inner.lock().timeline.settings()
    }

    /// Replace the auto-checkpoint settings and persist them
    pub fn update_settings(&self, settings: CheckpointSettings) -> Result<()> {
        let mut state = self.inner.lock();
        state.timeline.apply_settings(settings);
        self.store.save_timeline(&state.timeline)
    }

    /// Diff two of this session's checkpoints
    pub fn diff(&self, from_checkpoint_id: &str, to_checkpoint_id: &str) -> Result<CheckpointDiff> {
        diff::compute(&self.store, from_checkpoint_id, to_checkpoint_id)
    }

    /// Load the decompressed message log of a checkpoint
    pub fn checkpoint_messages(&self, checkpoint_id: &str) -> Result<String> {
        self.store.load_messages(checkpoint_id)
    }

    fn create_locked(
        &self,
        state: &mut ManagerState,
        description: Option<String>,
        parent_checkpoint_id: Option<String>,
    ) -> Result<CheckpointResult> {
        let message_index = state.messages.len().saturating_sub(1);
        let (user_prompt, model_used, total_tokens) = extract_metadata(&state.messages);

        self.scan_project_files(state)?;

        let checkpoint_id = uuid::Uuid::new_v4().to_string();
        let mut snapshots = Vec::new();
        let mut read_warnings = Vec::new();
        let mut snapshot_size = 0u64;

        let tracked: Vec<(String, String)> = state
            .tracker
            .states()
            .map(|(path, st)| (path.clone(), st.last_hash.clone()))
            .collect();

        for (rel_path, last_hash) in tracked {
            let full_path = self.project_root.join(&rel_path);

            // Deletion is decided against the filesystem at snapshot time,
            // not against possibly-stale tracker state
            if !full_path.exists() {
                snapshots.push(FileSnapshot {
                    checkpoint_id: checkpoint_id.clone(),
                    file_path: rel_path,
                    content: Vec::new(),
                    hash: last_hash,
                    is_deleted: true,
                    permissions: None,
                    size: 0,
                });
                continue;
            }

            let content = match fs::read(&full_path) {
                Ok(content) => content,
                Err(e) => {
                    read_warnings.push(format!("Failed to read {rel_path}: {e}"));
                    continue;
                }
            };

            let hash = hash_data(&content);
            let permissions = fs::metadata(&full_path).ok().map(|m| permissions_of(&m));
            let size = content.len() as u64;
            snapshot_size += size;

            state.tracker.mark_clean(&rel_path, hash.clone());
            snapshots.push(FileSnapshot {
                checkpoint_id: checkpoint_id.clone(),
                file_path: rel_path,
                content,
                hash,
                is_deleted: false,
                permissions,
                size,
            });
        }

        let checkpoint = Checkpoint {
            id: checkpoint_id,
            session_id: self.session_id.clone(),
            project_id: self.project_id.clone(),
            message_index,
            timestamp: Utc::now(),
            description,
            parent_checkpoint_id,
            metadata: CheckpointMetadata {
                total_tokens,
                model_used,
                user_prompt,
                file_changes: snapshots.len(),
                snapshot_size,
            },
        };

        let messages = state.messages.join("\n");
        let mut result =
            self.store
                .save_checkpoint(&checkpoint, &snapshots, &messages, &mut state.timeline)?;

        if !read_warnings.is_empty() {
            read_warnings.append(&mut result.warnings);
            result.warnings = read_warnings;
        }

        info!(
            checkpoint = result.checkpoint.short_id(),
            files = result.checkpoint.metadata.file_changes,
            warnings = result.warnings.len(),
            "created checkpoint"
        );
        Ok(result)
    }

    fn restore_locked(&self, state: &mut ManagerState, checkpoint_id: &str) -> Result<()> {
        let checkpoint = self.store.load_checkpoint(checkpoint_id)?;
        let snapshots = self.store.load_file_snapshots(checkpoint_id)?;

        for snapshot in &snapshots {
            let full_path = self.project_root.join(&snapshot.file_path);

            if snapshot.is_deleted {
                if full_path.exists() {
                    fs::remove_file(&full_path).map_err(|e| {
                        RewindError::restore(format!(
                            "could not delete {}: {e}",
                            snapshot.file_path
                        ))
                    })?;
                }
                continue;
            }

            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full_path, &snapshot.content).map_err(|e| {
                RewindError::restore(format!("could not write {}: {e}", snapshot.file_path))
            })?;

            if let Some(mode) = snapshot.permissions {
                if let Err(e) = set_permissions(&full_path, mode) {
                    warn!(
                        path = %snapshot.file_path,
                        error = %e,
                        "could not reapply permissions"
                    );
                }
            }
        }

        state.timeline.current_checkpoint_id = Some(checkpoint.id.clone());
        self.store.save_timeline(&state.timeline)?;

        info!(
            checkpoint = checkpoint.short_id(),
            files = snapshots.len(),
            "restored checkpoint"
        );
        Ok(())
    }

    /// Walk the project tree and start tracking any file not yet seen
    fn scan_project_files(&self, state: &mut ManagerState) -> Result<()> {
        if !self.project_root.exists() {
            return Err(RewindError::ProjectRootMissing(self.project_root.clone()));
        }

        let walker = WalkDir::new(&self.project_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.metadata() {
                Ok(metadata) if metadata.len() > MAX_TRACKED_FILE_SIZE => continue,
                Err(_) => continue,
                _ => {}
            }

            let rel_path = match entry.path().strip_prefix(&self.project_root) {
                Ok(rel) => rel.to_string_lossy().into_owned(),
                Err(_) => continue,
            };

            if !state.tracker.is_tracked(&rel_path) {
                state.tracker.track_file_modification(&rel_path);
            }
        }

        Ok(())
    }
}

/// Skip hidden entries and well-known build directories during the walk
fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || (entry.file_type().is_dir() && (name == "node_modules" || name == "target"))
}

/// Extract session metadata by scanning the buffer newest to oldest
///
/// Token usage and model name accumulate over every scanned entry; the
/// scan stops at the first user entry whose prompt text is extractable.
fn extract_metadata(messages: &[String]) -> (String, String, i64) {
    let mut user_prompt = String::new();
    let mut model_used = DEFAULT_MODEL.to_string();
    let mut total_tokens = 0i64;

    for line in messages.iter().rev() {
        let Ok(entry) = TranscriptEntry::parse(line) else {
            continue;
        };

        if let Some(message) = &entry.message {
            if let Some(model) = &message.model {
                model_used = model.clone();
            }
            if let Some(usage) = &message.usage {
                total_tokens += usage.total();
            }
        }

        if let Some(prompt) = entry.user_prompt() {
            user_prompt = prompt.to_string();
            break;
        }
    }

    (user_prompt, model_used, total_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_manager() -> (CheckpointManager, TempDir, TempDir) {
        let project = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let manager = CheckpointManager::new(
            "project-1",
            "session-1",
            project.path().to_path_buf(),
            state.path(),
        )
        .unwrap();
        (manager, project, state)
    }

    #[test]
    fn test_create_discovers_project_files() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("a.txt"), "1").unwrap();
        fs::create_dir(project.path().join("src")).unwrap();
        fs::write(project.path().join("src/lib.rs"), "pub fn f() {}").unwrap();

        let result = manager.create_checkpoint(Some("initial".to_string()), None).unwrap();
        assert_eq!(result.checkpoint.metadata.file_changes, 2);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_walk_skips_hidden_and_build_dirs() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("kept.txt"), "yes").unwrap();
        fs::create_dir(project.path().join(".git")).unwrap();
        fs::write(project.path().join(".git/HEAD"), "ref").unwrap();
        fs::create_dir(project.path().join("node_modules")).unwrap();
        fs::write(project.path().join("node_modules/pkg.js"), "no").unwrap();
        fs::create_dir(project.path().join("target")).unwrap();
        fs::write(project.path().join("target/out.o"), "no").unwrap();
        fs::write(project.path().join(".hidden"), "no").unwrap();

        let result = manager.create_checkpoint(None, None).unwrap();
        assert_eq!(result.checkpoint.metadata.file_changes, 1);
    }

    #[test]
    fn test_walk_skips_oversized_files() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("small.txt"), "ok").unwrap();
        fs::write(
            project.path().join("huge.bin"),
            vec![0u8; (MAX_TRACKED_FILE_SIZE + 1) as usize],
        )
        .unwrap();

        let result = manager.create_checkpoint(None, None).unwrap();
        assert_eq!(result.checkpoint.metadata.file_changes, 1);
    }

    #[test]
    fn test_missing_project_root_is_an_error() {
        let state = TempDir::new().unwrap();
        let manager = CheckpointManager::new(
            "project-1",
            "session-1",
            PathBuf::from("/definitely/not/here"),
            state.path(),
        )
        .unwrap();

        let err = manager.create_checkpoint(None, None).unwrap_err();
        assert!(matches!(err, RewindError::ProjectRootMissing(_)));
    }

    #[test]
    fn test_metadata_extraction_from_messages() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("a.txt"), "1").unwrap();

        manager.track_message(r#"{"type":"user","message":{"role":"user","content":"add a feature"}}"#);
        manager.track_message(
            r#"{"type":"assistant","message":{"role":"assistant","model":"opus","usage":{"input_tokens":100,"output_tokens":50},"content":[{"type":"text","text":"done"}]}}"#,
        );

        let result = manager.create_checkpoint(None, None).unwrap();
        let metadata = &result.checkpoint.metadata;
        assert_eq!(metadata.user_prompt, "add a feature");
        assert_eq!(metadata.model_used, "opus");
        assert_eq!(metadata.total_tokens, 150);
        assert_eq!(result.checkpoint.message_index, 1);
    }

    #[test]
    fn test_malformed_transcript_lines_are_tolerated() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("a.txt"), "1").unwrap();

        manager.track_message("this is not json");
        manager.track_message(r#"{"type":"user","message":{"role":"user","content":"hi"}}"#);

        let result = manager.create_checkpoint(None, None).unwrap();
        assert_eq!(result.checkpoint.metadata.user_prompt, "hi");
    }

    #[test]
    fn test_tool_use_feeds_tracker() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("a.txt"), "1").unwrap();

        manager.track_message(
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","name":"write","input":{"file_path":"a.txt"}}]}}"#,
        );

        let result = manager.create_checkpoint(None, None).unwrap();
        assert_eq!(result.checkpoint.metadata.file_changes, 1);
    }

    #[test]
    fn test_no_change_checkpoint_snapshots_all_tracked_files() {
        let (manager, project, _state) = test_manager();
        fs::write(project.path().join("a.txt"), "1").unwrap();
        fs::write(project.path().join("b.txt"), "2").unwrap();

        let first = manager.create_checkpoint(None, None).unwrap();
        assert_eq!(first.checkpoint.metadata.file_changes, 2);

        // Nothing changed; the full tracked set is re-snapshotted by design
        let second = manager.create_checkpoint(None, None).unwrap();
        assert_eq!(second.checkpoint.metadata.file_changes, 2);
    }

    #[test]
    fn test_auto_checkpoint_policy_table() {
        let (manager, _project, _state) = test_manager();
        let prompt = r#"{"type":"user","message":{"role":"user","content":"go"}}"#;
        let benign_tool = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","name":"glob","input":{}}]}}"#;
        let edit_tool = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","name":"edit","input":{"file_path":"a"}}]}}"#;

        // Disabled: never
        assert!(!manager.should_auto_checkpoint(prompt));

        let enable = |strategy| CheckpointSettings {
            auto_checkpoint_enabled: true,
            checkpoint_strategy: strategy,
        };

        manager.update_settings(enable(CheckpointStrategy::Manual)).unwrap();
        assert!(!manager.should_auto_checkpoint(prompt));

        manager.update_settings(enable(CheckpointStrategy::PerPrompt)).unwrap();
        assert!(manager.should_auto_checkpoint(prompt));
        assert!(!manager.should_auto_checkpoint(benign_tool));

        manager.update_settings(enable(CheckpointStrategy::PerToolUse)).unwrap();
        assert!(manager.should_auto_checkpoint(benign_tool));
        assert!(manager.should_auto_checkpoint(edit_tool));

        manager.update_settings(enable(CheckpointStrategy::Smart)).unwrap();
        assert!(!manager.should_auto_checkpoint(benign_tool));
        assert!(manager.should_auto_checkpoint(edit_tool));
    }

    #[test]
    fn test_settings_survive_reload() {
        let project = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();

        {
            let manager = CheckpointManager::new(
                "project-1",
                "session-1",
                project.path().to_path_buf(),
                state.path(),
            )
            .unwrap();
            manager
                .update_settings(CheckpointSettings {
                    auto_checkpoint_enabled: true,
                    checkpoint_strategy: CheckpointStrategy::PerPrompt,
                })
                .unwrap();
        }

        let reloaded = CheckpointManager::new(
            "project-1",
            "session-1",
            project.path().to_path_buf(),
            state.path(),
        )
        .unwrap();
        let settings = reloaded.settings();
        assert!(settings.auto_checkpoint_enabled);
        assert_eq!(settings.checkpoint_strategy, CheckpointStrategy::PerPrompt);
    }
}
