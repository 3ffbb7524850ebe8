//! Core data types shared across the rewind engine
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Checkpoints**: [`Checkpoint`], [`CheckpointMetadata`] - immutable points in a session timeline
//! - **Snapshots**: [`FileSnapshot`] - per-file capture records backing a checkpoint
//! - **Operations**: [`CheckpointResult`], [`CheckpointDiff`], [`FileDiff`] - results of engine calls
//! - **Policy**: [`CheckpointStrategy`], [`CheckpointSettings`] - automatic checkpointing behavior
//!
//! Checkpoint and timeline documents are serialized with camelCase field
//! names so the host application can consume them unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum size of a file the engine will track and snapshot.
///
/// Files larger than this are skipped during the project walk. The engine
/// targets source trees, not build artifacts or media assets.
pub const MAX_TRACKED_FILE_SIZE: u64 = 1024 * 1024;

/// A checkpoint in a session timeline
///
/// Represents an immutable snapshot of the project's tracked files plus
/// session metadata at a specific point in the message transcript. Created
/// once by [`CheckpointManager::create_checkpoint`] and never mutated;
/// forking creates a new checkpoint with an explicit parent rather than
/// editing history.
///
/// [`CheckpointManager::create_checkpoint`]: crate::manager::CheckpointManager::create_checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Unique identifier (UUID v4), never reused even after deletion
    pub id: String,
    /// Session this checkpoint belongs to
    pub session_id: String,
    /// Project this checkpoint belongs to
    pub project_id: String,
    /// Index of the newest transcript message at creation time
    pub message_index: usize,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Optional caller-provided description
    pub description: Option<String>,
    /// Parent checkpoint for branching timelines (None for the first checkpoint)
    pub parent_checkpoint_id: Option<String>,
    /// Session metadata captured from the transcript
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Get a short ID for display (first 8 characters)
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// Metadata captured alongside a checkpoint
///
/// Extracted from the session transcript by scanning backward from the
/// newest entry until a user prompt is found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    /// Cumulative token usage observed in the scanned transcript entries
    pub total_tokens: i64,
    /// Model reported by the transcript (engine default when absent)
    pub model_used: String,
    /// Text of the most recent user prompt
    pub user_prompt: String,
    /// Number of file snapshots in this checkpoint
    pub file_changes: usize,
    /// Total uncompressed size of all snapshot content in bytes
    pub snapshot_size: u64,
}

/// A single file captured by a checkpoint
///
/// One record per tracked path. `content` holds the raw bytes at capture
/// time; in storage the bytes live once in the content pool keyed by `hash`,
/// so identical content across any number of checkpoints occupies exactly
/// one blob. A path that disappeared from disk is recorded with
/// `is_deleted = true` and empty content.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSnapshot {
    /// Checkpoint this snapshot belongs to
    pub checkpoint_id: String,
    /// Path relative to the project root
    pub file_path: String,
    /// Raw file content (empty for deleted files)
    pub content: Vec<u8>,
    /// SHA-256 hash of the content (last known hash for deleted files)
    pub hash: String,
    /// Whether the file was deleted from disk
    pub is_deleted: bool,
    /// Unix permission bits, when available
    pub permissions: Option<u32>,
    /// Content size in bytes
    pub size: u64,
}

/// Result of a checkpoint creation
///
/// Per-file failures during snapshot persistence are collected as warnings
/// rather than aborting the checkpoint; the checkpoint is committed either
/// way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointResult {
    /// The newly created checkpoint
    pub checkpoint: Checkpoint,
    /// Number of file snapshots persisted successfully
    pub files_processed: usize,
    /// Non-fatal per-file warnings
    pub warnings: Vec<String>,
}

/// Difference between two checkpoints
///
/// Change detection is hash-based only; no line-level diff is computed, so
/// per-file addition/deletion counts are reported as zero placeholders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDiff {
    /// Source checkpoint ID
    pub from_checkpoint_id: String,
    /// Target checkpoint ID
    pub to_checkpoint_id: String,
    /// Files present in both sides with differing content hash
    pub modified_files: Vec<FileDiff>,
    /// Paths present only in the target
    pub added_files: Vec<String>,
    /// Paths present only in the source
    pub deleted_files: Vec<String>,
    /// Arithmetic difference of cumulative token counts (to minus from)
    pub token_delta: i64,
}

/// A single modified file within a [`CheckpointDiff`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    /// Path relative to the project root
    pub path: String,
    /// Lines added (always 0, change detection is hash-based)
    pub additions: usize,
    /// Lines deleted (always 0, change detection is hash-based)
    pub deletions: usize,
    /// Rendered diff content (never populated by this engine)
    pub diff_content: Option<String>,
}

/// When checkpoints should be created automatically
///
/// The engine never creates checkpoints on its own; callers consult
/// [`CheckpointManager::should_auto_checkpoint`] per transcript line and
/// decide whether to act.
///
/// [`CheckpointManager::should_auto_checkpoint`]: crate::manager::CheckpointManager::should_auto_checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStrategy {
    /// Only explicit checkpoint calls
    Manual,
    /// Checkpoint after every user prompt
    PerPrompt,
    /// Checkpoint after every tool use
    PerToolUse,
    /// Checkpoint after tool uses that are likely to mutate files
    Smart,
}

impl Default for CheckpointStrategy {
    fn default() -> Self {
        CheckpointStrategy::Smart
    }
}

/// Auto-checkpoint settings for one session, stored with its timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSettings {
    /// Whether automatic checkpoint policy is active
    pub auto_checkpoint_enabled: bool,
    /// Strategy consulted when auto-checkpointing is enabled
    pub checkpoint_strategy: CheckpointStrategy,
}
