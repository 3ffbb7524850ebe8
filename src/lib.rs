//! # Rewind - checkpoints for file-mutating agent sessions
//!
//! A checkpoint/versioning engine for long-running agent sessions that edit
//! a project's files. It snapshots the file tree at caller-chosen points,
//! stores the snapshots deduplicated and compressed, organizes them into a
//! branching timeline per session, and can restore or diff any two points.
//! The net effect: a user can undo or fork an agent's edits without
//! re-running the agent.
//!
//! ## Architecture
//!
//! - **Content-addressed store**: file content lives once per distinct
//!   SHA-256 hash in a compressed pool; per-checkpoint references share
//!   blobs across checkpoints
//! - **Dirty tracking**: per-path state fed by direct tool notifications
//!   plus a deliberately over-approximate shell-command heuristic
//! - **Branching timeline**: a multiway tree of checkpoints per session,
//!   rooted at the first checkpoint, with explicit-parent forking
//! - **Hash-based diff**: added/modified/deleted sets between any two
//!   checkpoints, no line-level diffing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rewind::SessionRegistry;
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::new(PathBuf::from("/var/lib/myapp/state"));
//! let manager = registry.acquire("project-1", "session-1", Path::new("./my_project"))?;
//!
//! // Stream transcript lines as the agent produces them
//! manager.track_message(r#"{"type":"user","message":{"role":"user","content":"add tests"}}"#);
//!
//! // Snapshot the project
//! let created = manager.create_checkpoint(Some("before refactor".to_string()), None)?;
//! println!("checkpoint {}", created.checkpoint.short_id());
//!
//! // Later: put every file back the way it was
//! manager.restore_checkpoint(&created.checkpoint.id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! The engine consumes a project directory, a stream of newline-delimited
//! transcript messages, and explicit create/restore/fork/diff requests.
//! Whatever surfaces those calls (IPC, CLI, UI) belongs to the host
//! application. There is no network replication, no cross-process
//! coordination on a session, and no garbage collection of unreferenced
//! pool blobs.
//!
//! ## Concurrency
//!
//! Any number of sessions operate in parallel; operations on one session
//! are serialized by its manager's internal lock. All calls are
//! synchronous and block the calling thread.

// Public API modules
pub mod compression;
pub mod diff;
pub mod error;
pub mod manager;
pub mod registry;
pub mod store;
pub mod timeline;
pub mod tracker;
pub mod transcript;
pub mod types;

// Internal helpers
mod utils;

// Re-export main types for convenience
pub use compression::{CompressionEngine, CompressionStrategy};
pub use error::{Result, RewindError};
pub use manager::CheckpointManager;
pub use registry::SessionRegistry;
pub use store::{CheckpointPaths, SnapshotStore};
pub use timeline::{SessionTimeline, TimelineNode};
pub use types::*;
