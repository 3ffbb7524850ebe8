//! Explicit registry of per-session checkpoint managers
//!
//! ## Overview
//!
//! The registry owns the lifetime of one [`CheckpointManager`] per active
//! session. Managers are created lazily on first acquire and live until
//! released. There is no ambient global state; hosts construct a registry,
//! hold it, and pass handles around explicitly.
//!
//! The session map is a concurrent map, so acquiring managers for
//! different sessions never contends beyond the short lookup/creation
//! critical section. Mutual exclusion of operations on one session is the
//! manager's own job.
//!
//! ## Storage layout
//!
//! Session state is grouped per project under the registry's state root:
//!
//! ```text
//! <state_root>/projects/<project_id>/.timelines/<session_id>/...
//! ```

use crate::diff;
use crate::error::Result;
use crate::manager::CheckpointManager;
use crate::store::SnapshotStore;
use crate::types::CheckpointDiff;
use dashmap::{DashMap, Entry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns and hands out per-session checkpoint managers
#[derive(Debug)]
pub struct SessionRegistry {
    state_root: PathBuf,
    managers: DashMap<String, Arc<CheckpointManager>>,
}

impl SessionRegistry {
    /// Create a registry rooted at a state directory
    pub fn new(state_root: PathBuf) -> Self {
        Self {
            state_root,
            managers: DashMap::new(),
        }
    }

    /// Get the manager for a session, creating it on first use
    ///
    /// The returned handle stays valid even after [`release`]; releasing
    /// only drops the registry's own reference so the manager can be torn
    /// down once every caller is done with it.
    ///
    /// [`release`]: SessionRegistry::release
    pub fn acquire(
        &self,
        project_id: &str,
        session_id: &str,
        project_root: &Path,
    ) -> Result<Arc<CheckpointManager>> {
        if let Some(existing) = self.managers.get(session_id) {
            return Ok(existing.clone());
        }

        match self.managers.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let manager = Arc::new(CheckpointManager::new(
                    project_id,
                    session_id,
                    project_root.to_path_buf(),
                    &self.project_state_root(project_id),
                )?);
                entry.insert(manager.clone());
                info!(session = session_id, project = project_id, "created checkpoint manager");
                Ok(manager)
            }
        }
    }

    /// Drop the registry's handle for a session
    ///
    /// Returns whether a manager was registered. Persisted state is left
    /// untouched; a later [`acquire`] reloads it from disk.
    ///
    /// [`acquire`]: SessionRegistry::acquire
    pub fn release(&self, session_id: &str) -> bool {
        let removed = self.managers.remove(session_id).is_some();
        debug!(session = session_id, removed, "released checkpoint manager");
        removed
    }

    /// Session ids with a live manager
    pub fn active_sessions(&self) -> Vec<String> {
        self.managers.iter().map(|e| e.key().clone()).collect()
    }

    /// Diff two checkpoints of a session from persisted state
    ///
    /// Works without a live manager, so callers can diff historical
    /// sessions that were never acquired in this process.
    pub fn diff(
        &self,
        project_id: &str,
        session_id: &str,
        from_checkpoint_id: &str,
        to_checkpoint_id: &str,
    ) -> Result<CheckpointDiff> {
        let store = SnapshotStore::open(&self.project_state_root(project_id), session_id)?;
        diff::compute(&store, from_checkpoint_id, to_checkpoint_id)
    }

    fn project_state_root(&self, project_id: &str) -> PathBuf {
        self.state_root.join("projects").join(project_id)
    }
}
