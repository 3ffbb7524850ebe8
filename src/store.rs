//! Content-addressed snapshot store
//!
//! ## Overview
//!
//! The store is the durable half of the engine. It persists four kinds of
//! document per session, all rooted under the session's timeline directory:
//!
//! ```text
//! <root>/.timelines/<session_id>/
//! ├── timeline.json                      # the whole tree, rewritten per mutation
//! ├── checkpoints/
//! │   └── <checkpoint_id>/
//! │       ├── metadata.json              # the Checkpoint document
//! │       └── messages.jsonl.lz4         # compressed transcript log
//! └── files/
//!     ├── content_pool/
//!     │   └── <sha256-hex>               # compressed content, one blob per hash
//!     └── refs/
//!         └── <checkpoint_id>/
//!             └── <escaped-path>.json    # per-file reference document
//! ```
//!
//! ## Content addressing
//!
//! File content lives in the pool keyed by the SHA-256 of its bytes. A pool
//! write is skipped entirely when the blob already exists, which makes
//! writes idempotent and gives deduplication by construction: any number of
//! checkpoints referencing the same hash share one blob. Reference
//! documents carry the per-checkpoint view (path, hash, deletion flag,
//! permissions, size) and never duplicate content.
//!
//! Blobs are immutable once written. Nothing here garbage-collects the
//! pool; deleting every referencing checkpoint leaves the blob behind.

use crate::compression::CompressionEngine;
use crate::error::{Result, RewindError};
use crate::timeline::SessionTimeline;
use crate::types::{Checkpoint, CheckpointResult, FileSnapshot};
use crate::utils::{atomic_write, escape_ref_name};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Filename of the compressed per-checkpoint message log
const MESSAGES_FILE: &str = "messages.jsonl.lz4";

/// Resolved storage locations for one session
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    base: PathBuf,
}

impl CheckpointPaths {
    /// Resolve paths for a session under a project state root
    pub fn new(root: &Path, session_id: &str) -> Self {
        Self {
            base: root.join(".timelines").join(session_id),
        }
    }

    /// The timeline document
    pub fn timeline_file(&self) -> PathBuf {
        self.base.join("timeline.json")
    }

    /// Directory holding all checkpoint documents
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.base.join("checkpoints")
    }

    /// Directory for one checkpoint's documents
    pub fn checkpoint_dir(&self, checkpoint_id: &str) -> PathBuf {
        self.checkpoints_dir().join(checkpoint_id)
    }

    /// Metadata document for one checkpoint
    pub fn metadata_file(&self, checkpoint_id: &str) -> PathBuf {
        self.checkpoint_dir(checkpoint_id).join("metadata.json")
    }

    /// Compressed message log for one checkpoint
    pub fn messages_file(&self, checkpoint_id: &str) -> PathBuf {
        self.checkpoint_dir(checkpoint_id).join(MESSAGES_FILE)
    }

    /// Directory holding the content pool and reference documents
    pub fn files_dir(&self) -> PathBuf {
        self.base.join("files")
    }

    /// The shared content pool
    pub fn content_pool_dir(&self) -> PathBuf {
        self.files_dir().join("content_pool")
    }

    /// Pool location of a content blob
    pub fn blob_path(&self, hash: &str) -> PathBuf {
        self.content_pool_dir().join(hash)
    }

    /// Directory of one checkpoint's file references
    pub fn refs_dir(&self, checkpoint_id: &str) -> PathBuf {
        self.files_dir().join("refs").join(checkpoint_id)
    }
}

/// On-disk reference document linking a checkpoint to a pooled blob
#[derive(Debug, Serialize, Deserialize)]
struct FileRef {
    path: String,
    hash: String,
    is_deleted: bool,
    permissions: Option<u32>,
    size: u64,
}

/// Durable, deduplicated, compressed persistence for one session
///
/// The store itself is stateless between calls; all state lives on disk.
/// Operations are synchronous and run on the calling thread. Pool writes
/// are idempotent for the same hash, which is what makes them safe under
/// concurrent writers of identical content.
#[derive(Debug)]
pub struct SnapshotStore {
    paths: CheckpointPaths,
    compression: CompressionEngine,
}

impl SnapshotStore {
    /// Open (and initialize if needed) the store for one session
    ///
    /// Creates the directory skeleton on first use. An existing layout is
    /// left untouched.
    pub fn open(root: &Path, session_id: &str) -> Result<Self> {
        let paths = CheckpointPaths::new(root, session_id);
        fs::create_dir_all(paths.checkpoints_dir())?;
        fs::create_dir_all(paths.content_pool_dir())?;
        fs::create_dir_all(paths.files_dir().join("refs"))?;

        info!(session = session_id, base = ?paths.base, "opened snapshot store");
        Ok(Self {
            paths,
            compression: CompressionEngine::default(),
        })
    }

    /// Storage locations used by this store
    pub fn paths(&self) -> &CheckpointPaths {
        &self.paths
    }

    /// Persist a checkpoint: metadata, message log, snapshots, timeline
    ///
    /// Per-file snapshot failures are collected as warnings and do not
    /// abort the checkpoint; the metadata, the message log, and the
    /// timeline update are committed regardless. The timeline node is
    /// inserted here so the on-disk tree can never reference a checkpoint
    /// that was not written.
    pub fn save_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        snapshots: &[FileSnapshot],
        messages: &str,
        timeline: &mut SessionTimeline,
    ) -> Result<CheckpointResult> {
        let checkpoint_dir = self.paths.checkpoint_dir(&checkpoint.id);
        fs::create_dir_all(&checkpoint_dir)?;

        let metadata_json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(self.paths.metadata_file(&checkpoint.id), metadata_json)?;

        let compressed_messages = self.compression.compress(messages.as_bytes());
        fs::write(self.paths.messages_file(&checkpoint.id), compressed_messages)?;

        let mut warnings = Vec::new();
        let mut files_processed = 0;
        for snapshot in snapshots {
            match self.save_file_snapshot(snapshot) {
                Ok(()) => files_processed += 1,
                Err(e) => warnings.push(format!("Failed to save {}: {}", snapshot.file_path, e)),
            }
        }

        let hashes = snapshots.iter().map(|s| s.hash.clone()).collect();
        timeline.insert(checkpoint.clone(), hashes);
        self.save_timeline(timeline)?;

        debug!(
            checkpoint = checkpoint.short_id(),
            files = files_processed,
            warnings = warnings.len(),
            "saved checkpoint"
        );

        Ok(CheckpointResult {
            checkpoint: checkpoint.clone(),
            files_processed,
            warnings,
        })
    }

    /// Persist one file snapshot: pool blob (deduplicated) plus reference
    fn save_file_snapshot(&self, snapshot: &FileSnapshot) -> Result<()> {
        // Tombstones carry no content; only the reference is written. The
        // blob for a live snapshot is skipped when its hash already sits in
        // the pool, which is the entire deduplication mechanism.
        if !snapshot.is_deleted {
            let blob = self.paths.blob_path(&snapshot.hash);
            if !blob.exists() {
                let compressed = self.compression.compress(&snapshot.content);
                fs::write(&blob, compressed)?;
                trace!(hash = &snapshot.hash[..8.min(snapshot.hash.len())], "wrote pool blob");
            }
        }

        let refs_dir = self.paths.refs_dir(&snapshot.checkpoint_id);
        fs::create_dir_all(&refs_dir)?;

        let reference = FileRef {
            path: snapshot.file_path.clone(),
            hash: snapshot.hash.clone(),
            is_deleted: snapshot.is_deleted,
            permissions: snapshot.permissions,
            size: snapshot.size,
        };
        let ref_path = refs_dir.join(format!("{}.json", escape_ref_name(&snapshot.file_path)));
        fs::write(ref_path, serde_json::to_string_pretty(&reference)?)?;

        Ok(())
    }

    /// Load a checkpoint's metadata document
    pub fn load_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        let metadata_path = self.paths.metadata_file(checkpoint_id);
        if !metadata_path.exists() {
            return Err(RewindError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let metadata_json = fs::read_to_string(metadata_path)?;
        Ok(serde_json::from_str(&metadata_json)?)
    }

    /// Whether a checkpoint's metadata document exists
    pub fn checkpoint_exists(&self, checkpoint_id: &str) -> bool {
        self.paths.metadata_file(checkpoint_id).exists()
    }

    /// Load every file snapshot of a checkpoint, content included
    ///
    /// Reference documents that fail to parse are skipped with a warning;
    /// a missing pool blob for a live snapshot is an error, because a
    /// restore built from that set would silently lose a file.
    pub fn load_file_snapshots(&self, checkpoint_id: &str) -> Result<Vec<FileSnapshot>> {
        let refs_dir = self.paths.refs_dir(checkpoint_id);
        if !refs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&refs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let reference: FileRef = match fs::read_to_string(&path)
                .map_err(RewindError::from)
                .and_then(|raw| Ok(serde_json::from_str(&raw)?))
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(reference = ?path, error = %e, "skipping unreadable file reference");
                    continue;
                }
            };

            let content = if reference.is_deleted {
                Vec::new()
            } else {
                self.load_blob(&reference.hash)?
            };

            snapshots.push(FileSnapshot {
                checkpoint_id: checkpoint_id.to_string(),
                file_path: reference.path,
                content,
                hash: reference.hash,
                is_deleted: reference.is_deleted,
                permissions: reference.permissions,
                size: reference.size,
            });
        }

        Ok(snapshots)
    }

    /// Load and decompress a pooled content blob
    pub fn load_blob(&self, hash: &str) -> Result<Vec<u8>> {
        let blob = self.paths.blob_path(hash);
        if !blob.exists() {
            return Err(RewindError::ObjectNotFound(hash.to_string()));
        }
        let compressed = fs::read(blob)?;
        self.compression.decompress(&compressed)
    }

    /// Whether the pool holds a blob for this hash
    pub fn blob_exists(&self, hash: &str) -> bool {
        self.paths.blob_path(hash).exists()
    }

    /// Load and decompress a checkpoint's message log
    pub fn load_messages(&self, checkpoint_id: &str) -> Result<String> {
        let messages_path = self.paths.messages_file(checkpoint_id);
        if !messages_path.exists() {
            return Err(RewindError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let compressed = fs::read(messages_path)?;
        let raw = self.compression.decompress(&compressed)?;
        String::from_utf8(raw)
            .map_err(|e| RewindError::storage(format!("message log is not UTF-8: {e}")))
    }

    /// Rewrite the timeline document
    pub fn save_timeline(&self, timeline: &SessionTimeline) -> Result<()> {
        let json = serde_json::to_string_pretty(timeline)?;
        atomic_write(&self.paths.timeline_file(), json.as_bytes())
    }

    /// Load the timeline, recovering from a missing or corrupt document
    ///
    /// A missing document yields a fresh empty timeline. A document that
    /// fails to parse also yields a fresh timeline, but the unreadable
    /// bytes are renamed aside with a `.corrupt` suffix and a warning is
    /// logged; prior history is lost to the engine but the evidence is
    /// kept on disk.
    pub fn load_or_init_timeline(&self, session_id: &str) -> SessionTimeline {
        let timeline_file = self.paths.timeline_file();
        if !timeline_file.exists() {
            return SessionTimeline::new(session_id);
        }

        match fs::read_to_string(&timeline_file)
            .map_err(RewindError::from)
            .and_then(|raw| {
                serde_json::from_str::<SessionTimeline>(&raw)
                    .map_err(|e| RewindError::CorruptTimeline(e.to_string()))
            }) {
            Ok(timeline) => timeline,
            Err(e) => {
                let aside = timeline_file.with_extension("json.corrupt");
                warn!(
                    session = session_id,
                    error = %e,
                    aside = ?aside,
                    "timeline document unreadable, starting a fresh timeline"
                );
                if let Err(rename_err) = fs::rename(&timeline_file, &aside) {
                    warn!(error = %rename_err, "could not preserve corrupt timeline document");
                }
                SessionTimeline::new(session_id)
            }
        }
    }
}
