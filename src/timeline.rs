//! Branching timeline tree for one session
//!
//! ## Overview
//!
//! A session's checkpoints form a multiway tree rooted at the first
//! checkpoint ever created. Insertion is the only structural transition:
//! the first checkpoint becomes the root, and later checkpoints attach as
//! children of their resolved parent. When no parent is given, or the given
//! parent cannot be found, the new node attaches under the root rather than
//! the current leaf. Callers that want a meaningful branch must therefore
//! pass the true parent explicitly; an unresolvable parent is never
//! silently dropped.
//!
//! Lookup is a recursive depth-first search with no index. Per-session
//! checkpoint counts are small, so the linear walk is acceptable; an
//! id-indexed arena would be the upgrade path if that assumption breaks.
//!
//! The timeline is persisted as a single JSON document, fully rewritten on
//! every mutation.

use crate::types::{Checkpoint, CheckpointSettings, CheckpointStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A node in the timeline tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineNode {
    /// The checkpoint held by this node
    pub checkpoint: Checkpoint,
    /// Child nodes in insertion order
    pub children: Vec<TimelineNode>,
    /// Content hashes of this checkpoint's file snapshots
    pub file_snapshot_hashes: Vec<String>,
}

/// The complete timeline of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeline {
    /// Session this timeline belongs to
    pub session_id: String,
    /// Root of the checkpoint tree (None until the first checkpoint)
    pub root_node: Option<TimelineNode>,
    /// Checkpoint the working tree currently reflects
    pub current_checkpoint_id: Option<String>,
    /// Whether automatic checkpoint policy is active
    pub auto_checkpoint_enabled: bool,
    /// Strategy consulted when auto-checkpointing is enabled
    pub checkpoint_strategy: CheckpointStrategy,
    /// Total checkpoints ever inserted
    pub total_checkpoints: usize,
}

impl SessionTimeline {
    /// Create an empty timeline for a session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            root_node: None,
            current_checkpoint_id: None,
            auto_checkpoint_enabled: false,
            checkpoint_strategy: CheckpointStrategy::default(),
            total_checkpoints: 0,
        }
    }

    /// Insert a checkpoint into the tree
    ///
    /// Applies the attachment policy described in the module docs and
    /// updates `current_checkpoint_id` and `total_checkpoints`.
    pub fn insert(&mut self, checkpoint: Checkpoint, file_snapshot_hashes: Vec<String>) {
        let checkpoint_id = checkpoint.id.clone();
        let parent_id = checkpoint.parent_checkpoint_id.clone();
        let node = TimelineNode {
            checkpoint,
            children: Vec::new(),
            file_snapshot_hashes,
        };

        match self.root_node.as_mut() {
            None => {
                self.root_node = Some(node);
            }
            Some(root) => {
                let unattached = match parent_id.as_deref() {
                    Some(pid) => match find_in_tree_mut(root, pid) {
                        Some(parent) => {
                            parent.children.push(node);
                            None
                        }
                        None => {
                            debug!(
                                parent = pid,
                                checkpoint = %checkpoint_id,
                                "parent not found in timeline, attaching under root"
                            );
                            Some(node)
                        }
                    },
                    None => Some(node),
                };

                if let Some(node) = unattached {
                    root.children.push(node);
                }
            }
        }

        self.current_checkpoint_id = Some(checkpoint_id);
        self.total_checkpoints += 1;
    }

    /// Find the node holding a checkpoint id
    pub fn find_checkpoint(&self, checkpoint_id: &str) -> Option<&TimelineNode> {
        self.root_node
            .as_ref()
            .and_then(|root| find_in_tree(root, checkpoint_id))
    }

    /// All checkpoints in pre-order (parents before children)
    pub fn all_checkpoints(&self) -> Vec<&Checkpoint> {
        let mut checkpoints = Vec::with_capacity(self.total_checkpoints);
        if let Some(root) = &self.root_node {
            collect_pre_order(root, &mut checkpoints);
        }
        checkpoints
    }

    /// Auto-checkpoint settings stored with this timeline
    pub fn settings(&self) -> CheckpointSettings {
        CheckpointSettings {
            auto_checkpoint_enabled: self.auto_checkpoint_enabled,
            checkpoint_strategy: self.checkpoint_strategy,
        }
    }

    /// Replace the auto-checkpoint settings
    pub fn apply_settings(&mut self, settings: CheckpointSettings) {
        self.auto_checkpoint_enabled = settings.auto_checkpoint_enabled;
        self.checkpoint_strategy = settings.checkpoint_strategy;
    }
}

fn find_in_tree<'a>(node: &'a TimelineNode, checkpoint_id: &str) -> Option<&'a TimelineNode> {
    if node.checkpoint.id == checkpoint_id {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|child| find_in_tree(child, checkpoint_id))
}

fn find_in_tree_mut<'a>(
    node: &'a mut TimelineNode,
    checkpoint_id: &str,
) -> Option<&'a mut TimelineNode> {
    if node.checkpoint.id == checkpoint_id {
        return Some(node);
    }
    node.children
        .iter_mut()
        .find_map(|child| find_in_tree_mut(child, checkpoint_id))
}

fn collect_pre_order<'a>(node: &'a TimelineNode, out: &mut Vec<&'a Checkpoint>) {
    out.push(&node.checkpoint);
    for child in &node.children {
        collect_pre_order(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckpointMetadata;
    use chrono::Utc;

    fn test_checkpoint(id: &str, parent: Option<&str>) -> Checkpoint {
        Checkpoint {
            id: id.to_string(),
            session_id: "session".to_string(),
            project_id: "project".to_string(),
            message_index: 0,
            timestamp: Utc::now(),
            description: None,
            parent_checkpoint_id: parent.map(String::from),
            metadata: CheckpointMetadata::default(),
        }
    }

    #[test]
    fn test_first_insert_becomes_root() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec![]);

        assert_eq!(timeline.root_node.as_ref().unwrap().checkpoint.id, "c1");
        assert_eq!(timeline.current_checkpoint_id.as_deref(), Some("c1"));
        assert_eq!(timeline.total_checkpoints, 1);
    }

    #[test]
    fn test_insert_under_resolved_parent() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec![]);
        timeline.insert(test_checkpoint("c2", Some("c1")), vec![]);
        timeline.insert(test_checkpoint("c3", Some("c2")), vec![]);

        let c2 = timeline.find_checkpoint("c2").unwrap();
        assert_eq!(c2.children.len(), 1);
        assert_eq!(c2.children[0].checkpoint.id, "c3");
    }

    #[test]
    fn test_unresolved_parent_attaches_under_root() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec![]);
        timeline.insert(test_checkpoint("c2", Some("ghost")), vec![]);

        let root = timeline.root_node.as_ref().unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].checkpoint.id, "c2");
        // The stated parent is preserved on the checkpoint itself
        assert_eq!(
            root.children[0].checkpoint.parent_checkpoint_id.as_deref(),
            Some("ghost")
        );
    }

    #[test]
    fn test_missing_parent_attaches_under_root() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec![]);
        timeline.insert(test_checkpoint("c2", Some("c1")), vec![]);
        timeline.insert(test_checkpoint("c3", None), vec![]);

        let root = timeline.root_node.as_ref().unwrap();
        let top_level: Vec<_> = root.children.iter().map(|n| n.checkpoint.id.as_str()).collect();
        assert_eq!(top_level, vec!["c2", "c3"]);
    }

    #[test]
    fn test_find_returns_every_inserted_node() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec![]);
        timeline.insert(test_checkpoint("c2", Some("c1")), vec![]);
        timeline.insert(test_checkpoint("c3", Some("c1")), vec![]);
        timeline.insert(test_checkpoint("c4", Some("c3")), vec![]);

        for id in ["c1", "c2", "c3", "c4"] {
            assert_eq!(timeline.find_checkpoint(id).unwrap().checkpoint.id, id);
        }
        assert!(timeline.find_checkpoint("nope").is_none());
    }

    #[test]
    fn test_pre_order_traversal() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec![]);
        timeline.insert(test_checkpoint("c2", Some("c1")), vec![]);
        timeline.insert(test_checkpoint("c3", Some("c2")), vec![]);
        timeline.insert(test_checkpoint("c4", Some("c1")), vec![]);

        let order: Vec<_> = timeline.all_checkpoints().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["c1", "c2", "c3", "c4"]);
    }

    #[test]
    fn test_serde_round_trip_preserves_structure() {
        let mut timeline = SessionTimeline::new("session");
        timeline.insert(test_checkpoint("c1", None), vec!["hash1".to_string()]);
        timeline.insert(test_checkpoint("c2", Some("c1")), vec![]);

        let json = serde_json::to_string(&timeline).unwrap();
        assert!(json.contains("\"rootNode\""));
        assert!(json.contains("\"fileSnapshotHashes\""));

        let parsed: SessionTimeline = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_checkpoints, 2);
        assert_eq!(parsed.find_checkpoint("c2").unwrap().checkpoint.id, "c2");
    }
}
