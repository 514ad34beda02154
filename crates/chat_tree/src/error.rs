use thiserror::Error;

use crate::node::NodeId;

/// Structural errors raised against the tree's contract.
///
/// Every variant indicates a caller bug or corrupted input, never an
/// expected runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Parent node not found: {0}")]
    OrphanParent(NodeId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid thread: {reason}")]
    InvalidThread { reason: String },

    #[error("Branch index {index} out of range for node {node_id} ({count} siblings)")]
    BranchOutOfRange {
        node_id: NodeId,
        index: usize,
        count: usize,
    },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Children of node {0} do not match the nodes that name it as parent")]
    InconsistentChildren(NodeId),

    #[error("Parent chain of node {0} contains a cycle")]
    CycleDetected(NodeId),
}

impl TreeError {
    pub(crate) fn invalid_thread(reason: impl Into<String>) -> Self {
        Self::InvalidThread {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
