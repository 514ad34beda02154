use std::time::Duration;

use chat_tree::{NodeId, TreeError};
use thiserror::Error;

/// Failure reported by a response generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Node {0} is not a user message")]
    NotAUserNode(NodeId),

    #[error("Message content cannot be empty")]
    EmptyMessage,

    #[error("Response generation failed for {prompt_node_id}: {source}")]
    GenerationFailure {
        prompt_node_id: NodeId,
        #[source]
        source: GenerationError,
    },

    #[error("Response generation cancelled for {prompt_node_id}")]
    Cancelled { prompt_node_id: NodeId },
}

impl ConversationError {
    /// The user node that was kept when generation failed or was cancelled.
    pub fn prompt_node_id(&self) -> Option<NodeId> {
        match self {
            Self::GenerationFailure { prompt_node_id, .. } | Self::Cancelled { prompt_node_id } => {
                Some(*prompt_node_id)
            }
            _ => None,
        }
    }

    /// Structural errors are caller bugs; generation problems are expected.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Tree(_) | Self::NotAUserNode(_))
    }
}

pub type Result<T> = std::result::Result<T, ConversationError>;
