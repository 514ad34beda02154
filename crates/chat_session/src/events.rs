use chat_tree::{NodeId, Role};
use serde::{Deserialize, Serialize};

/// Notifications for a UI that renders the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    NodeCreated {
        node_id: NodeId,
        parent_id: Option<NodeId>,
        role: Role,
    },

    /// `version` increases with every change; a receiver that sees a lower
    /// version than the last one applied can drop the event.
    ActiveThreadChanged {
        thread: Vec<NodeId>,
        version: u64,
    },

    GenerationStarted {
        prompt_node_id: NodeId,
    },

    GenerationFailed {
        prompt_node_id: NodeId,
        message: String,
    },

    GenerationCancelled {
        prompt_node_id: NodeId,
    },

    /// Emitted when a completed answer was stored without becoming the tip
    ResponseNotSelected {
        node_id: NodeId,
    },
}
