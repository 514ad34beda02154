use chat_tree::{check_thread, Node, NodeId, NodeStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to reopen a conversation: every node plus the thread
/// that was visible. The on-disk format is left to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSnapshot {
    pub conversation_id: Uuid,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub active_thread: Vec<NodeId>,
}

impl ConversationSnapshot {
    /// Rebuild and validate the store and thread.
    pub(crate) fn into_parts(self) -> chat_tree::Result<(Uuid, NodeStore, Vec<NodeId>)> {
        let store = NodeStore::from_nodes(self.nodes)?;
        check_thread(&store, &self.active_thread)?;
        Ok((self.conversation_id, store, self.active_thread))
    }
}
