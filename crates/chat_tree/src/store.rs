//! NodeStore - append-only owner of every node in a conversation tree
//!
//! The store keeps parent and child pointers consistent on every insertion.
//! It exposes no update or delete operations.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TreeError};
use crate::node::{Node, NodeId, Turn};

#[derive(Clone, Debug, Default)]
pub struct NodeStore {
    nodes: HashMap<NodeId, Node>,
    /// Insertion order, used for stable iteration.
    order: Vec<NodeId>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new node under `parent_id` (or as a root) and return its id.
    ///
    /// Fails with `OrphanParent` when the parent is not in the store. No field
    /// of an existing node is touched apart from the parent's child list.
    pub fn create_node(&mut self, parent_id: Option<NodeId>, turn: Turn) -> Result<NodeId> {
        if let Some(parent) = parent_id {
            if !self.nodes.contains_key(&parent) {
                return Err(TreeError::OrphanParent(parent));
            }
        }

        let mut id = NodeId::new_v4();
        while self.nodes.contains_key(&id) {
            id = NodeId::new_v4();
        }

        let role = turn.role();
        self.nodes.insert(id, Node::new(id, parent_id, turn));
        self.order.push(id);

        if let Some(parent) = parent_id {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.push_child(id);
            }
        }

        tracing::debug!(
            node_id = %id,
            parent_id = ?parent_id,
            role = %role,
            pool_size = self.nodes.len(),
            "NodeStore: node created"
        );

        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        self.get(id).map(Node::children_ids)
    }

    /// Root nodes in insertion order. Each root starts an independent conversation.
    pub fn roots(&self) -> impl Iterator<Item = &Node> + '_ {
        self.iter().filter(|node| node.is_root())
    }

    /// All nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Consume the store, yielding nodes in insertion order.
    pub fn into_nodes(mut self) -> Vec<Node> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.remove(id))
            .collect()
    }

    /// Rebuild a store from previously persisted nodes.
    ///
    /// Each node's `children_ids` must list exactly the nodes that name it as
    /// parent; the persisted order is kept as creation order. Parent chains
    /// must end at a root.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Result<Self> {
        let mut store = Self::new();
        for node in nodes {
            let id = node.id();
            if store.nodes.insert(id, node).is_some() {
                return Err(TreeError::DuplicateNode(id));
            }
            store.order.push(id);
        }

        let mut named_by_children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for id in &store.order {
            let node = &store.nodes[id];
            if let Some(parent) = node.parent_id() {
                if !store.nodes.contains_key(&parent) {
                    return Err(TreeError::OrphanParent(parent));
                }
                named_by_children.entry(parent).or_default().push(*id);
            }
        }

        for id in &store.order {
            let listed = store.nodes[id].children_ids();
            let expected = named_by_children.get(id).map(Vec::as_slice).unwrap_or(&[]);
            let listed_set: HashSet<_> = listed.iter().collect();
            let expected_set: HashSet<_> = expected.iter().collect();
            if listed.len() != expected.len()
                || listed_set.len() != listed.len()
                || listed_set != expected_set
            {
                return Err(TreeError::InconsistentChildren(*id));
            }
        }

        store.check_acyclic()?;

        tracing::debug!(pool_size = store.len(), "NodeStore: restored from persisted nodes");
        Ok(store)
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut reaches_root: HashSet<NodeId> = HashSet::new();
        for start in &self.order {
            let mut visited = Vec::new();
            let mut current = Some(*start);
            while let Some(id) = current {
                if reaches_root.contains(&id) {
                    break;
                }
                if visited.len() > self.nodes.len() {
                    return Err(TreeError::CycleDetected(*start));
                }
                visited.push(id);
                current = self.nodes[&id].parent_id();
            }
            reaches_root.extend(visited);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn clear_children_for_test(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.clear_children();
        }
    }
}
