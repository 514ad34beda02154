//! Thread navigation over a `NodeStore`
//!
//! Every function here is read-only. Paths are rebuilt from parent pointers,
//! branch metadata from the parent's ordered child list.
//!
//! Root nodes form a branch group of one: independent conversations hosted by
//! the same store are never presented as siblings of each other.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};
use crate::node::{NodeId, Turn};
use crate::store::NodeStore;

/// Branch-switcher metadata for a single node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BranchInfo {
    pub node_id: NodeId,
    pub sibling_count: usize,
    /// 0-based position among siblings, in creation order.
    pub branch_index: usize,
    pub has_siblings: bool,
    /// The whole sibling group including `node_id`, in creation order.
    pub sibling_ids: Vec<NodeId>,
}

/// Walk parent pointers from `id` and return `[root, ..., id]`.
pub fn path_to_root(store: &NodeStore, id: NodeId) -> Result<Vec<NodeId>> {
    let mut path = Vec::new();
    let mut current = Some(id);
    while let Some(node_id) = current {
        let node = store.get(node_id)?;
        path.push(node_id);
        // Parent chains are acyclic, so this only trips on a corrupted store.
        if path.len() > store.len() {
            return Err(TreeError::CycleDetected(id));
        }
        current = node.parent_id();
    }
    path.reverse();
    Ok(path)
}

fn sibling_group(store: &NodeStore, id: NodeId) -> Result<Vec<NodeId>> {
    let node = store.get(id)?;
    match node.parent_id() {
        Some(parent) => Ok(store.children(parent)?.to_vec()),
        None => Ok(vec![id]),
    }
}

pub fn sibling_count(store: &NodeStore, id: NodeId) -> Result<usize> {
    let node = store.get(id)?;
    match node.parent_id() {
        Some(parent) => Ok(store.children(parent)?.len()),
        None => Ok(1),
    }
}

pub fn branch_index(store: &NodeStore, id: NodeId) -> Result<usize> {
    let node = store.get(id)?;
    let Some(parent) = node.parent_id() else {
        return Ok(0);
    };
    store
        .children(parent)?
        .iter()
        .position(|child| *child == id)
        .ok_or(TreeError::InconsistentChildren(parent))
}

pub fn has_siblings(store: &NodeStore, id: NodeId) -> Result<bool> {
    Ok(sibling_count(store, id)? > 1)
}

pub fn branch_info(store: &NodeStore, id: NodeId) -> Result<BranchInfo> {
    let sibling_ids = sibling_group(store, id)?;
    let branch_index = branch_index(store, id)?;
    Ok(BranchInfo {
        node_id: id,
        sibling_count: sibling_ids.len(),
        branch_index,
        has_siblings: sibling_ids.len() > 1,
        sibling_ids,
    })
}

/// The sibling of `id` at position `index` within its branch group.
pub fn sibling_at(store: &NodeStore, id: NodeId, index: usize) -> Result<NodeId> {
    let group = sibling_group(store, id)?;
    group
        .get(index)
        .copied()
        .ok_or(TreeError::BranchOutOfRange {
            node_id: id,
            index,
            count: group.len(),
        })
}

/// Check that `thread` is a root-to-leaf walk along child pointers.
///
/// The empty thread is valid.
pub fn check_thread(store: &NodeStore, thread: &[NodeId]) -> Result<()> {
    let Some(first) = thread.first() else {
        return Ok(());
    };

    let root = store
        .get(*first)
        .map_err(|_| TreeError::invalid_thread(format!("unknown node {first}")))?;
    if !root.is_root() {
        return Err(TreeError::invalid_thread(format!(
            "first node {first} is not a root"
        )));
    }

    for pair in thread.windows(2) {
        let (parent, child) = (pair[0], pair[1]);
        let parent_node = store
            .get(parent)
            .map_err(|_| TreeError::invalid_thread(format!("unknown node {parent}")))?;
        if !parent_node.children_ids().contains(&child) {
            return Err(TreeError::invalid_thread(format!(
                "{child} is not a child of {parent}"
            )));
        }
    }

    Ok(())
}

pub fn validate_thread(store: &NodeStore, thread: &[NodeId]) -> bool {
    check_thread(store, thread).is_ok()
}

/// Turns along `path` in order, as handed to a response generator.
pub fn history<'a>(store: &'a NodeStore, path: &[NodeId]) -> Result<Vec<&'a Turn>> {
    path.iter()
        .map(|id| store.get(*id).map(|node| node.turn()))
        .collect()
}
