//! chat_tree - Branching conversation tree
//!
//! A conversation is stored as a tree of immutable message nodes rather than
//! a flat transcript. Regenerating an answer or resending an edited prompt
//! adds a sibling node; nothing is ever removed.
//!
//! - `node` - Node, Turn and identifier types
//! - `store` - append-only NodeStore that owns every node
//! - `navigator` - pure path and branch computations over a store
//! - `error` - TreeError

pub mod error;
pub mod navigator;
pub mod node;
pub mod store;

pub use error::{Result, TreeError};
pub use navigator::{
    branch_index, branch_info, check_thread, has_siblings, history, path_to_root, sibling_at,
    sibling_count, validate_thread, BranchInfo,
};
pub use node::{Node, NodeId, Role, Turn};
pub use store::NodeStore;
