//! Node - a single turn in the conversation tree
//!
//! Nodes are created once by the store and never rewritten. The only field
//! that grows after creation is `children_ids`, and only the store touches it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque node identifier, unique for the lifetime of a store.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub(crate) fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for NodeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

/// The content of a node. Exactly one kind of turn per node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Turn {
    System { text: String },
    User { text: String },
    Assistant { text: String, model: String },
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            model: model.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::System { text } | Self::User { text } | Self::Assistant { text, .. } => text,
        }
    }

    /// Model that produced the turn; only assistant turns carry one.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Assistant { model, .. } => Some(model),
            _ => None,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Node {
    id: NodeId,
    parent_id: Option<NodeId>,
    /// Children in creation order.
    #[serde(default)]
    children_ids: Vec<NodeId>,
    turn: Turn,
    created_at: DateTime<Utc>,
}

impl Node {
    pub(crate) fn new(id: NodeId, parent_id: Option<NodeId>, turn: Turn) -> Self {
        Self {
            id,
            parent_id,
            children_ids: Vec::new(),
            turn,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn children_ids(&self) -> &[NodeId] {
        &self.children_ids
    }

    pub fn turn(&self) -> &Turn {
        &self.turn
    }

    pub fn role(&self) -> Role {
        self.turn.role()
    }

    pub fn text(&self) -> &str {
        self.turn.text()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children_ids.push(child);
    }

    #[cfg(test)]
    pub(crate) fn clear_children(&mut self) {
        self.children_ids.clear();
    }
}
