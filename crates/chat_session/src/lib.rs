//! chat_session - Conversation controller for branching chats
//!
//! The controller is the single owner of a conversation's node store and
//! active thread. It appends user turns, asks a `ResponseGenerator` for the
//! assistant's answer and moves the active thread as branches are created or
//! selected.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod generator;
pub mod snapshot;

pub use config::{ConfigError, ConversationConfig, SelectionPolicy};
pub use controller::{ConversationController, ResponseOutcome};
pub use error::{ConversationError, GenerationError, Result};
pub use events::ConversationEvent;
pub use generator::{GeneratedResponse, PromptTurn, ResponseGenerator};
pub use snapshot::ConversationSnapshot;

pub use chat_tree::{BranchInfo, Node, NodeId, Role, TreeError, Turn};
