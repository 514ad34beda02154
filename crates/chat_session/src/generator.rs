use async_trait::async_trait;
use chat_tree::{Role, Turn};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// One prior turn handed to a generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl From<&Turn> for PromptTurn {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role(),
            text: turn.text().to_string(),
            model: turn.model().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub text: String,
    /// Model that actually produced the answer.
    pub model: String,
}

impl GeneratedResponse {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce the next assistant turn.
    ///
    /// # Arguments
    /// * `turns` - Full root-to-tip history, oldest first
    /// * `model` - Optional model override. If None, the generator picks its default
    async fn generate(
        &self,
        turns: &[PromptTurn],
        model: Option<&str>,
    ) -> Result<GeneratedResponse, GenerationError>;
}
