use async_trait::async_trait;
use chat_session::{GeneratedResponse, GenerationError, PromptTurn, ResponseGenerator, Role};

/// Offline generator that answers by quoting the latest user turn.
pub struct EchoGenerator {
    default_model: String,
}

impl EchoGenerator {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(
        &self,
        turns: &[PromptTurn],
        model: Option<&str>,
    ) -> Result<GeneratedResponse, GenerationError> {
        let question = turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .ok_or_else(|| GenerationError::Provider("no user turn to answer".to_string()))?;
        let earlier_answers = turns
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .count();

        Ok(GeneratedResponse::new(
            format!(
                "You said \"{}\" ({} earlier answers in this thread)",
                question.text, earlier_answers
            ),
            model.unwrap_or(&self.default_model),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, text: &str) -> PromptTurn {
        PromptTurn {
            role,
            text: text.to_string(),
            model: None,
        }
    }

    #[tokio::test]
    async fn quotes_latest_user_turn() {
        let generator = EchoGenerator::new("echo");
        let response = generator
            .generate(
                &[
                    turn(Role::User, "first"),
                    turn(Role::Assistant, "reply"),
                    turn(Role::User, "second"),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            response.text,
            "You said \"second\" (1 earlier answers in this thread)"
        );
        assert_eq!(response.model, "echo");
    }

    #[tokio::test]
    async fn fails_without_user_turn() {
        let generator = EchoGenerator::new("echo");
        let err = generator
            .generate(&[turn(Role::System, "rules")], Some("other"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
    }
}
