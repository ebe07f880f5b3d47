use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompts::language_reminder;
use crate::conversation::{HistoryTurn, MessageRole};
use crate::language::ChatLanguage;

pub type GatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatCompletion, GatewayError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<MessageRole> for ChatRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Self::User,
            MessageRole::Assistant => Self::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

impl ModelMessage {
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Outbound chat-completions payload, serialized as-is onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelRequest {
    /// System prompt first, then history in stored order, then the current
    /// user turn carrying the language reminder.
    pub fn compose(prompt: &ChatPrompt, settings: &ModelSettings) -> Self {
        let mut messages = Vec::with_capacity(prompt.history.len() + 2);
        messages.push(ModelMessage::text(ChatRole::System, &prompt.system_prompt));
        messages.extend(
            prompt
                .history
                .iter()
                .map(|turn| ModelMessage::text(turn.role.into(), &turn.body)),
        );
        messages.push(ModelMessage::text(
            ChatRole::User,
            format!(
                "{}\n\n{}",
                prompt.current_turn,
                language_reminder(prompt.language)
            ),
        ));

        Self {
            model: settings.model.clone(),
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system_prompt: String,
    pub history: Vec<HistoryTurn>,
    pub current_turn: String,
    pub language: ChatLanguage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub model: String,
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("chat provider rate limited the request")]
    RateLimited,
    #[error("chat provider is temporarily unavailable")]
    Unavailable,
    #[error("chat provider request failed: status={status} code={code}")]
    Status { status: u16, code: String },
    #[error("chat provider request timed out")]
    Timeout,
    #[error("chat provider request failed: {0}")]
    Transport(String),
    #[error("chat provider returned an invalid payload: {0}")]
    InvalidPayload(String),
}

pub trait ChatGateway: Send + Sync {
    fn send<'a>(&'a self, request: ModelRequest) -> GatewayFuture<'a>;
}

pub async fn complete(
    gateway: &dyn ChatGateway,
    prompt: &ChatPrompt,
    settings: &ModelSettings,
) -> Result<ChatCompletion, GatewayError> {
    gateway.send(ModelRequest::compose(prompt, settings)).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatPrompt, ChatRole, ContentPart, ImageUrl, MessageContent, ModelMessage};
    use super::{ModelRequest, ModelSettings};
    use crate::conversation::{HistoryTurn, MessageRole};
    use crate::language::ChatLanguage;

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "primary-model".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    #[test]
    fn compose_orders_system_history_then_current_turn() {
        let prompt = ChatPrompt {
            system_prompt: "system".to_string(),
            history: vec![
                HistoryTurn {
                    role: MessageRole::User,
                    body: "first question".to_string(),
                },
                HistoryTurn {
                    role: MessageRole::Assistant,
                    body: "first answer".to_string(),
                },
            ],
            current_turn: "second question".to_string(),
            language: ChatLanguage::Hindi,
        };

        let request = ModelRequest::compose(&prompt, &settings());

        let roles = request
            .messages
            .iter()
            .map(|message| message.role)
            .collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert_eq!(request.messages[1], ModelMessage::text(ChatRole::User, "first question"));
        let MessageContent::Text(last) = &request.messages[3].content else {
            panic!("current turn should be plain text");
        };
        assert!(last.starts_with("second question"));
        assert!(last.contains("Hindi"));
        assert_eq!(request.model, "primary-model");
        assert_eq!(request.max_tokens, 1024);
    }

    #[test]
    fn serializes_to_chat_completions_shape() {
        let request = ModelRequest {
            model: "vision-model".to_string(),
            messages: vec![ModelMessage {
                role: ChatRole::User,
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: "read this".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/png;base64,AAAA".to_string(),
                        },
                    },
                ]),
            }],
            temperature: 0.0,
            max_tokens: 256,
        };

        let value = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(
            value["messages"][0],
            json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": "read this" },
                    { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }
                ]
            })
        );
        assert_eq!(value["model"], "vision-model");
        assert_eq!(value["max_tokens"], 256);
    }
}
