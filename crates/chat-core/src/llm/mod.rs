pub mod fallback;
pub mod gateway;
pub mod groq;
pub mod prompts;

pub use fallback::{
    BUSY_MESSAGE, FallbackConfig, FallbackOutcome, FallbackPolicy, FallbackState,
    FallbackTermination, UNAVAILABLE_MESSAGE, UNEXPECTED_ERROR_MESSAGE,
};
pub use gateway::{
    ChatCompletion, ChatGateway, ChatPrompt, ChatRole, ContentPart, GatewayError, GatewayFuture,
    ImageUrl, MessageContent, ModelMessage, ModelRequest, ModelSettings, TokenUsage, complete,
};
pub use groq::{GroqGateway, GroqGatewayConfig, GroqModelRoute};
pub use prompts::{extract_follow_up_questions, language_reminder, system_prompt};
