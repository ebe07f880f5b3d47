use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use super::gateway::{ChatCompletion, ChatGateway, ChatPrompt, GatewayError, ModelSettings, complete};

pub const BUSY_MESSAGE: &str =
    "I'm receiving too many requests right now. Please try again in a little while.";
pub const UNAVAILABLE_MESSAGE: &str =
    "The assistant is temporarily unavailable. Please try again later.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    pub primary: ModelSettings,
    pub fallback: ModelSettings,
    pub backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    Primary,
    Fallback1,
    Exhausted,
}

impl FallbackState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback1 => "fallback_1",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTermination {
    Answered,
    Busy,
    Unavailable,
    UnexpectedError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    pub text: String,
    pub termination: FallbackTermination,
    pub final_state: FallbackState,
    pub attempted_models: Vec<String>,
}

/// Per-request tiered model selection. No state survives between calls to
/// [`FallbackPolicy::respond`].
#[derive(Clone)]
pub struct FallbackPolicy {
    gateway: Arc<dyn ChatGateway>,
    config: FallbackConfig,
}

impl FallbackPolicy {
    pub fn new(gateway: Arc<dyn ChatGateway>, config: FallbackConfig) -> Self {
        Self { gateway, config }
    }

    pub async fn respond(&self, prompt: &ChatPrompt) -> FallbackOutcome {
        let mut state = FallbackState::Primary;
        let mut attempted_models = Vec::with_capacity(2);

        loop {
            match state {
                FallbackState::Primary => {
                    let settings = &self.config.primary;
                    attempted_models.push(settings.model.clone());
                    match complete(self.gateway.as_ref(), prompt, settings).await {
                        Ok(completion) => {
                            return answered(completion, state, attempted_models);
                        }
                        Err(GatewayError::RateLimited) => {
                            warn!(
                                model = %settings.model,
                                backoff_ms = self.config.backoff.as_millis() as u64,
                                "primary model rate limited; backing off before fallback"
                            );
                            sleep(self.config.backoff).await;
                            state = FallbackState::Fallback1;
                        }
                        Err(GatewayError::Unavailable) => {
                            warn!(model = %settings.model, "chat provider unavailable");
                            return terminal(
                                FallbackTermination::Unavailable,
                                state,
                                attempted_models,
                            );
                        }
                        Err(err) => {
                            error!(model = %settings.model, "chat provider request failed: {err}");
                            return terminal(
                                FallbackTermination::UnexpectedError,
                                state,
                                attempted_models,
                            );
                        }
                    }
                }
                FallbackState::Fallback1 => {
                    let settings = &self.config.fallback;
                    attempted_models.push(settings.model.clone());
                    match complete(self.gateway.as_ref(), prompt, settings).await {
                        Ok(completion) => {
                            return answered(completion, state, attempted_models);
                        }
                        Err(err) => {
                            warn!(model = %settings.model, "fallback model failed: {err}");
                            state = FallbackState::Exhausted;
                        }
                    }
                }
                FallbackState::Exhausted => {
                    return terminal(FallbackTermination::Busy, state, attempted_models);
                }
            }
        }
    }
}

fn answered(
    completion: ChatCompletion,
    state: FallbackState,
    attempted_models: Vec<String>,
) -> FallbackOutcome {
    let (prompt_tokens, completion_tokens) = completion
        .usage
        .as_ref()
        .map_or((None, None), |usage| {
            (Some(usage.prompt_tokens), Some(usage.completion_tokens))
        });
    info!(
        model = %completion.model,
        state = state.as_str(),
        attempts = attempted_models.len(),
        prompt_tokens = ?prompt_tokens,
        completion_tokens = ?completion_tokens,
        "chat completion succeeded"
    );
    FallbackOutcome {
        text: completion.content,
        termination: FallbackTermination::Answered,
        final_state: state,
        attempted_models,
    }
}

fn terminal(
    termination: FallbackTermination,
    state: FallbackState,
    attempted_models: Vec<String>,
) -> FallbackOutcome {
    let text = match termination {
        FallbackTermination::Busy => BUSY_MESSAGE,
        FallbackTermination::Unavailable => UNAVAILABLE_MESSAGE,
        FallbackTermination::UnexpectedError | FallbackTermination::Answered => {
            UNEXPECTED_ERROR_MESSAGE
        }
    };

    FallbackOutcome {
        text: text.to_string(),
        termination,
        final_state: state,
        attempted_models,
    }
}
