use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::fallback::FallbackConfig;
use super::gateway::{
    ChatCompletion, ChatGateway, GatewayError, GatewayFuture, ModelRequest, ModelSettings,
    TokenUsage,
};
use crate::config::ConfigError;
use crate::config_env::{
    http_url_env, optional_trimmed_env, parse_f32_env, parse_u32_env, parse_u64_env,
    require_non_empty_env,
};

const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_FALLBACK_BACKOFF_MS: u64 = 1_000;

const DEFAULT_PRIMARY_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_FALLBACK_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

#[derive(Debug, Clone)]
pub struct GroqModelRoute {
    pub primary_model: String,
    pub fallback_model: String,
    pub vision_model: String,
}

#[derive(Debug, Clone)]
pub struct GroqGatewayConfig {
    pub chat_completions_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub fallback_backoff_ms: u64,
    pub model_route: GroqModelRoute,
}

impl GroqGatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let temperature = parse_f32_env("GROQ_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidConfiguration(
                "GROQ_TEMPERATURE must be between 0 and 2".to_string(),
            ));
        }
        let max_tokens = parse_u32_env("GROQ_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;
        if max_tokens == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "GROQ_MAX_TOKENS must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            chat_completions_url: http_url_env(
                "GROQ_CHAT_COMPLETIONS_URL",
                DEFAULT_CHAT_COMPLETIONS_URL,
            )?,
            api_key: require_non_empty_env("GROQ_API_KEY")?,
            timeout_ms: parse_u64_env("GROQ_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            temperature,
            max_tokens,
            fallback_backoff_ms: parse_u64_env(
                "GROQ_FALLBACK_BACKOFF_MS",
                DEFAULT_FALLBACK_BACKOFF_MS,
            )?,
            model_route: GroqModelRoute {
                primary_model: optional_trimmed_env("GROQ_MODEL_PRIMARY")
                    .unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
                fallback_model: optional_trimmed_env("GROQ_MODEL_FALLBACK")
                    .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
                vision_model: optional_trimmed_env("GROQ_MODEL_VISION")
                    .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            },
        })
    }

    pub fn fallback_config(&self) -> FallbackConfig {
        let settings_for = |model: &str| ModelSettings {
            model: model.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        FallbackConfig {
            primary: settings_for(&self.model_route.primary_model),
            fallback: settings_for(&self.model_route.fallback_model),
            backoff: Duration::from_millis(self.fallback_backoff_ms),
        }
    }

    /// Image transcription wants verbatim text, so sampling is pinned to 0.
    pub fn vision_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model_route.vision_model.clone(),
            temperature: 0.0,
            max_tokens: self.max_tokens,
        }
    }
}

/// OpenAI-compatible chat-completions client. One request per `send`; retry
/// and model selection live in the fallback policy.
#[derive(Clone)]
pub struct GroqGateway {
    client: reqwest::Client,
    config: GroqGatewayConfig,
}

impl GroqGateway {
    pub fn new(config: GroqGatewayConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn send_once(&self, request: &ModelRequest) -> Result<ChatCompletion, GatewayError> {
        let response = self
            .client
            .post(&self.config.chat_completions_url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport("request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|_| GatewayError::InvalidPayload("response_body_read_failed".to_string()))?;

        if !status.is_success() {
            let provider_code = parse_provider_error_code(&body);
            warn!(
                model = %request.model,
                status = status.as_u16(),
                provider_code = %provider_code,
                "chat provider returned an error status"
            );
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
                StatusCode::SERVICE_UNAVAILABLE => GatewayError::Unavailable,
                _ => GatewayError::Status {
                    status: status.as_u16(),
                    code: provider_code,
                },
            });
        }

        let parsed: ChatCompletionsResponse = serde_json::from_str(&body)
            .map_err(|_| GatewayError::InvalidPayload("response_json_parse_failed".to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::InvalidPayload("missing_choice".to_string()))?
            .message
            .content
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GatewayError::InvalidPayload("empty_content".to_string()))?;

        Ok(ChatCompletion {
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            content,
            usage: parsed.usage.map(|usage| TokenUsage {
                prompt_tokens: clamp_u64_to_u32(usage.prompt_tokens.unwrap_or(0)),
                completion_tokens: clamp_u64_to_u32(usage.completion_tokens.unwrap_or(0)),
                total_tokens: clamp_u64_to_u32(usage.total_tokens.unwrap_or(0)),
            }),
        })
    }
}

impl ChatGateway for GroqGateway {
    fn send<'a>(&'a self, request: ModelRequest) -> GatewayFuture<'a> {
        Box::pin(async move { self.send_once(&request).await })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    model: Option<String>,
    choices: Vec<ChatCompletionsChoice>,
    usage: Option<ChatCompletionsUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChoice {
    message: ChatCompletionsMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn parse_provider_error_code(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorDetails {
        code: Option<Value>,
        #[serde(rename = "type")]
        kind: Option<Value>,
    }

    let Some(details) = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
    else {
        return "unknown".to_string();
    };

    match details.code.or(details.kind) {
        Some(Value::String(code)) => code,
        Some(Value::Number(code)) => code.to_string(),
        _ => "unknown".to_string(),
    }
}

fn clamp_u64_to_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}
