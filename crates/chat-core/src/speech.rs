use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::ConfigError;
use crate::config_env::{http_url_env, optional_trimmed_env, parse_u64_env, require_non_empty_env};
use crate::language::ChatLanguage;
use crate::transcription::BatchTranscriptionConfig;

const DEFAULT_BASE_URL: &str = "https://api.sarvam.ai";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_WAIT_MS: u64 = 120_000;
const DEFAULT_TTS_SPEAKER: &str = "anushka";
const DEFAULT_TTS_MODEL: &str = "bulbul:v2";
const DEFAULT_STT_MODEL: &str = "saarika:v2.5";

/// Longest input the synthesis endpoint accepts, in characters.
pub const MAX_TTS_CHARS: usize = 500;

pub type SpeechFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SpeechError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("text to synthesize is empty")]
    EmptyText,
    #[error("speech provider request failed: status={0}")]
    Status(u16),
    #[error("speech provider request timed out")]
    Timeout,
    #[error("speech provider request failed: {0}")]
    Transport(String),
    #[error("speech provider returned an invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
    pub tts_speaker: String,
    pub tts_model: String,
    pub stt_model: String,
}

impl SpeechConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_interval_ms =
            parse_u64_env("TRANSCRIPTION_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let max_wait_ms = parse_u64_env("TRANSCRIPTION_MAX_WAIT_MS", DEFAULT_MAX_WAIT_MS)?;
        if poll_interval_ms == 0 || max_wait_ms < poll_interval_ms {
            return Err(ConfigError::InvalidConfiguration(
                "TRANSCRIPTION_MAX_WAIT_MS must be at least TRANSCRIPTION_POLL_INTERVAL_MS, which must be greater than 0"
                    .to_string(),
            ));
        }

        Ok(Self {
            base_url: http_url_env("SARVAM_BASE_URL", DEFAULT_BASE_URL)?,
            api_key: require_non_empty_env("SARVAM_API_KEY")?,
            timeout_ms: parse_u64_env("SARVAM_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            poll_interval_ms,
            max_wait_ms,
            tts_speaker: optional_trimmed_env("TTS_SPEAKER")
                .unwrap_or_else(|| DEFAULT_TTS_SPEAKER.to_string()),
            tts_model: optional_trimmed_env("TTS_MODEL")
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            stt_model: optional_trimmed_env("STT_MODEL")
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
        })
    }

    pub fn transcription_config(&self) -> BatchTranscriptionConfig {
        BatchTranscriptionConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.stt_model.clone(),
            timeout_ms: self.timeout_ms,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

/// Returns base64-encoded audio for `text`.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize<'a>(&'a self, text: &'a str, language: ChatLanguage) -> SpeechFuture<'a>;
}

#[derive(Clone)]
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: SpeechConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn synthesize_once(&self, text: &str, language: ChatLanguage) -> Result<String, SpeechError> {
        let text = truncate_chars(text.trim(), MAX_TTS_CHARS);
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let payload = TextToSpeechRequest {
            inputs: vec![text],
            target_language_code: language.provider_language_code(),
            speaker: &self.config.tts_speaker,
            model: &self.config.tts_model,
        };

        let response = self
            .client
            .post(format!("{}/text-to-speech", self.config.base_url))
            .header("api-subscription-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SpeechError::Timeout
                } else {
                    SpeechError::Transport("request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "speech synthesis returned an error status");
            return Err(SpeechError::Status(status.as_u16()));
        }

        let parsed: TextToSpeechResponse = response
            .json()
            .await
            .map_err(|_| SpeechError::InvalidPayload("response_json_parse_failed".to_string()))?;

        parsed
            .audios
            .into_iter()
            .find(|audio| !audio.is_empty())
            .ok_or_else(|| SpeechError::InvalidPayload("missing_audio".to_string()))
    }
}

impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn synthesize<'a>(&'a self, text: &'a str, language: ChatLanguage) -> SpeechFuture<'a> {
        Box::pin(self.synthesize_once(text, language))
    }
}

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    inputs: Vec<&'a str>,
    target_language_code: &'static str,
    speaker: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct TextToSpeechResponse {
    #[serde(default)]
    audios: Vec<String>,
}

/// Cuts `text` to at most `limit` characters on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
