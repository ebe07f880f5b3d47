use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Body;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::ConfigError;

pub type TranscriptionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TranscriptionError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("audio clip is empty")]
    EmptyAudio,
    #[error("failed to stage audio: {0}")]
    Staging(String),
    #[error("speech provider request failed during {stage}: status={status}")]
    Status { stage: &'static str, status: u16 },
    #[error("speech provider request timed out")]
    Timeout,
    #[error("speech provider request failed: {0}")]
    Transport(String),
    #[error("speech provider returned an invalid payload: {0}")]
    InvalidPayload(String),
    #[error("transcription job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },
    #[error("transcription job {job_id} did not finish within {waited_ms}ms")]
    TimedOut { job_id: String, waited_ms: u64 },
    #[error("transcription produced no text")]
    EmptyTranscript,
}

/// Speech-to-text seam. `language_code` is a provider code such as `hi-IN`.
pub trait Transcriber: Send + Sync {
    fn transcribe<'a>(&'a self, clip: &'a AudioClip, language_code: &'a str)
    -> TranscriptionFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct BatchTranscriptionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

/// Status reported by the provider for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Completed,
    Failed(String),
}

impl JobStatus {
    fn from_provider(state: &str, error_message: Option<String>) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "completed" | "complete" | "succeeded" | "done" => Self::Completed,
            "failed" | "error" | "cancelled" => {
                Self::Failed(error_message.unwrap_or_else(|| state.to_string()))
            }
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Submitted { job_id: String },
    Polling { job_id: String, polls: u32 },
    Done { job_id: String },
    TimedOut { job_id: String, waited: Duration },
    Failed { job_id: String, reason: String },
}

impl JobPhase {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Submitted { job_id }
            | Self::Polling { job_id, .. }
            | Self::Done { job_id }
            | Self::TimedOut { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::TimedOut { .. } | Self::Failed { .. }
        )
    }

    /// Folds one observed job status into the next phase. Terminal phases are
    /// absorbing. A pending job past `max_wait` times out.
    pub fn advance(self, observed: &JobStatus, elapsed: Duration, max_wait: Duration) -> Self {
        let (job_id, polls) = match self {
            Self::Submitted { job_id } => (job_id, 0),
            Self::Polling { job_id, polls } => (job_id, polls),
            terminal => return terminal,
        };

        match observed {
            JobStatus::Completed => Self::Done { job_id },
            JobStatus::Failed(reason) => Self::Failed {
                job_id,
                reason: reason.clone(),
            },
            JobStatus::Pending if elapsed >= max_wait => Self::TimedOut {
                job_id,
                waited: elapsed,
            },
            JobStatus::Pending => Self::Polling {
                job_id,
                polls: polls.saturating_add(1),
            },
        }
    }
}

/// Accepted result layouts, tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptShape {
    Transcript(String),
    Segments(Vec<String>),
    Raw(String),
}

impl TranscriptShape {
    pub fn into_text(self) -> String {
        match self {
            Self::Transcript(text) | Self::Raw(text) => text,
            Self::Segments(segments) => segments.join(" "),
        }
    }
}

pub fn decode_transcript(raw: &str) -> TranscriptShape {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!("transcript result is not JSON; returning raw text: {err}");
            return TranscriptShape::Raw(raw.trim().to_string());
        }
    };

    match non_empty_str(value.get("transcript")) {
        Some(transcript) => {
            debug!(shape = "transcript", "decoded transcript result");
            return TranscriptShape::Transcript(transcript);
        }
        None => debug!(shape = "transcript", "transcript field absent"),
    }

    let segments = ["results", "segments"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .or_else(|| value.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    non_empty_str(entry.get("transcript")).or_else(|| non_empty_str(entry.get("text")))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !segments.is_empty() {
        debug!(
            shape = "segments",
            segment_count = segments.len(),
            "decoded transcript result"
        );
        return TranscriptShape::Segments(segments);
    }
    debug!(shape = "segments", "no segment transcripts found");

    warn!(shape = "raw", "unrecognised transcript layout; returning raw JSON");
    TranscriptShape::Raw(raw.trim().to_string())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Batch speech-to-text client: submit a job, poll it within a bounded
/// budget, then fetch the result.
#[derive(Clone)]
pub struct BatchTranscriptionClient {
    client: reqwest::Client,
    config: BatchTranscriptionConfig,
}

impl BatchTranscriptionClient {
    pub fn new(config: BatchTranscriptionConfig) -> Result<Self, ConfigError> {
        if config.poll_interval.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "TRANSCRIPTION_POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn run_job(&self, clip: &AudioClip, language_code: &str) -> Result<String, TranscriptionError> {
        if clip.bytes.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }

        // The upload streams from the staged copy, which is removed when
        // `staged` drops, on every exit path.
        let staged = stage_audio(clip.bytes.clone()).await?;
        let job_id = self.submit(staged.path(), clip, language_code).await?;
        drop(staged);
        info!(job_id = %job_id, language_code, "transcription job submitted");

        let started = Instant::now();
        let mut phase = JobPhase::Submitted { job_id };
        while !phase.is_terminal() {
            if matches!(phase, JobPhase::Polling { .. }) {
                sleep(self.config.poll_interval).await;
            }
            let status = self.fetch_status(phase.job_id()).await?;
            phase = phase.advance(&status, started.elapsed(), self.config.max_wait);
            debug!(job_id = %phase.job_id(), phase = ?phase, "transcription job polled");
        }

        match phase {
            JobPhase::Done { job_id } => {
                let raw = self.fetch_result(&job_id).await?;
                let text = decode_transcript(&raw).into_text();
                if text.is_empty() {
                    return Err(TranscriptionError::EmptyTranscript);
                }
                Ok(text)
            }
            JobPhase::TimedOut { job_id, waited } => {
                warn!(job_id = %job_id, waited_ms = waited.as_millis() as u64, "transcription job timed out");
                Err(TranscriptionError::TimedOut {
                    job_id,
                    waited_ms: waited.as_millis() as u64,
                })
            }
            JobPhase::Failed { job_id, reason } => {
                warn!(job_id = %job_id, "transcription job failed: {reason}");
                Err(TranscriptionError::JobFailed { job_id, reason })
            }
            JobPhase::Submitted { job_id } | JobPhase::Polling { job_id, .. } => {
                Err(TranscriptionError::InvalidPayload(format!(
                    "job {job_id} left polling without a terminal state"
                )))
            }
        }
    }

    async fn submit(
        &self,
        staged_path: &std::path::Path,
        clip: &AudioClip,
        language_code: &str,
    ) -> Result<String, TranscriptionError> {
        let staged = tokio::fs::File::open(staged_path)
            .await
            .map_err(|err| TranscriptionError::Staging(err.to_string()))?;
        let staged_len = staged
            .metadata()
            .await
            .map_err(|err| TranscriptionError::Staging(err.to_string()))?
            .len();
        let mut part = Part::stream_with_length(Body::from(staged), staged_len)
            .file_name(clip.filename.clone());
        if let Some(content_type) = &clip.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|err| TranscriptionError::Staging(err.to_string()))?;
        }
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("language_code", language_code.to_string());

        let response = self
            .client
            .post(format!("{}/speech-to-text/jobs", self.config.base_url))
            .header("api-subscription-key", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body = read_success_body(response, "submit").await?;
        let submitted: JobEnvelope = serde_json::from_str(&body)
            .map_err(|_| TranscriptionError::InvalidPayload("job_submit_parse_failed".to_string()))?;
        Ok(submitted.job_id)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus, TranscriptionError> {
        let response = self
            .client
            .get(format!("{}/speech-to-text/jobs/{job_id}", self.config.base_url))
            .header("api-subscription-key", &self.config.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        let body = read_success_body(response, "poll").await?;
        let envelope: JobEnvelope = serde_json::from_str(&body)
            .map_err(|_| TranscriptionError::InvalidPayload("job_status_parse_failed".to_string()))?;
        let state = envelope.job_state.unwrap_or_default();
        Ok(JobStatus::from_provider(&state, envelope.error_message))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<String, TranscriptionError> {
        let response = self
            .client
            .get(format!(
                "{}/speech-to-text/jobs/{job_id}/result",
                self.config.base_url
            ))
            .header("api-subscription-key", &self.config.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        read_success_body(response, "result").await
    }
}

impl Transcriber for BatchTranscriptionClient {
    fn transcribe<'a>(
        &'a self,
        clip: &'a AudioClip,
        language_code: &'a str,
    ) -> TranscriptionFuture<'a> {
        Box::pin(self.run_job(clip, language_code))
    }
}

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    job_id: String,
    #[serde(default)]
    job_state: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

async fn stage_audio(bytes: Vec<u8>) -> Result<NamedTempFile, TranscriptionError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut staged = NamedTempFile::new()?;
        staged.write_all(&bytes)?;
        staged.flush()?;
        Ok(staged)
    })
    .await
    .map_err(|err| TranscriptionError::Staging(err.to_string()))?
    .map_err(|err| TranscriptionError::Staging(err.to_string()))
}

async fn read_success_body(
    response: reqwest::Response,
    stage: &'static str,
) -> Result<String, TranscriptionError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|_| TranscriptionError::InvalidPayload("response_body_read_failed".to_string()))?;
    if !status.is_success() {
        warn!(stage, status = status.as_u16(), "speech provider returned an error status");
        return Err(TranscriptionError::Status {
            stage,
            status: status.as_u16(),
        });
    }
    Ok(body)
}

fn map_transport_error(err: reqwest::Error) -> TranscriptionError {
    if err.is_timeout() {
        TranscriptionError::Timeout
    } else {
        TranscriptionError::Transport("request_unavailable".to_string())
    }
}
