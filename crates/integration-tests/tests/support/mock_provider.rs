#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

pub const FEVER_REPLY: &str = "For a mild fever, rest, drink plenty of fluids and consider paracetamol as directed on the pack.\n\n1. What paracetamol dose is safe for adults?\n2. When should I see a doctor about a fever?\n3. Do you stock digital thermometers?";

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: StatusCode,
    pub body: Value,
}

impl MockReply {
    pub fn completion(content: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({
                "id": "chatcmpl-mock",
                "model": "mock-model",
                "choices": [
                    {
                        "message": {
                            "role": "assistant",
                            "content": content
                        }
                    }
                ]
            }),
        }
    }

    pub fn provider_error(status: StatusCode, code: &str) -> Self {
        Self {
            status,
            body: json!({ "error": { "code": code } }),
        }
    }
}

#[derive(Debug, Clone)]
struct MockState {
    chat_replies: Arc<Mutex<VecDeque<MockReply>>>,
    chat_payloads: Arc<Mutex<Vec<Value>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
    tts_payloads: Arc<Mutex<Vec<Value>>>,
    tts_status: StatusCode,
    transcript: Option<String>,
}

/// Chat-completions and speech endpoints on one ephemeral local port.
pub struct MockProvider {
    pub base_url: String,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl MockProvider {
    pub async fn start(chat_replies: Vec<MockReply>) -> Self {
        Self::start_with(chat_replies, StatusCode::OK, Some("mujhe bukhar hai".to_string())).await
    }

    pub async fn start_with(
        chat_replies: Vec<MockReply>,
        tts_status: StatusCode,
        transcript: Option<String>,
    ) -> Self {
        let state = MockState {
            chat_replies: Arc::new(Mutex::new(VecDeque::from(chat_replies))),
            chat_payloads: Arc::new(Mutex::new(Vec::new())),
            auth_headers: Arc::new(Mutex::new(Vec::new())),
            tts_payloads: Arc::new(Mutex::new(Vec::new())),
            tts_status,
            transcript,
        };

        let app = Router::new()
            .route("/openai/v1/chat/completions", post(chat_completions_handler))
            .route("/text-to-speech", post(text_to_speech_handler))
            .route("/speech-to-text/jobs", post(submit_job_handler))
            .route("/speech-to-text/jobs/{job_id}", get(job_status_handler))
            .route("/speech-to-text/jobs/{job_id}/result", get(job_result_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let local_addr = listener
            .local_addr()
            .expect("listener address should resolve");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

            server.await.expect("mock provider should run");
        });

        Self {
            base_url: format!("http://{local_addr}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            server_task: Some(server_task),
        }
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/openai/v1/chat/completions", self.base_url)
    }

    pub async fn chat_payloads(&self) -> Vec<Value> {
        self.state.chat_payloads.lock().await.clone()
    }

    pub async fn seen_models(&self) -> Vec<String> {
        self.chat_payloads()
            .await
            .iter()
            .filter_map(|payload| payload["model"].as_str().map(str::to_string))
            .collect()
    }

    pub async fn auth_headers(&self) -> Vec<String> {
        self.state.auth_headers.lock().await.clone()
    }

    pub async fn tts_payloads(&self) -> Vec<Value> {
        self.state.tts_payloads.lock().await.clone()
    }

    /// Content of the system message of the `index`-th chat request.
    pub async fn system_prompt(&self, index: usize) -> String {
        self.chat_payloads().await[index]["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    pub async fn stop(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(server_task) = self.server_task.take() {
            server_task.await.expect("mock provider task should join");
        }
    }
}

async fn chat_completions_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.chat_payloads.lock().await.push(payload);
    if let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
    {
        state.auth_headers.lock().await.push(value.to_string());
    }

    let reply = state
        .chat_replies
        .lock()
        .await
        .pop_front()
        .unwrap_or_else(|| MockReply::completion(FEVER_REPLY));
    (reply.status, Json(reply.body))
}

async fn text_to_speech_handler(
    State(state): State<MockState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.tts_payloads.lock().await.push(payload);
    if !state.tts_status.is_success() {
        return (state.tts_status, Json(json!({ "error": "tts_down" })));
    }
    (StatusCode::OK, Json(json!({ "audios": ["UklGRmFrZQ=="] })))
}

async fn submit_job_handler(State(state): State<MockState>) -> (StatusCode, Json<Value>) {
    match state.transcript {
        Some(_) => (StatusCode::OK, Json(json!({ "job_id": "job-ok" }))),
        None => (StatusCode::OK, Json(json!({ "job_id": "job-broken" }))),
    }
}

async fn job_status_handler(Path(job_id): Path<String>) -> (StatusCode, Json<Value>) {
    let state = if job_id == "job-ok" { "Completed" } else { "Failed" };
    (
        StatusCode::OK,
        Json(json!({ "job_id": job_id, "job_state": state, "error_message": "bad audio" })),
    )
}

async fn job_result_handler(
    State(state): State<MockState>,
    Path(_job_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "transcript": state.transcript.unwrap_or_default() })),
    )
}
