use axum::Json;
use axum::body::to_bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, FromRequest, Multipart, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chat_core::language::ChatLanguage;
use chat_core::models::{ChatRequest, ChatResponse};
use chat_core::normalizer::UploadedFile;
use chat_core::orchestrator::ChatTurnRequest;
use chat_core::transcription::AudioClip;
use tracing::{info, warn};

use super::AppState;
use super::errors::{INVALID_JSON, bad_request_response, chat_error_response};
use super::identity::ChatIdentity;
use super::observability::RequestContext;

/// Fields accepted on `/api/chat/`, from either JSON or a multipart form.
#[derive(Debug, Default)]
pub(super) struct ChatForm {
    pub(super) message: Option<String>,
    pub(super) language: Option<String>,
    pub(super) file: Option<UploadedFile>,
    pub(super) audio: Option<AudioClip>,
}

pub(super) async fn chat_api(
    State(state): State<AppState>,
    Extension(identity): Extension<ChatIdentity>,
    Extension(request_context): Extension<RequestContext>,
    req: Request,
) -> Response {
    let form = if is_multipart(&req) {
        read_multipart_form(req, &state).await
    } else {
        read_json_form(req, state.max_upload_bytes).await
    };
    let form = match form {
        Ok(form) => form,
        Err(response) => return response,
    };

    let language = ChatLanguage::from_label(form.language.as_deref());
    info!(
        request_id = %request_context.request_id,
        owner = %identity.owner.fingerprint(),
        language = language.as_str(),
        has_file = form.file.is_some(),
        has_audio = form.audio.is_some(),
        "chat turn received"
    );

    let turn = ChatTurnRequest {
        caller: identity.caller,
        owner: identity.owner,
        message: form.message,
        language,
        file: form.file,
        audio: form.audio,
    };

    match state.orchestrator.handle(turn).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(ChatResponse {
                response: reply.response,
                follow_ups: reply.follow_ups,
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(
                request_id = %request_context.request_id,
                route = %request_context.route,
                "chat turn rejected: {err}"
            );
            chat_error_response(err)
        }
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
}

async fn read_json_form(req: Request, limit: usize) -> Result<ChatForm, Response> {
    let body = to_bytes(req.into_body(), limit)
        .await
        .map_err(|_| bad_request_response(INVALID_JSON))?;
    let parsed: ChatRequest =
        serde_json::from_slice(&body).map_err(|_| bad_request_response(INVALID_JSON))?;

    Ok(ChatForm {
        message: parsed.message,
        language: parsed.language,
        file: None,
        audio: None,
    })
}

async fn read_multipart_form(req: Request, state: &AppState) -> Result<ChatForm, Response> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|rejection| {
            warn!("chat multipart rejected: {rejection}");
            bad_request_response("Invalid multipart body")
        })?;

    let mut form = ChatForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!("chat multipart field unreadable: {err}");
                return Err(bad_request_response("Invalid multipart body"));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let read_failed = |err: MultipartError| {
            warn!(field = %name, "chat multipart field unreadable: {err}");
            bad_request_response("Invalid multipart body")
        };

        match name.as_str() {
            "message" => form.message = Some(field.text().await.map_err(read_failed)?),
            "language" => form.language = Some(field.text().await.map_err(read_failed)?),
            "file" => {
                let bytes = field.bytes().await.map_err(read_failed)?;
                if !bytes.is_empty() {
                    form.file = Some(UploadedFile {
                        filename: filename.unwrap_or_else(|| "upload".to_string()),
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "audio" => {
                let bytes = field.bytes().await.map_err(read_failed)?;
                if !bytes.is_empty() {
                    form.audio = Some(AudioClip {
                        filename: filename.unwrap_or_else(|| "audio.webm".to_string()),
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}
