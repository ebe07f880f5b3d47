use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Multipart, State};
use axum::extract::multipart::MultipartRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_core::language::{ChatLanguage, provider_language_code_for_label};
use chat_core::models::{TranscribeResponse, TtsRequest, TtsResponse};
use chat_core::transcription::AudioClip;
use tracing::{info, warn};

use super::AppState;
use super::errors::{INVALID_JSON, bad_request_response, internal_error_response};
use super::observability::RequestContext;

const TEXT_REQUIRED: &str = "Text is required";
const AUDIO_REQUIRED: &str = "Audio file is required";
const TTS_FAILED: &str = "Failed to generate audio";
const TRANSCRIBE_FAILED: &str = "Failed to transcribe audio";

pub(super) async fn text_to_speech(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    let Ok(req) = serde_json::from_slice::<TtsRequest>(&body) else {
        return bad_request_response(INVALID_JSON);
    };
    let Some(text) = req
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
    else {
        return bad_request_response(TEXT_REQUIRED);
    };

    let language = ChatLanguage::from_label(req.language.as_deref());
    match state.synthesizer.synthesize(text, language).await {
        Ok(audio) => (StatusCode::OK, Json(TtsResponse { audio })).into_response(),
        Err(err) => {
            warn!(request_id = %request_context.request_id, "speech synthesis failed: {err}");
            internal_error_response(TTS_FAILED)
        }
    }
}

pub(super) async fn transcribe(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let Ok(mut multipart) = multipart else {
        return bad_request_response(AUDIO_REQUIRED);
    };

    let mut audio = None;
    let mut language_label = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!("transcribe multipart field unreadable: {err}");
                return bad_request_response("Invalid multipart body");
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "audio.webm".to_string());
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) if !bytes.is_empty() => {
                        audio = Some(AudioClip {
                            filename,
                            content_type,
                            bytes: bytes.to_vec(),
                        });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("transcribe audio field unreadable: {err}");
                        return bad_request_response("Invalid multipart body");
                    }
                }
            }
            "language" => language_label = field.text().await.ok(),
            _ => {}
        }
    }

    let Some(clip) = audio else {
        return bad_request_response(AUDIO_REQUIRED);
    };

    let language_code = provider_language_code_for_label(language_label.as_deref());
    info!(
        request_id = %request_context.request_id,
        language_code,
        audio_bytes = clip.bytes.len(),
        "transcription requested"
    );

    match state
        .orchestrator
        .normalizer()
        .transcribe_audio(&clip, language_code)
        .await
    {
        Some(text) => (StatusCode::OK, Json(TranscribeResponse { text })).into_response(),
        None => internal_error_response(TRANSCRIBE_FAILED),
    }
}
