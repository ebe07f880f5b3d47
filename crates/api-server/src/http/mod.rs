use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Router, middleware};
use chat_core::commerce::CommerceDirectory;
use chat_core::conversation::ConversationStore;
use chat_core::orchestrator::ChatOrchestrator;
use chat_core::speech::SpeechSynthesizer;

mod chat;
mod errors;
mod health;
mod identity;
mod observability;
mod speech;

pub use identity::CHAT_SESSION_HEADER;

/// Multipart framing and text fields on top of the raw upload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub directory: Arc<dyn CommerceDirectory>,
    pub conversation_store: Arc<dyn ConversationStore>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub max_upload_bytes: usize,
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let public_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/api/tts/", post(speech::text_to_speech))
        .route("/api/transcribe/", post(speech::transcribe))
        .with_state(app_state.clone());

    let identity_layer_state = app_state.clone();

    let chat_routes = Router::new()
        .route("/api/chat/", post(chat::chat_api))
        .route_layer(middleware::from_fn_with_state(
            identity_layer_state,
            identity::chat_identity_middleware,
        ))
        .with_state(app_state);

    // Route layers run after routing, so the request line carries the
    // matched route template. Unmatched paths get axum's bare 404.
    public_routes
        .merge(chat_routes)
        .route_layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
}
