#![allow(dead_code)]

use std::sync::Arc;

use api_server::http::{AppState, build_router};
use chat_core::commerce::InMemoryCommerceDirectory;
use chat_core::conversation::{ConversationStore, InMemoryConversationStore};
use chat_core::llm::{FallbackPolicy, GroqGateway, GroqGatewayConfig, GroqModelRoute};
use chat_core::normalizer::InputNormalizer;
use chat_core::orchestrator::ChatOrchestrator;
use chat_core::speech::{HttpSpeechSynthesizer, SpeechConfig};
use chat_core::transcription::BatchTranscriptionClient;

use super::mock_provider::MockProvider;

pub const PRIMARY_MODEL: &str = "primary-model";
pub const FALLBACK_MODEL: &str = "fallback-model";
pub const VISION_MODEL: &str = "vision-model";
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024;

pub struct TestApp {
    pub router: axum::Router,
    pub conversations: InMemoryConversationStore,
}

pub fn build_test_app(provider: &MockProvider, directory: InMemoryCommerceDirectory) -> TestApp {
    let conversations = InMemoryConversationStore::new();
    let router = build_test_router_with_store(provider, directory, Arc::new(conversations.clone()));
    TestApp {
        router,
        conversations,
    }
}

pub fn build_test_router_with_store(
    provider: &MockProvider,
    directory: InMemoryCommerceDirectory,
    conversation_store: Arc<dyn ConversationStore>,
) -> axum::Router {
    let groq_config = groq_config(provider);
    let speech_config = speech_config(provider);

    let gateway = Arc::new(GroqGateway::new(groq_config.clone()).expect("gateway should build"));
    let transcriber = Arc::new(
        BatchTranscriptionClient::new(speech_config.transcription_config())
            .expect("transcriber should build"),
    );
    let synthesizer =
        Arc::new(HttpSpeechSynthesizer::new(speech_config).expect("synthesizer should build"));
    let directory = Arc::new(directory);

    let normalizer = InputNormalizer::new(
        gateway.clone(),
        groq_config.vision_settings(),
        transcriber,
        MAX_UPLOAD_BYTES,
    );
    let orchestrator = ChatOrchestrator::new(
        conversation_store.clone(),
        directory.clone(),
        normalizer,
        FallbackPolicy::new(gateway, groq_config.fallback_config()),
        10,
    );

    build_router(AppState {
        orchestrator: Arc::new(orchestrator),
        directory,
        conversation_store,
        synthesizer,
        max_upload_bytes: MAX_UPLOAD_BYTES,
    })
}

fn groq_config(provider: &MockProvider) -> GroqGatewayConfig {
    GroqGatewayConfig {
        chat_completions_url: provider.chat_completions_url(),
        api_key: "test-groq-key".to_string(),
        timeout_ms: 5_000,
        temperature: 0.7,
        max_tokens: 1024,
        fallback_backoff_ms: 0,
        model_route: GroqModelRoute {
            primary_model: PRIMARY_MODEL.to_string(),
            fallback_model: FALLBACK_MODEL.to_string(),
            vision_model: VISION_MODEL.to_string(),
        },
    }
}

fn speech_config(provider: &MockProvider) -> SpeechConfig {
    SpeechConfig {
        base_url: provider.base_url.clone(),
        api_key: "test-sarvam-key".to_string(),
        timeout_ms: 5_000,
        poll_interval_ms: 10,
        max_wait_ms: 1_000,
        tts_speaker: "test-speaker".to_string(),
        tts_model: "test-tts".to_string(),
        stt_model: "test-stt".to_string(),
    }
}
