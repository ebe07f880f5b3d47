use std::net::SocketAddr;
use std::sync::Arc;

use api_server::http;
use chat_core::commerce::CommerceDirectory;
use chat_core::config::{ApiConfig, load_env_file};
use chat_core::conversation::ConversationStore;
use chat_core::llm::{ChatGateway, FallbackPolicy, GroqGateway, GroqGatewayConfig};
use chat_core::normalizer::InputNormalizer;
use chat_core::orchestrator::ChatOrchestrator;
use chat_core::repos::Store;
use chat_core::speech::{HttpSpeechSynthesizer, SpeechConfig};
use chat_core::transcription::BatchTranscriptionClient;
use tracing::{error, info};

const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 8080);

#[tokio::main]
async fn main() {
    load_env_file();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_server=debug,chat_core=debug,axum=info".to_string()),
        )
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };
    let groq_config = match GroqGatewayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read chat provider config: {err}");
            std::process::exit(1);
        }
    };
    let speech_config = match SpeechConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read speech provider config: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.database_max_connections).await
    {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let gateway: Arc<dyn ChatGateway> = match GroqGateway::new(groq_config.clone()) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            error!("failed to build chat provider client: {err}");
            std::process::exit(1);
        }
    };
    let transcriber =
        match BatchTranscriptionClient::new(speech_config.transcription_config()) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                error!("failed to build transcription client: {err}");
                std::process::exit(1);
            }
        };
    let synthesizer = match HttpSpeechSynthesizer::new(speech_config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("failed to build speech synthesis client: {err}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(store);
    let conversation_store: Arc<dyn ConversationStore> = store.clone();
    let directory: Arc<dyn CommerceDirectory> = store;

    let normalizer = InputNormalizer::new(
        gateway.clone(),
        groq_config.vision_settings(),
        transcriber,
        config.max_upload_bytes,
    );
    let orchestrator = ChatOrchestrator::new(
        conversation_store.clone(),
        directory.clone(),
        normalizer,
        FallbackPolicy::new(gateway, groq_config.fallback_config()),
        config.history_window,
    );

    let app = http::build_router(http::AppState {
        orchestrator: Arc::new(orchestrator),
        directory,
        conversation_store,
        synthesizer,
        max_upload_bytes: config.max_upload_bytes,
    });

    let addr: SocketAddr = config.bind_addr.parse().unwrap_or(DEFAULT_BIND_ADDR);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        primary_model = %groq_config.model_route.primary_model,
        fallback_model = %groq_config.model_route.fallback_model,
        "chat api listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server exited with error: {err}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received; draining connections");
}
