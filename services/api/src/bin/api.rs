//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        BeyondPresenceAdapter, LiveKitAdapter, OpenAiChatAdapter, OpenAiEmbeddingAdapter,
        WeaviateAdapter,
    },
    agents::{
        ClarificationAgent, InterviewerAgent, PlannerAgent, PsychometricAgent, SummarizerAgent,
    },
    config::Config,
    error::ApiError,
    media_bridge::MediaBridge,
    orchestrator::{OrchestratorSettings, SessionOrchestrator},
    web::{self, state::AppState, ApiDoc},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use interview_core::{
    ports::{InterviewRepository, LanguageModelService},
    ChunkingOptions, InMemorySessionCache, PrefixMatcher, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let openai_client = match &config.openai_api_key {
        Some(key) => Some(Client::with_config(OpenAIConfig::new().with_api_key(key))),
        None => {
            warn!("OPENAI_API_KEY is not set; agent endpoints will fail until it is");
            None
        }
    };
    if config.livekit.is_none() {
        warn!("LiveKit credentials are not set; token and avatar endpoints will fail until they are");
    }

    let agent_llm: Arc<dyn LanguageModelService> = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.agent_model.clone(),
    ));
    let analysis_llm: Arc<dyn LanguageModelService> = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.summary_model.clone(),
    ));
    let embeddings = Arc::new(OpenAiEmbeddingAdapter::new(
        openai_client,
        config.embedding_model.clone(),
    ));
    let repo: Arc<dyn InterviewRepository> = Arc::new(WeaviateAdapter::new(
        http.clone(),
        config.weaviate_url.clone(),
        config.weaviate_api_key.clone(),
    ));
    let avatar = Arc::new(BeyondPresenceAdapter::new(
        http.clone(),
        config.bey_api_url.clone(),
        config.bey_api_key.clone(),
        config.bey_avatar_id.clone(),
    ));
    let livekit = Arc::new(LiveKitAdapter::new(http, config.livekit.clone()));

    // --- 3. Build the Orchestrator, Media Bridge & Agents ---
    let orchestrator = Arc::new(SessionOrchestrator::new(
        avatar.clone(),
        livekit.clone(),
        repo.clone(),
        embeddings,
        Arc::new(InMemorySessionCache::new()),
        OrchestratorSettings {
            livekit_url: config.livekit.as_ref().map(|lk| lk.url.clone()),
            freshness: chrono::Duration::minutes(config.session_freshness_minutes),
            ready_timeout: Duration::from_secs(config.session_ready_timeout_secs),
            chunking: ChunkingOptions {
                max_tokens: config.chunk_max_tokens,
                overlap_tokens: config.chunk_overlap_tokens,
            },
            ..OrchestratorSettings::default()
        },
    ));
    let media = Arc::new(MediaBridge::new(
        livekit.clone(),
        livekit,
        Arc::new(PrefixMatcher::default()),
        RetryPolicy::default(),
    ));

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        config: config.clone(),
        repo: repo.clone(),
        avatar,
        orchestrator: orchestrator.clone(),
        media,
        clarification: Arc::new(ClarificationAgent::new(
            agent_llm.clone(),
            config.clarification_question_count,
        )),
        planner: Arc::new(PlannerAgent::new(agent_llm.clone(), repo.clone())),
        interviewer: Arc::new(InterviewerAgent::new(agent_llm, Some(repo.clone()))),
        summarizer: Arc::new(SummarizerAgent::new(analysis_llm.clone(), repo.clone())),
        psychometric: Arc::new(PsychometricAgent::new(analysis_llm, repo)),
        shutdown: shutdown.clone(),
    });

    // --- 4. Sweep Stale Avatar Sessions ---
    let sweeper_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STALE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = sweeper_shutdown.cancelled() => break,
                _ = ticker.tick() => match orchestrator.evict_stale().await {
                    Ok(0) => {}
                    Ok(evicted) => info!(evicted, "Evicted stale avatar sessions"),
                    Err(e) => warn!(error = %e, "Failed to evict stale avatar sessions"),
                },
            }
        }
    });

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {e}", config.cors_origin))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let api_router = web::router(app_state)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
