// Chatpipe API server
// Decision: the event feed is durable; SSE replays the per-conversation log
// with cursor-based resumption instead of holding in-process subscriptions

mod config;
mod events;
mod messages;
mod pipeline;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use chatpipe_core::BatcherConfig;
use chatpipe_storage::Database;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::pipeline::EventPipeline;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    flush_words: usize,
    max_latency_ms: u64,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        flush_words: state.batcher.flush_words,
        max_latency_ms: state.batcher.max_latency.as_millis() as u64,
    })
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    batcher: BatcherConfig,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        events::ingest_events,
        events::stream_sse,
        events::stream_snapshots,
        events::list_events,
        messages::list_messages,
        messages::get_resume,
    ),
    components(
        schemas(
            events::IngestResponse,
            events::Event,
            events::EventsResponse,
            messages::MessagesResponse,
            messages::ResumeResponse,
        )
    ),
    tags(
        (name = "events", description = "Event ingest and streaming endpoints (SSE)"),
        (name = "messages", description = "Persisted message and resume endpoints")
    ),
    info(
        title = "Chatpipe API",
        version = "0.2.0",
        description = "API for streaming assistant message pipelines: event ingest, durable replay, resume",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatpipe_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("chatpipe-api starting...");

    // Initialize database
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.run_migrations().await?;
    tracing::info!("Connected to database");

    // Load pipeline configuration from environment
    let batcher = BatcherConfig::from_env();
    tracing::info!(
        flush_words = batcher.flush_words,
        max_latency_ms = batcher.max_latency.as_millis() as u64,
        "Word batcher configured"
    );
    let policies = config::tool_policies_from_env();

    let event_pipeline = EventPipeline::new(db, policies, batcher);

    // Create module-specific states
    let events_state = events::AppState::new(event_pipeline.clone());
    let messages_state = messages::AppState::new(event_pipeline);
    let health_state = HealthState { batcher };

    // Load API prefix from environment (default: empty)
    // Example: API_PREFIX="/api" results in routes like /api/v1/conversations
    let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
    if !api_prefix.is_empty() {
        tracing::info!(prefix = %api_prefix, "API prefix configured");
    }

    // Load CORS allowed origins from environment (optional)
    // Only needed when UI is served from a different origin than the API
    // Example: CORS_ALLOWED_ORIGINS="https://app.example.com,https://admin.example.com"
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    // Build API routes
    let api_routes = Router::new()
        .merge(events::routes(events_state))
        .merge(messages::routes(messages_state));

    // Build main router with health (not prefixed) and prefixed API routes
    let mut app = Router::new().route("/health", get(health).with_state(health_state));

    // Apply API prefix if configured
    app = app.merge(build_router_with_prefix(api_routes, &api_prefix));

    // Add Swagger UI
    let app =
        app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ])
                .allow_credentials(true),
        )
    } else {
        app
    };

    // Add tracing
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = "0.0.0.0:9000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
