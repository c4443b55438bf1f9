use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod agent;
mod engine;
mod error;
mod middleware;
mod notify;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Triage API",
        version = "0.1.0",
        description = "IT-support helpdesk with an autonomous action engine: AI-scored tickets, \
                       deterministic action routing, an append-only action ledger and audited \
                       rollback."
    ),
    paths(
        routes::health::health_check,
        routes::tickets::create_ticket,
        routes::tickets::get_ticket,
        routes::tickets::list_interactions,
        routes::agent::process_ticket,
        routes::actions::list_action_history,
        routes::actions::rollback_action,
        routes::feedback::submit_resolution_feedback,
    ),
    components(schemas(
        HealthResponse,
        triage_core::error::ApiError,
        triage_core::tickets::Ticket,
        triage_core::tickets::TicketStatus,
        triage_core::tickets::TicketInteraction,
        triage_core::tickets::InteractionKind,
        triage_core::tickets::AgentAnalysis,
        triage_core::tickets::ResolutionSteps,
        triage_core::tickets::CreateTicketRequest,
        triage_core::actions::ActionType,
        triage_core::actions::ActionParams,
        triage_core::actions::EscalationPriority,
        triage_core::actions::TicketSnapshot,
        triage_core::actions::ActionHistoryEntry,
        triage_core::resolution::ResolutionTracking,
        engine::process::ProcessOutcome,
        engine::rollback::RollbackOutcome,
        routes::actions::ActionHistoryResponse,
        routes::actions::RollbackRequest,
        routes::feedback::ResolutionFeedbackRequest,
        routes::feedback::ResolutionFeedbackResponse,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState {
        db: pool,
        agent: agent::AgentClient::from_env(),
        notifier: notify::Notifier::from_env(),
    };

    // Background worker for scheduled follow-up checks
    engine::scheduler::spawn(app_state.clone());

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::tickets::router())
        .merge(routes::agent::router())
        .merge(routes::actions::router())
        .merge(routes::feedback::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Triage API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
