//! Text2SQL Web Server
//!
//! Wires the staged pipeline to an HTTP surface: query, health and a
//! schema debug endpoint. All configuration comes from environment
//! variables, loaded through dotenv at startup.

mod routes;
mod state;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use text2sql::{
    create_llm_client, ColumnMeanings, KnowledgeBase, Pipeline, PipelineConfig, QueryExecutor,
};

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "text2sql_web=debug,text2sql=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Text2SQL Web Server");

    let config = PipelineConfig::from_env();

    // Read-only store connection
    let db_path = std::env::var("TEXT2SQL_DB").unwrap_or_else(|_| "text2sql.db".to_string());
    let executor = match QueryExecutor::open_read_only(&db_path).await {
        Ok(e) => {
            tracing::info!("Opened read-only SQLite store at {}", db_path);
            e
        }
        Err(e) => {
            tracing::error!("Failed to open SQLite store at {}: {}", db_path, e);
            tracing::error!("Check the TEXT2SQL_DB environment variable");
            return Err(format!("store open failed: {}", e).into());
        }
    };

    // Optional knowledge base and column meanings; missing files are fine.
    let knowledge_path =
        std::env::var("TEXT2SQL_KNOWLEDGE").unwrap_or_else(|_| "knowledge.jsonl".to_string());
    let knowledge = KnowledgeBase::load(&knowledge_path);

    let meanings_path = std::env::var("TEXT2SQL_COLUMN_MEANINGS")
        .unwrap_or_else(|_| "column_meanings.json".to_string());
    let meanings = ColumnMeanings::load(&meanings_path);

    let client = match create_llm_client(config.gateway_timeout) {
        Ok(c) => {
            tracing::info!(
                "Language model backend: {} ({})",
                c.provider_name(),
                c.model_name()
            );
            c
        }
        Err(e) => {
            tracing::error!("Failed to create language model client: {}", e);
            tracing::error!("Check LLM_BACKEND and the matching API key variable");
            return Err(format!("client setup failed: {}", e).into());
        }
    };

    let pipeline = Pipeline::new(client, executor, knowledge, meanings, config);
    let app_state = AppState::new(pipeline);

    // CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/query", post(routes::api::query))
        .route("/api/health", get(routes::api::health))
        .route("/api/schema", get(routes::api::schema))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let port: u16 = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Text2SQL server listening on http://{}", addr);
    tracing::info!("  POST /api/query   - run the pipeline");
    tracing::info!("  GET  /api/health  - liveness check");
    tracing::info!("  GET  /api/schema  - introspected schema");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(format!("failed to bind to {}: {}", addr, e).into());
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        return Err(format!("server error: {}", e).into());
    }

    Ok(())
}
