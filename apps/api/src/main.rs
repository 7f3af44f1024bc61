mod agents;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agents::factory::AgentFactory;
use crate::agents::manager::AgentManager;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::{ChatClient, DeepSeekClient};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Match API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite (creates the file and schema on first run)
    let db = create_pool(&config.database_url).await?;
    info!("Database initialized");

    // Initialize LLM client
    let llm: Arc<dyn ChatClient> = Arc::new(DeepSeekClient::new(
        config.deepseek_api_key.clone(),
        config.deepseek_base_url.clone(),
        Duration::from_secs(config.llm_timeout_secs),
    ));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Seed builtin agents, then build the manager/factory pair
    let agents = AgentManager::new(db, llm);
    agents.initialize().await?;
    let factory = AgentFactory::new(agents.clone());

    let state = AppState { agents, factory };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
