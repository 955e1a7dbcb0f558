use loan_agent_orchestrator::{
    api::start_server,
    collaborators::{Collaborators, HttpCollaboratorClient},
    config::EngineConfig,
    orchestrator::Orchestrator,
    render::TemplateRenderer,
    session::{InMemorySessionStore, PgSessionStore, SessionStore},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Loan Conversation Orchestrator - API Server");
    info!("Port: {}", api_port);

    // Durable store when a database is configured, in-memory otherwise
    let store: Box<dyn SessionStore> = match PgSessionStore::from_env() {
        Some(store) => {
            info!("Session store backend: postgres");
            Box::new(store)
        }
        None => {
            info!("Session store backend: in-memory");
            Box::new(InMemorySessionStore::new())
        }
    };

    // Real collaborator gateway when configured, deterministic stubs otherwise
    let collaborators = match HttpCollaboratorClient::bundle_from_env() {
        Some(bundle) => {
            info!("Collaborators: http gateway");
            bundle
        }
        None => {
            info!("Collaborators: deterministic stubs");
            Collaborators::stub()
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        collaborators,
        Box::new(TemplateRenderer),
        EngineConfig::from_env(),
    ));

    info!("Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
