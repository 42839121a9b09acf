use anyhow::Context;
use session_memory::{
    api::{build_router, AppState},
    config::{init_logging, Config},
    llm::OpenAiCompatibleProvider,
    session::SessionManager,
    storage::JsonFileStore,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config path as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(&config.logging);

    let provider = OpenAiCompatibleProvider::new(config.llm.clone())
        .context("Failed to create completion provider")?;
    let store = JsonFileStore::new(&config.storage.dir);

    let manager = SessionManager::new(&config, Arc::new(provider), Arc::new(store))
        .context("Failed to create session manager")?;

    let router = build_router(
        AppState {
            manager: Arc::new(manager),
        },
        config.server.max_body_bytes,
    );

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!(
        "Session memory listening on {} (model {}, threshold {} tokens)",
        address, config.llm.model, config.memory.token_threshold
    );

    axum::serve(listener, router).await?;

    Ok(())
}
