//! Game Lobby Engine - Main entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gamelobby_engine::infrastructure::{
    auth::{AccountFileAuthenticator, DevAuthenticator},
    config::LobbyConfig,
    ports::Authenticator,
};
use gamelobby_engine::LobbyServer;

fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the binary may run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamelobby_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LobbyConfig::from_env()?;

    // Worker count is independent of connection count.
    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = config.worker_threads {
        runtime.worker_threads(workers);
    }
    runtime.build()?.block_on(run(config))
}

async fn run(config: LobbyConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Game Lobby Engine");

    let authenticator: Arc<dyn Authenticator> = match &config.accounts_file {
        Some(path) => Arc::new(AccountFileAuthenticator::load(path).await?),
        None => {
            tracing::warn!("LOBBY_ACCOUNTS_FILE not set, accepting any display name as credentials");
            Arc::new(DevAuthenticator)
        }
    };

    let server = LobbyServer::new(config, authenticator).start().await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    server.wait().await?;
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
