//! Application startup and server initialization.
//!
//! Builds the auth provider, profile store and session synchronizer from the
//! config, then serves the session routes until ctrl-c.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ConfigV1;
use crate::profiles::create_profile_store;
use crate::providers::create_auth_provider;
use crate::routes;
use crate::session::SessionSynchronizer;
use crate::state::AppState;
use crate::storage::MemoryTabStorage;

/// Wire up the backends and start the session worker.
///
/// Must be called from inside a tokio runtime.
pub async fn build_state(config: Arc<ConfigV1>) -> AppState {
    let provider = create_auth_provider(&config.auth_provider).await;
    let profiles = create_profile_store(&config.profile_store, provider.clone());
    let session = SessionSynchronizer::start(
        provider,
        profiles,
        Arc::new(MemoryTabStorage::new()),
        config.session.clone(),
    );
    AppState { config, session }
}

/// Initializes and runs the application server.
///
/// # Errors
///
/// Returns an error if the server fails to bind to the configured address
/// or encounters a runtime error while serving.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config.clone()).await;
    let session = state.session.clone();
    let app = routes::create_router(state);

    info!("Starting server on {}", config.bind_address);
    let listener = TcpListener::bind(&config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    session.shutdown();
    Ok(())
}
