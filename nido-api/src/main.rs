//! # Nido API Server
//!
//! Single-binary HTTP server for the Nido real-estate marketplace:
//! authentication, property listings with image variants, filtered and
//! geographic search, saved searches, user preferences, and notifications.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p nido-api
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use nido_api::app::{build_router, AppState};
use nido_api::config::Config;
use nido_shared::auth::provider::LocalIdentityProvider;
use nido_shared::db::{migrations, pool};
use nido_shared::storage::s3::S3Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nido_api=debug,nido_shared=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Nido API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = pool::create_pool(pool::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    migrations::run_migrations(&db).await?;

    let store = S3Store::from_settings(
        config.storage.bucket.clone(),
        config.storage.region.clone(),
        config.storage.endpoint.clone(),
    )
    .await;

    let identity = LocalIdentityProvider::new(db.clone(), config.jwt.secret.clone());

    let bind_address = config.bind_address();
    let state = AppState::new(db, config, Arc::new(store), Arc::new(identity));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves when the process receives a termination signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
