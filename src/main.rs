//! Application entry point and server initialization

use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use privateurl::config::Settings;
use privateurl::database::RecordStore;
use privateurl::lifecycle::PrivateUrls;
use privateurl::route::{create_app, AppState};

/// Loads configuration from the environment (and `.env`), opens the
/// database and serves until SIGINT or SIGTERM.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("privateurl=debug,tower_http=debug")),
        )
        .init();

    // Configuration errors abort startup before anything is opened
    let settings = Settings::from_env()?;

    // Creates the database file and table on first run
    let store = RecordStore::open(&settings.database_path)?;

    let addr = format!("0.0.0.0:{}", settings.port);
    tracing::info!(
        database = %settings.database_path,
        namespace = %settings.url_namespace,
        "Server running at http://localhost:{}",
        settings.port
    );

    // No subscribers registered: every hit falls back to the default redirect
    let urls = PrivateUrls::new(store, Arc::new(settings));
    let app = create_app(AppState::new(urls)).layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the configured port
    let listener = TcpListener::bind(&addr).await?;

    // Serve until SIGINT/SIGTERM, letting in-flight requests finish
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM on Unix. A signal that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    tracing::info!(signal = received, "Shutting down, draining in-flight requests");
}
