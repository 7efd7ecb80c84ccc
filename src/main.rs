//! Lookup service binary.
//!
//! Reads configuration from the environment (and `.env`), then serves the lookup
//! handler until interrupted. Set `RUST_LOG` to adjust logging, e.g.
//! `RUST_LOG=mailbox_lookup=debug`.

use mailbox_lookup::handler::{self, AppState};
use mailbox_lookup::{ImapMailStore, Scanner, ServiceConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mailbox_lookup=info")),
        )
        .with_target(true)
        .init();

    let config = ServiceConfig::from_env()?;

    tracing::info!(
        email = %config.imap.email(),
        imap_host = %config.imap.imap_host,
        recency_window = ?config.lookup.recency_window,
        max_messages = config.lookup.max_messages,
        "Configuration loaded"
    );

    let scanner = Scanner::new(&config.lookup);
    let store = Arc::new(ImapMailStore::new(config.imap));
    let app = handler::router(AppState::new(store, scanner));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
