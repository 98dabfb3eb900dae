// src/main.rs

mod config;
mod ledger;
mod pipeline;
mod prompt;
mod providers;
mod qr;
mod response;
mod schema;
mod server;
mod validate;

use config::{Config, LedgerBackend};
use ledger::{Ledger, SheetsLedger, SqliteLedger};
use pipeline::ReceiptParser;
use providers::ProviderRegistry;
use server::AppState;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// rustls needs a process-wide crypto provider before any TLS client is built.
pub(crate) fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    install_crypto_provider();

    let cfg = Config::from_env()?;

    let registry = ProviderRegistry::from_config(&cfg.vision)?;
    let parser = ReceiptParser::new(registry, cfg.vision.default_provider.clone());
    info!(
        providers = ?parser.provider_names(),
        default_provider = parser.default_provider(),
        "Vision providers ready"
    );

    let ledger: Arc<dyn Ledger> = match cfg.ledger.backend {
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::open(&cfg.ledger.db_path)?),
        LedgerBackend::Sheets => Arc::new(SheetsLedger::connect(&cfg.ledger.sheets).await?),
    };

    let state = Arc::new(AppState::new(
        parser,
        ledger,
        cfg.vocabulary.clone(),
        &cfg.server.auth_token,
    ));
    let app = server::router(state, cfg.server.frontend_dir.as_deref().map(Path::new));

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await?;
    info!(bind = %cfg.server.bind, backend = ?cfg.ledger.backend, "Receipt ledger listening");
    axum::serve(listener, app).await?;

    Ok(())
}
