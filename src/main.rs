//! sweepd — HTTP facade over Sequence-managed financial accounts.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! resolves secrets from the environment, and serves the API with
//! graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use sweepd::config::{AppConfig, Secrets};
use sweepd::provider::sequence::SequenceClient;
use sweepd::server;
use sweepd::server::routes::FacadeState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    info!(
        port = cfg.server.port,
        provider_base_url = %cfg.provider.base_url,
        default_buffer_cents = cfg.sweep.default_buffer_cents,
        default_percent = cfg.sweep.default_percent,
        default_daily_cap_cents = cfg.sweep.default_daily_cap_cents,
        "sweepd starting up"
    );

    // -- Resolve secrets ---------------------------------------------------

    let secrets = Secrets::from_env(&cfg)?;
    if secrets.provider_access_token.is_none() {
        warn!("Provider access token not set — account endpoints will fail per-request");
    }
    if secrets.admin_token.is_none() {
        warn!("Admin token not set — rule triggers are disabled");
    }
    info!(
        whitelisted_rules = secrets.rule_secrets.len(),
        "Secrets resolved"
    );

    // -- Build state and serve ---------------------------------------------

    let provider = SequenceClient::new(&cfg.provider, secrets.provider_access_token.clone())?;
    let state = Arc::new(FacadeState::new(Arc::new(provider), cfg.sweep, secrets));

    server::serve(state, cfg.server.port).await?;

    info!("sweepd shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sweepd=info"));

    let json_logging = std::env::var("SWEEPD_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
