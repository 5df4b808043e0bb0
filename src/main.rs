//! Lockin API Server
//!
//! Subscription backend for the Lockin desktop app.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use lockin_server::auth::RestIdentityProvider;
use lockin_server::billing::{StripeClient, WebhookConfig};
use lockin_server::config::AppConfig;
use lockin_server::handlers::{router, AppState};
use lockin_server::storage::RestStorage;
use lockin_server::store::{RestStore, StoreConfig};

/// Lockin API Server
#[derive(Parser, Debug)]
#[command(name = "lockin-api")]
#[command(author = "Lockin Team <team@lockin.app>")]
#[command(version)]
#[command(about = "Subscription backend for the Lockin desktop app")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("loading app configuration")?;
    let webhook_config = WebhookConfig::from_env().context("loading webhook configuration")?;

    let store = Arc::new(
        RestStore::new(StoreConfig::from_env().context("loading store configuration")?)
            .context("building store client")?,
    );
    let identity = Arc::new(RestIdentityProvider::new(
        &config.supabase_url,
        &config.supabase_anon_key,
    ));
    let storage = Arc::new(RestStorage::new(
        &config.supabase_url,
        &config.supabase_service_key,
        &config.app_bucket,
    ));
    let gateway = Arc::new(StripeClient::from_env().context("loading Stripe configuration")?);

    let state = Arc::new(AppState::new(
        config,
        webhook_config,
        store,
        identity,
        storage,
        gateway,
    ));
    let app = router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!("Lockin API server listening on {}", addr);
    tracing::info!("  POST /api/webhook                 - payment event reconciliation");
    tracing::info!("  POST /api/create-checkout-session - start a subscription checkout");
    tracing::info!("  GET  /api/user                    - authenticated profile");
    tracing::info!("  GET  /api/download                - entitlement-gated download");
    tracing::info!("  GET  /health /status /ready       - monitoring");

    axum::serve(listener, app).await.context("serving")?;

    Ok(())
}
