//! HTTP surface of the Lockin server.
//!
//! This module wires the page-level handlers over the shared [`AppState`]:
//!
//! - `/api/webhook` - the reconciler boundary (raw body, signature header)
//! - `/api/create-checkout-session` - authenticated checkout start
//! - `/api/user` - authenticated profile fetch (lazy profile creation)
//! - `/api/download` - entitlement-gated signed download URL
//! - `/health`, `/status`, `/ready` - liveness and runtime status
//!
//! Every boundary the handlers touch is a trait object, so tests drive the
//! full router with in-memory implementations.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::auth::IdentityProvider;
use crate::billing::{PaymentGateway, Reconciler, WebhookConfig};
use crate::config::AppConfig;
use crate::cors::cors_layer;
use crate::storage::ReleaseStorage;
use crate::store::EntitlementStore;

pub mod checkout;
pub mod download;
pub mod status;
pub mod user;
pub mod webhook;

pub use status::{health_handler, readiness_handler, status_handler, RuntimeStats};

/// Shared application state.
///
/// Constructed once at startup and cloned into every handler via `Arc`.
/// Per the process-boundary rule there is no global client anywhere: every
/// external connection lives here and is torn down with the process.
pub struct AppState {
    /// Entitlement store boundary.
    pub store: Arc<dyn EntitlementStore>,
    /// Identity provider boundary.
    pub identity: Arc<dyn IdentityProvider>,
    /// Release storage boundary.
    pub storage: Arc<dyn ReleaseStorage>,
    /// Payment processor boundary.
    pub gateway: Arc<dyn PaymentGateway>,
    /// Webhook reconciler.
    pub reconciler: Reconciler,
    /// Runtime counters and latency histogram.
    pub runtime: RuntimeStats,
    /// Ambient settings (download paths, CORS origins).
    pub config: AppConfig,
}

impl AppState {
    /// Assemble the application state from its boundaries.
    pub fn new(
        config: AppConfig,
        webhook_config: WebhookConfig,
        store: Arc<dyn EntitlementStore>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn ReleaseStorage>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let reconciler = Reconciler::new(webhook_config, store.clone(), gateway.clone());
        Self {
            store,
            identity,
            storage,
            gateway,
            reconciler,
            runtime: RuntimeStats::new(),
            config,
        }
    }
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ready", get(readiness_handler))
        .route("/api/user", get(user::user_handler))
        .route(
            "/api/create-checkout-session",
            post(checkout::checkout_handler),
        )
        .route("/api/download", get(download::download_handler))
        .route("/api/webhook", post(webhook::webhook_handler))
        .layer(cors)
        .with_state(state)
}
