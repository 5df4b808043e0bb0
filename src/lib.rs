//! Lockin Server - Subscription Backend for the Lockin Desktop App
//!
//! This crate provides the HTTP backend behind lockin.app: Stripe-based
//! checkout, webhook-driven subscription reconciliation, and an
//! entitlement-gated download of the desktop app.
//!
//! # Features
//!
//! - **Webhook Reconciliation**: verified, idempotent, order-tolerant
//!   mapping of payment-processor events onto entitlement records
//! - **Checkout**: hosted checkout-session creation for authenticated users
//! - **Entitlement Gate**: signed, short-lived download URLs behind the
//!   subscription check
//!
//! # Architecture
//!
//! ```text
//! Processor ──▶ /api/webhook ──▶ Reconciler ──▶ Entitlement Store
//!                                   │                 ▲
//!                 Verify ▸ Classify ▸ Resolve ▸ Apply │
//!                                                     │
//! Browser ──▶ /api/user /api/checkout /api/download ──┘
//!                  │
//!                  ▼
//!          Identity Provider · Payment Gateway · Release Storage
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lockin_server::billing::{StripeClient, WebhookConfig};
//! use lockin_server::config::AppConfig;
//! use lockin_server::handlers::{router, AppState};
//! use lockin_server::store::MemoryStore;
//! use lockin_server::{auth::StaticIdentityProvider, storage::StaticStorage};
//!
//! # fn main() -> anyhow::Result<()> {
//! let state = Arc::new(AppState::new(
//!     AppConfig::test_config(),
//!     WebhookConfig::test_config(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(StaticIdentityProvider::new()),
//!     Arc::new(StaticStorage::new("http://localhost:9000")),
//!     Arc::new(StripeClient::from_env()?),
//! ));
//! let app = router(state);
//! // ... serve with axum
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod billing;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod storage;
pub mod store;

// Re-exports for convenience
pub use auth::{resolve_principal, IdentityProvider, Principal};
pub use billing::{Reconciler, StripeClient, WebhookConfig};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use handlers::{router, AppState};
pub use store::EntitlementStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
