// Allow missing docs in this module - billing integration is internal
#![allow(missing_docs)]

//! Subscription State Reconciler
//!
//! This module keeps the internal entitlement records consistent with the
//! payment processor's asynchronously-delivered event stream. It implements:
//!
//! - **Signature Verification**: HMAC-SHA256 validation of the
//!   `stripe-signature` header over the raw request body
//! - **Classification**: external event types mapped once onto a tagged
//!   [`Intent`], exhaustively matched by the writer
//! - **Identity Resolution**: event email / external subscription id mapped
//!   to an internal user, with ambiguity surfaced rather than guessed
//! - **Idempotent Writes**: upserts keyed on external ids, ordered by event
//!   time, safe under duplicate and out-of-order delivery
//!
//! # Architecture
//!
//! ```text
//! Request -> Verify Signature -> Classify -> Resolve -> Apply -> Ack (200)
//!                 |                  |           |         |
//!                 v                  v           v         v
//!             400 (terminal)     200 (ignore)   500 (processor retries)
//! ```
//!
//! # Security
//!
//! - Webhook signing secret loaded from the environment
//! - Constant-time signature comparison
//! - Raw-body verification: the bytes that were signed are the bytes that
//!   are verified
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lockin_server::billing::{Reconciler, StripeClient, WebhookConfig};
//! use lockin_server::store::MemoryStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = WebhookConfig::from_env()?;
//! let store = Arc::new(MemoryStore::new());
//! let gateway = Arc::new(StripeClient::from_env()?);
//! let reconciler = Reconciler::new(config, store, gateway);
//! // ... hand `reconciler` to the webhook handler
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod resolver;
pub mod signature;
pub mod writer;

// Re-export commonly used items
pub use classifier::{classify, Intent};
pub use client::{
    CheckoutRequest, CreatedCheckout, GatewayError, PaymentGateway, StripeClient, StripeConfig,
};
pub use config::{WebhookConfig, WebhookConfigError};
pub use error::{
    ResolutionError, VerificationError, WebhookError, WebhookResult, WriteError,
};
pub use events::{
    CheckoutMode, CheckoutSession, EventKind, Subscription, SubscriptionStatus, WebhookEvent,
};
pub use reconciler::{Receipt, Reconciler, Stage};
pub use signature::SignatureVerifier;
pub use writer::{apply, ApplyResult};
