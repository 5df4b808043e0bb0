//! Error taxonomy for the webhook reconciliation pipeline.
//!
//! The split mirrors the retry policy at the HTTP boundary:
//!
//! - [`VerificationError`] and malformed payloads are terminal and local -
//!   400, no side effects, the processor must not retry.
//! - [`ResolutionError`] and [`WriteError`] abort the remaining pipeline
//!   steps and surface as 500 so the processor's retry mechanism redelivers
//!   the event; the writer's idempotency makes redelivery safe.
//! - `AmbiguousUser` is a data-integrity fault: it also answers 500, but the
//!   reconciler logs it with an operator-alert marker because retries will
//!   never resolve it on their own.

use http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Signature verification failures. All map to HTTP 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The signature header is absent or carries no usable components.
    #[error("missing or malformed signature header")]
    MissingSignature,

    /// No candidate signature matched the recomputed one.
    #[error("signature does not match payload")]
    BadSignature,

    /// The signed timestamp is outside the tolerance window.
    #[error("event timestamp outside the {tolerance_secs}s tolerance window")]
    StaleTimestamp {
        /// Configured tolerance, for the log line.
        tolerance_secs: u64,
    },

    /// The signing secret is not configured.
    #[error("webhook signing secret is not configured")]
    MissingSecret,
}

/// Identity-resolution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The event carries no email to resolve by.
    #[error("event carries no customer email")]
    MissingEmail,

    /// No profile matches the event's email. May be a transient race with
    /// sign-up; the processor's retry with backoff covers it.
    #[error("no user found for email {email}")]
    UserNotFound {
        /// Email the event carried.
        email: String,
    },

    /// More than one profile matches the event's email. Data-integrity
    /// fault; must be surfaced, never silently picked.
    #[error("{count} profiles share email {email}")]
    AmbiguousUser {
        /// Email the event carried.
        email: String,
        /// Number of matching profiles.
        count: usize,
    },

    /// No subscription row carries the event's external id. Update events
    /// lack creation data, so this never falls back to an insert.
    #[error("no subscription row for external id {0}")]
    SubscriptionNotFound(String),
}

/// Entitlement-write failures.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The resolved user has no profile row.
    #[error("profile not found for user {0}")]
    ProfileNotFound(Uuid),

    /// The update path found no subscription row to update.
    #[error("no subscription row for external id {0}")]
    SubscriptionNotFound(String),

    /// The underlying store is unavailable; retryable.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The bounded store window elapsed; the request fails rather than hangs.
    #[error("store operation timed out after {0}s")]
    Timeout(u64),
}

/// Everything that can go wrong between receiving a webhook and
/// acknowledging it.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Verification failure (terminal, 400).
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// The verified body is not an event we can parse (terminal, 400).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Identity resolution failure.
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// Entitlement write failure.
    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    /// Outbound gateway failure while enriching the event.
    #[error("payment gateway error: {0}")]
    Gateway(String),
}

impl WebhookError {
    /// HTTP status the boundary answers with. Non-2xx means "retry" to the
    /// processor, so only terminal failures map to 400.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Verification(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            // A checkout event without any email will never heal via retry.
            Self::Resolution(ResolutionError::MissingEmail) => StatusCode::BAD_REQUEST,
            Self::Resolution(_) | Self::Write(_) | Self::Gateway(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this failure needs a human rather than a retry.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            Self::Resolution(ResolutionError::AmbiguousUser { .. })
        )
    }
}

/// Result type alias for reconciliation operations.
pub type WebhookResult<T> = std::result::Result<T, WebhookError>;
