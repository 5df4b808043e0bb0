//! Payment-processor event types.
//!
//! Strongly-typed representations of the webhook events the reconciler
//! consumes. The envelope keeps `data.object` as raw JSON and extracts a
//! typed object only once the classifier knows what shape to expect.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::billing::error::{WebhookError, WebhookResult};

/// Event types the reconciler recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `checkout.session.completed`
    CheckoutCompleted,
    /// `customer.subscription.updated`
    SubscriptionUpdated,
    /// `customer.subscription.deleted`
    SubscriptionDeleted,
    /// Anything else; acknowledged but not applied.
    Unknown,
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "checkout.session.completed" => Self::CheckoutCompleted,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            _ => Self::Unknown,
        })
    }
}

impl EventKind {
    /// String form of the recognized event types.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the reconciler has a handler for this type.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Generic event envelope as delivered by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique identifier for the event (the idempotency handle).
    pub id: String,

    /// Type of event.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time of event creation (Unix timestamp); drives the ordering guard.
    pub created: i64,

    /// API version used to render data.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Whether this is a live mode event.
    #[serde(default)]
    pub livemode: bool,

    /// Object containing event data.
    pub data: EventData,
}

/// Event data container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The actual event object (checkout session, subscription, ...).
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Parse from the raw, verified request body.
    pub fn from_bytes(bytes: &[u8]) -> WebhookResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    /// Get the typed event kind.
    pub fn kind(&self) -> EventKind {
        // Infallible error type means this can never fail
        EventKind::from_str(&self.event_type).unwrap()
    }

    /// Event creation time as a UTC timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Extract the checkout session from event data.
    pub fn as_checkout_session(&self) -> WebhookResult<CheckoutSession> {
        match self.kind() {
            EventKind::CheckoutCompleted => {
                serde_json::from_value(self.data.object.clone())
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))
            }
            _ => Err(WebhookError::InvalidPayload(format!(
                "event {} is not a checkout event",
                self.event_type
            ))),
        }
    }

    /// Extract the subscription from event data.
    pub fn as_subscription(&self) -> WebhookResult<Subscription> {
        match self.kind() {
            EventKind::SubscriptionUpdated | EventKind::SubscriptionDeleted => {
                serde_json::from_value(self.data.object.clone())
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))
            }
            _ => Err(WebhookError::InvalidPayload(format!(
                "event {} is not a subscription event",
                self.event_type
            ))),
        }
    }
}

// =============================================================================
// Checkout Session Types
// =============================================================================

/// Checkout mode the session was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// Recurring subscription.
    Subscription,
    /// One-time payment.
    Payment,
    /// Payment-method setup; nothing to reconcile.
    Setup,
    /// Forward-compatible catch-all.
    #[serde(other)]
    Unknown,
}

/// Processor checkout-session object (`cs_...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session id (cs_...).
    pub id: String,
    /// Checkout mode.
    pub mode: CheckoutMode,
    /// Billing-customer id (cus_...), when the processor created one.
    #[serde(default)]
    pub customer: Option<String>,
    /// Email the customer checked out with.
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Payment-intent id (one-time mode).
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Subscription id (subscription mode).
    #[serde(default)]
    pub subscription: Option<String>,
    /// Total amount in the smallest currency unit.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Payment status reported by the processor.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Metadata attached when the session was created.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CheckoutSession {
    /// The `customerEmail` metadata value our checkout endpoint attaches.
    pub fn metadata_email(&self) -> Option<&str> {
        self.metadata.get("customerEmail").and_then(|v| v.as_str())
    }
}

// =============================================================================
// Subscription Types
// =============================================================================

/// Processor subscription object (`sub_...`).
///
/// Also the shape returned by the outbound retrieve call, which the
/// reconciler uses when a checkout event carries only the subscription id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription id (sub_...).
    pub id: String,
    /// Billing-customer id (cus_...).
    #[serde(default)]
    pub customer: Option<String>,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Current billing period start (Unix timestamp).
    pub current_period_start: i64,
    /// Current billing period end (Unix timestamp).
    pub current_period_end: i64,
    /// Whether subscription will cancel at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// When the subscription was canceled (if applicable).
    #[serde(default)]
    pub canceled_at: Option<i64>,
}

impl Subscription {
    /// Period start as a UTC timestamp.
    pub fn period_start(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.current_period_start, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Period end as a UTC timestamp.
    pub fn period_end(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.current_period_end, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Whether this status grants the download entitlement.
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }

    /// String form, as stored in the subscriptions table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }
}
