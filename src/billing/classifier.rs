//! Event classification.
//!
//! Maps a verified event onto the small set of internal intents the writer
//! knows how to apply. Classification happens exactly once per event; from
//! here on the pipeline matches on the tagged [`Intent`] instead of
//! re-branching on event-type strings.

use crate::billing::error::WebhookResult;
use crate::billing::events::{
    CheckoutMode, CheckoutSession, EventKind, Subscription, SubscriptionStatus, WebhookEvent,
};

/// Internal action the reconciler must apply, decoupled from the external
/// event's raw shape.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Subscription-mode checkout completed: establish the subscription row
    /// and the profile entitlement.
    CreateOrUpdateSubscription {
        /// The completed checkout session.
        checkout: CheckoutSession,
    },

    /// One-time checkout completed: append an audit record. Does not grant
    /// entitlement - the only paid tier is the recurring subscription.
    RecordPurchase {
        /// The completed checkout session.
        checkout: CheckoutSession,
    },

    /// Subscription lifecycle change: update the matched row and recompute
    /// the owning profile's entitlement.
    UpdateSubscriptionStatus {
        /// Subscription object from the event.
        subscription: Subscription,
        /// Status override (deletion events force `canceled` regardless of
        /// the object's last reported status).
        forced_status: Option<SubscriptionStatus>,
    },

    /// Not an event we act on; acknowledged so the processor stops retrying.
    Ignore {
        /// External event type, for the log line.
        event_type: String,
    },
}

impl Intent {
    /// Short name for structured logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateOrUpdateSubscription { .. } => "create_or_update_subscription",
            Self::RecordPurchase { .. } => "record_purchase",
            Self::UpdateSubscriptionStatus { .. } => "update_subscription_status",
            Self::Ignore { .. } => "ignore",
        }
    }
}

/// Classify a verified event.
///
/// Fails only when a recognized event type carries an object of the wrong
/// shape, which is a malformed payload (400), not a retryable condition.
pub fn classify(event: &WebhookEvent) -> WebhookResult<Intent> {
    match event.kind() {
        EventKind::CheckoutCompleted => {
            let checkout = event.as_checkout_session()?;
            match checkout.mode {
                CheckoutMode::Subscription => Ok(Intent::CreateOrUpdateSubscription { checkout }),
                CheckoutMode::Payment => Ok(Intent::RecordPurchase { checkout }),
                // Setup-mode sessions move no money and create no
                // subscription; nothing to reconcile.
                CheckoutMode::Setup | CheckoutMode::Unknown => Ok(Intent::Ignore {
                    event_type: event.event_type.clone(),
                }),
            }
        }
        EventKind::SubscriptionUpdated => Ok(Intent::UpdateSubscriptionStatus {
            subscription: event.as_subscription()?,
            forced_status: None,
        }),
        EventKind::SubscriptionDeleted => Ok(Intent::UpdateSubscriptionStatus {
            subscription: event.as_subscription()?,
            forced_status: Some(SubscriptionStatus::Canceled),
        }),
        EventKind::Unknown => Ok(Intent::Ignore {
            event_type: event.event_type.clone(),
        }),
    }
}
