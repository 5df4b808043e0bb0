//! Reconciler orchestration.
//!
//! Sequences the pipeline for one inbound event:
//!
//! ```text
//! Received ──▶ Verified ──▶ Classified ──▶ Resolved ──▶ Applied ──▶ Acknowledged
//!     │                          │              │            │
//!     ▼                          └──────────────┴────────────┘
//!  Rejected (400)                          Failed (500)
//! ```
//!
//! Processing is synchronous within the request: the acknowledgment is only
//! sent once the write has landed (or been skipped as stale), so a non-2xx
//! answer reliably drives the processor's redelivery. `Ignore` intents
//! short-circuit straight to `Acknowledged`.
//!
//! Resolution and application share one bounded window; if the store stalls
//! past it the request fails rather than hangs, and the redelivered event
//! finds idempotent writes.

use std::sync::Arc;

use tokio::time::timeout;

use crate::billing::classifier::{classify, Intent};
use crate::billing::client::PaymentGateway;
use crate::billing::config::WebhookConfig;
use crate::billing::error::{WebhookError, WebhookResult, WriteError};
use crate::billing::events::WebhookEvent;
use crate::billing::resolver::resolve;
use crate::billing::signature::SignatureVerifier;
use crate::billing::writer::{apply, ApplyResult};
use crate::store::EntitlementStore;

/// Pipeline stages, for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Verified,
    Classified,
    Resolved,
    Applied,
    Acknowledged,
    Rejected,
    Failed,
}

impl Stage {
    /// String form for structured logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Verified => "verified",
            Self::Classified => "classified",
            Self::Resolved => "resolved",
            Self::Applied => "applied",
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// What the reconciler did with an acknowledged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    /// A recognized intent was applied (or skipped as stale/duplicate).
    Applied(ApplyResult),
    /// The event type is not one we act on.
    Ignored {
        /// External event type.
        event_type: String,
    },
}

/// Orchestrates verification, classification, resolution, and application
/// for inbound webhook deliveries.
pub struct Reconciler {
    verifier: SignatureVerifier,
    config: WebhookConfig,
    store: Arc<dyn EntitlementStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl Reconciler {
    /// Build a reconciler over the given store and gateway.
    pub fn new(
        config: WebhookConfig,
        store: Arc<dyn EntitlementStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            verifier: SignatureVerifier::new(&config),
            config,
            store,
            gateway,
        }
    }

    /// Header the signature is expected in.
    pub fn signature_header(&self) -> &str {
        &self.config.signature_header
    }

    /// Process one inbound delivery: raw body bytes plus the signature
    /// header value, if the request carried one.
    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> WebhookResult<Receipt> {
        let header = signature_header.unwrap_or_default();
        if let Err(e) = self.verifier.verify(payload, header) {
            tracing::warn!(stage = Stage::Rejected.as_str(), error = %e, "webhook rejected");
            return Err(WebhookError::Verification(e));
        }

        let event = WebhookEvent::from_bytes(payload).map_err(|e| {
            tracing::warn!(stage = Stage::Verified.as_str(), error = %e, "unparseable event");
            e
        })?;
        let event_id = event.id.clone();
        let event_type = event.event_type.clone();

        let intent = classify(&event).map_err(|e| {
            tracing::warn!(
                stage = Stage::Classified.as_str(),
                event_id = %event_id,
                event_type = %event_type,
                error = %e,
                "malformed event object"
            );
            e
        })?;

        if let Intent::Ignore { event_type } = &intent {
            tracing::debug!(
                stage = Stage::Acknowledged.as_str(),
                event_id = %event_id,
                event_type = %event_type,
                "event ignored"
            );
            return Ok(Receipt::Ignored {
                event_type: event_type.clone(),
            });
        }

        let result = timeout(self.config.store_timeout, async {
            let user_id = resolve(self.store.as_ref(), &intent).await?;
            tracing::debug!(
                stage = Stage::Resolved.as_str(),
                event_id = %event_id,
                user_id = %user_id,
                intent = intent.name(),
                "identity resolved"
            );
            apply(
                self.store.as_ref(),
                self.gateway.as_ref(),
                &intent,
                user_id,
                &event,
            )
            .await
        })
        .await
        .unwrap_or_else(|_| {
            Err(WriteError::Timeout(self.config.store_timeout.as_secs()).into())
        });

        match result {
            Ok(applied) => {
                tracing::info!(
                    stage = Stage::Acknowledged.as_str(),
                    event_id = %event_id,
                    event_type = %event_type,
                    intent = intent.name(),
                    outcome = applied.name(),
                    "event reconciled"
                );
                Ok(Receipt::Applied(applied))
            }
            Err(e) => {
                if e.needs_operator() {
                    tracing::error!(
                        stage = Stage::Failed.as_str(),
                        event_id = %event_id,
                        event_type = %event_type,
                        operator_alert = true,
                        error = %e,
                        "data-integrity fault; retries will not resolve this"
                    );
                } else {
                    tracing::error!(
                        stage = Stage::Failed.as_str(),
                        event_id = %event_id,
                        event_type = %event_type,
                        error = %e,
                        "event processing failed"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use uuid::Uuid;

    use super::*;
    use crate::billing::client::{CheckoutRequest, CreatedCheckout, GatewayError, GatewayResult};
    use crate::billing::error::{ResolutionError, VerificationError};
    use crate::billing::events::Subscription;
    use crate::store::{MemoryStore, NewProfile};

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8]) -> String {
        let timestamp = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    struct FixedGateway;

    #[async_trait::async_trait]
    impl PaymentGateway for FixedGateway {
        async fn create_checkout_session(
            &self,
            _request: CheckoutRequest,
        ) -> GatewayResult<CreatedCheckout> {
            Err(GatewayError::MissingCheckoutUrl)
        }

        async fn retrieve_subscription(&self, id: &str) -> GatewayResult<Subscription> {
            Ok(serde_json::from_value(serde_json::json!({
                "id": id,
                "customer": "cus_test",
                "status": "active",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }))
            .unwrap())
        }
    }

    async fn reconciler_with_user(email: &str) -> (Reconciler, std::sync::Arc<MemoryStore>) {
        let store = std::sync::Arc::new(MemoryStore::new());
        store
            .create_profile(NewProfile {
                id: Uuid::new_v4(),
                email: email.to_string(),
                username: None,
            })
            .await
            .unwrap();
        let reconciler = Reconciler::new(
            WebhookConfig::test_config(),
            store.clone(),
            Arc::new(FixedGateway),
        );
        (reconciler, store)
    }

    fn checkout_payload(email: &str) -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": Utc::now().timestamp(),
            "livemode": false,
            "data": {"object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_test",
                "customer_email": email,
                "subscription": "sub_1",
                "payment_status": "paid",
                "metadata": {"customerEmail": email}
            }}
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn signed_checkout_event_is_applied() {
        let (reconciler, store) = reconciler_with_user("buyer@example.com").await;
        let payload = checkout_payload("buyer@example.com");
        let header = sign(&payload);

        let receipt = reconciler.process(&payload, Some(&header)).await.unwrap();

        assert!(matches!(receipt, Receipt::Applied(ApplyResult::SubscriptionSynced { .. })));
        assert_eq!(store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn missing_header_is_rejected_without_side_effects() {
        let (reconciler, store) = reconciler_with_user("buyer@example.com").await;
        let payload = checkout_payload("buyer@example.com");

        let err = reconciler.process(&payload, None).await.unwrap_err();

        assert!(matches!(
            err,
            WebhookError::Verification(VerificationError::MissingSignature)
        ));
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let (reconciler, store) = reconciler_with_user("buyer@example.com").await;
        let payload = checkout_payload("buyer@example.com");
        let header = sign(&payload);
        let mut tampered = payload.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        let err = reconciler.process(&tampered, Some(&header)).await.unwrap_err();

        assert!(matches!(
            err,
            WebhookError::Verification(VerificationError::BadSignature)
        ));
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unrecognized_event_is_acknowledged() {
        let (reconciler, _store) = reconciler_with_user("buyer@example.com").await;
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "invoice.payment_succeeded",
            "created": Utc::now().timestamp(),
            "livemode": false,
            "data": {"object": {"id": "in_1"}}
        })
        .to_string()
        .into_bytes();
        let header = sign(&payload);

        let receipt = reconciler.process(&payload, Some(&header)).await.unwrap();

        assert_eq!(
            receipt,
            Receipt::Ignored {
                event_type: "invoice.payment_succeeded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unknown_subscription_update_fails_with_zero_writes() {
        let (reconciler, store) = reconciler_with_user("buyer@example.com").await;
        let payload = serde_json::json!({
            "id": "evt_3",
            "type": "customer.subscription.updated",
            "created": Utc::now().timestamp(),
            "livemode": false,
            "data": {"object": {
                "id": "sub_ghost",
                "status": "past_due",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }}
        })
        .to_string()
        .into_bytes();
        let header = sign(&payload);

        let err = reconciler.process(&payload, Some(&header)).await.unwrap_err();

        assert!(matches!(
            err,
            WebhookError::Resolution(ResolutionError::SubscriptionNotFound(_))
        ));
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn garbage_body_with_valid_signature_is_bad_request() {
        let (reconciler, _store) = reconciler_with_user("buyer@example.com").await;
        let payload = b"not json at all".to_vec();
        let header = sign(&payload);

        let err = reconciler.process(&payload, Some(&header)).await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidPayload(_)));
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }
}
