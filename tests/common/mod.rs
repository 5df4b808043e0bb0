//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use lockin_server::auth::{Principal, StaticIdentityProvider};
use lockin_server::billing::{
    CheckoutRequest, CreatedCheckout, GatewayError, PaymentGateway, Subscription, WebhookConfig,
};
use lockin_server::config::AppConfig;
use lockin_server::handlers::{router, AppState};
use lockin_server::storage::StaticStorage;
use lockin_server::store::{MemoryStore, NewProfile};
use lockin_server::EntitlementStore;

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const DOWNLOAD_BASE: &str = "https://downloads.lockin.test";

/// Gateway stub: fixed checkout URL, active subscription for any id.
pub struct StubGateway;

#[async_trait::async_trait]
impl PaymentGateway for StubGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CreatedCheckout, GatewayError> {
        Ok(CreatedCheckout {
            id: "cs_test_stub".to_string(),
            url: format!(
                "https://checkout.stripe.com/c/pay/cs_test_stub#{}",
                request.customer_email
            ),
        })
    }

    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, GatewayError> {
        Ok(serde_json::from_value(serde_json::json!({
            "id": id,
            "customer": "cus_test",
            "status": "active",
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "cancel_at_period_end": false
        }))
        .expect("stub subscription deserializes"))
    }
}

/// Everything a test drives: the router plus handles on the fakes.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub identity: Arc<StaticIdentityProvider>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }
}

/// Build an app over in-memory boundaries.
pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let identity = Arc::new(StaticIdentityProvider::new());
    let state = Arc::new(AppState::new(
        AppConfig::test_config(),
        WebhookConfig::test_config(),
        store.clone(),
        identity.clone(),
        Arc::new(StaticStorage::new(DOWNLOAD_BASE)),
        Arc::new(StubGateway),
    ));
    TestApp {
        state,
        store,
        identity,
    }
}

/// Seed a profile and return its user id.
pub async fn seed_user(store: &MemoryStore, email: &str) -> Uuid {
    store
        .create_profile(NewProfile {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: None,
        })
        .await
        .expect("profile seeds")
        .id
}

/// Register a bearer token for a user.
pub fn seed_token(identity: &StaticIdentityProvider, token: &str, user_id: Uuid, email: &str) {
    identity.insert_token(
        token,
        Principal {
            user_id,
            email: email.to_string(),
            username: None,
            created_at: Some(Utc::now()),
        },
    );
}

pub fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Well-formed signature header for a payload, stamped now.
pub fn signature_header(payload: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    format!(
        "t={timestamp},v1={}",
        compute_signature(payload, WEBHOOK_SECRET, timestamp)
    )
}

/// Checkout-completed event payload.
pub fn checkout_payload(created: i64, mode: &str, email: &str, subscription: Option<&str>) -> Vec<u8> {
    let mut object = serde_json::json!({
        "id": "cs_test_1",
        "mode": mode,
        "customer": "cus_test",
        "customer_email": email,
        "amount_total": 900,
        "currency": "usd",
        "payment_status": "paid",
        "metadata": {"customerEmail": email}
    });
    if let Some(subscription) = subscription {
        object["subscription"] = serde_json::json!(subscription);
    }
    if mode == "payment" {
        object["payment_intent"] = serde_json::json!("pi_test_1");
    }
    event_payload("checkout.session.completed", created, object)
}

/// Subscription lifecycle event payload.
pub fn subscription_payload(created: i64, event_type: &str, sub_id: &str, status: &str) -> Vec<u8> {
    event_payload(
        event_type,
        created,
        serde_json::json!({
            "id": sub_id,
            "customer": "cus_test",
            "status": status,
            "current_period_start": created,
            "current_period_end": created + 2_592_000,
            "cancel_at_period_end": false
        }),
    )
}

pub fn event_payload(event_type: &str, created: i64, object: serde_json::Value) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{event_type}_{created}"),
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": {"object": object}
    })
    .to_string()
    .into_bytes()
}
