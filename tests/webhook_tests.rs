//! Webhook endpoint integration tests: signature enforcement at the HTTP
//! boundary plus end-to-end reconciliation against the in-memory store.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use common::*;
use lockin_server::billing::SubscriptionStatus;
use lockin_server::store::EntitlementStore;

fn webhook_request(payload: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload)).expect("request builds")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body collects");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

#[tokio::test]
async fn checkout_completed_grants_entitlement() {
    let app = test_app();
    let user_id = seed_user(&app.store, "buyer@example.com").await;

    let payload = checkout_payload(
        Utc::now().timestamp(),
        "subscription",
        "buyer@example.com",
        Some("sub_1"),
    );
    let signature = signature_header(&payload);

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"received": true}));

    assert_eq!(app.store.subscription_count(), 1);
    let row = app
        .store
        .subscription_by_external_id("sub_1")
        .await
        .unwrap()
        .expect("subscription row created");
    assert_eq!(row.user_id, user_id);
    assert_eq!(row.status, SubscriptionStatus::Active);

    let profile = app.store.profile(user_id).await.unwrap().unwrap();
    assert!(profile.has_active_subscription);
    assert_eq!(profile.stripe_customer_id.as_deref(), Some("cus_test"));
}

#[tokio::test]
async fn missing_signature_returns_bad_request() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let payload = checkout_payload(
        Utc::now().timestamp(),
        "subscription",
        "buyer@example.com",
        Some("sub_1"),
    );

    let response = app
        .router()
        .oneshot(webhook_request(payload, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.subscription_count(), 0);
}

#[tokio::test]
async fn wrong_secret_returns_bad_request() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let payload = checkout_payload(
        Utc::now().timestamp(),
        "subscription",
        "buyer@example.com",
        Some("sub_1"),
    );
    let timestamp = Utc::now().timestamp();
    let signature = format!(
        "t={timestamp},v1={}",
        compute_signature(&payload, "wrong_secret", timestamp)
    );

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.subscription_count(), 0);
}

#[tokio::test]
async fn tampered_body_returns_bad_request() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let payload = checkout_payload(
        Utc::now().timestamp(),
        "subscription",
        "buyer@example.com",
        Some("sub_1"),
    );
    let signature = signature_header(&payload);
    let mut tampered = payload;
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    let response = app
        .router()
        .oneshot(webhook_request(tampered, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stale_timestamp_returns_bad_request() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let payload = checkout_payload(
        Utc::now().timestamp(),
        "subscription",
        "buyer@example.com",
        Some("sub_1"),
    );
    // 10 minutes ago - beyond the 5-minute tolerance
    let stale = Utc::now().timestamp() - 600;
    let signature = format!(
        "t={stale},v1={}",
        compute_signature(&payload, WEBHOOK_SECRET, stale)
    );

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.subscription_count(), 0);
}

#[tokio::test]
async fn unrecognized_event_acknowledged_without_writes() {
    let app = test_app();

    let payload = event_payload(
        "invoice.payment_succeeded",
        Utc::now().timestamp(),
        serde_json::json!({"id": "in_1"}),
    );
    let signature = signature_header(&payload);

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"received": true}));
    assert_eq!(app.store.subscription_count(), 0);
    assert_eq!(app.store.purchase_count(), 0);
}

#[tokio::test]
async fn replayed_checkout_creates_one_row() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let created = Utc::now().timestamp();
    let payload = checkout_payload(created, "subscription", "buyer@example.com", Some("sub_1"));

    for _ in 0..3 {
        let signature = signature_header(&payload);
        let response = app
            .router()
            .oneshot(webhook_request(payload.clone(), Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.store.subscription_count(), 1);
}

#[tokio::test]
async fn subscription_deleted_revokes_entitlement() {
    let app = test_app();
    let user_id = seed_user(&app.store, "buyer@example.com").await;
    let bystander = seed_user(&app.store, "bystander@example.com").await;

    let t0 = Utc::now().timestamp();
    let checkout = checkout_payload(t0, "subscription", "buyer@example.com", Some("sub_1"));
    let signature = signature_header(&checkout);
    app.router()
        .oneshot(webhook_request(checkout, Some(signature)))
        .await
        .unwrap();

    let deleted = subscription_payload(t0 + 60, "customer.subscription.deleted", "sub_1", "active");
    let signature = signature_header(&deleted);
    let response = app
        .router()
        .oneshot(webhook_request(deleted, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let row = app
        .store
        .subscription_by_external_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, SubscriptionStatus::Canceled);
    assert!(!app.store.profile(user_id).await.unwrap().unwrap().has_active_subscription);
    // Other users' profiles are untouched.
    let bystander_profile = app.store.profile(bystander).await.unwrap().unwrap();
    assert!(!bystander_profile.has_active_subscription);
    assert!(bystander_profile.stripe_customer_id.is_none());
}

#[tokio::test]
async fn out_of_order_delivery_keeps_latest_state() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let t0 = Utc::now().timestamp();
    let checkout = checkout_payload(t0, "subscription", "buyer@example.com", Some("sub_1"));
    let signature = signature_header(&checkout);
    app.router()
        .oneshot(webhook_request(checkout, Some(signature)))
        .await
        .unwrap();

    // The chronologically-newer cancellation arrives first.
    let newer = subscription_payload(t0 + 120, "customer.subscription.deleted", "sub_1", "active");
    let signature = signature_header(&newer);
    app.router()
        .oneshot(webhook_request(newer, Some(signature)))
        .await
        .unwrap();

    // The older past_due update straggles in afterwards.
    let older = subscription_payload(t0 + 60, "customer.subscription.updated", "sub_1", "past_due");
    let signature = signature_header(&older);
    let response = app
        .router()
        .oneshot(webhook_request(older, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let row = app
        .store
        .subscription_by_external_id("sub_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, SubscriptionStatus::Canceled);
}

#[tokio::test]
async fn unknown_subscription_update_returns_server_error() {
    let app = test_app();
    seed_user(&app.store, "buyer@example.com").await;

    let payload = subscription_payload(
        Utc::now().timestamp(),
        "customer.subscription.updated",
        "sub_ghost",
        "past_due",
    );
    let signature = signature_header(&payload);

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    // 500 tells the processor to retry; no row was invented meanwhile.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.store.subscription_count(), 0);
}

#[tokio::test]
async fn one_time_purchase_is_recorded_once_without_entitlement() {
    let app = test_app();
    let user_id = seed_user(&app.store, "buyer@example.com").await;

    let payload = checkout_payload(Utc::now().timestamp(), "payment", "buyer@example.com", None);

    for _ in 0..2 {
        let signature = signature_header(&payload);
        let response = app
            .router()
            .oneshot(webhook_request(payload.clone(), Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.store.purchase_count(), 1);
    assert!(!app.store.profile(user_id).await.unwrap().unwrap().has_active_subscription);
}

#[tokio::test]
async fn checkout_for_unknown_email_returns_server_error() {
    let app = test_app();

    let payload = checkout_payload(
        Utc::now().timestamp(),
        "subscription",
        "stranger@example.com",
        Some("sub_1"),
    );
    let signature = signature_header(&payload);

    let response = app
        .router()
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    // UserNotFound may be a race with sign-up; 500 lets the processor retry.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.store.subscription_count(), 0);
}
