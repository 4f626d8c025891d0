//! Subscription status and cancellation tests. Run with:
//! `cargo test -p api --test subscriptions_tests`

mod common;

use common::{
    create_test_server, find_subscription, seed_subscription, service_auth_header, unique_id,
};
use serde_json::json;
use serial_test::serial;
use services::subscription::SubscriptionStatus;

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_status_requires_auth() {
    let harness = create_test_server().await;
    let response = harness
        .server
        .get(&format!("/v1/subscriptions/{}/status", unique_id("sub")))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_status_rejects_malformed_auth_header() {
    let harness = create_test_server().await;
    let response = harness
        .server
        .get(&format!("/v1/subscriptions/{}/status", unique_id("sub")))
        .add_header(
            http::HeaderName::from_static("authorization"),
            http::HeaderValue::from_static("Bearer some-token"),
        )
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_status_rejects_wrong_key() {
    let harness = create_test_server().await;
    let response = harness
        .server
        .get(&format!("/v1/subscriptions/{}/status", unique_id("sub")))
        .add_header(
            http::HeaderName::from_static("authorization"),
            http::HeaderValue::from_static("Token wrong-key"),
        )
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_status_returns_subscription_view() {
    let harness = create_test_server().await;
    let seeded = seed_subscription(&harness, "trialing", 7).await;

    let response = harness
        .server
        .get(&format!(
            "/v1/subscriptions/{}/status",
            seeded.external_subscription_id
        ))
        .add_header(
            http::HeaderName::from_static("authorization"),
            service_auth_header(),
        )
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body.get("external_subscription_id").and_then(|v| v.as_str()),
        Some(seeded.external_subscription_id.as_str())
    );
    assert_eq!(body.get("status"), Some(&json!("trialing")));
    assert_eq!(body.get("cancel_at_period_end"), Some(&json!(false)));
    assert!(body.get("trial_end").and_then(|v| v.as_str()).is_some());
    assert_eq!(
        body.get("plan_name").and_then(|v| v.as_str()),
        Some(seeded.plan_name.as_str())
    );
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_status_unknown_subscription_not_found() {
    let harness = create_test_server().await;
    let response = harness
        .server
        .get(&format!("/v1/subscriptions/{}/status", unique_id("sub")))
        .add_header(
            http::HeaderName::from_static("authorization"),
            service_auth_header(),
        )
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_cancel_requires_auth() {
    let harness = create_test_server().await;
    let response = harness
        .server
        .post(&format!("/v1/subscriptions/{}/cancel", unique_id("sub")))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_cancel_trial_plan_cancels_immediately() {
    let harness = create_test_server().await;
    let seeded = seed_subscription(&harness, "trialing", 7).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/subscriptions/{}/cancel",
            seeded.external_subscription_id
        ))
        .add_header(
            http::HeaderName::from_static("authorization"),
            service_auth_header(),
        )
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body.get("mode"), Some(&json!("immediate")));

    let cancel_now_calls = harness
        .gateway
        .cancel_now_calls
        .lock()
        .expect("lock poisoned");
    assert_eq!(cancel_now_calls.len(), 1);
    assert_eq!(cancel_now_calls[0], seeded.external_subscription_id);
    drop(cancel_now_calls);
    assert!(harness
        .gateway
        .cancel_at_period_end_calls
        .lock()
        .expect("lock poisoned")
        .is_empty());

    // Local state is untouched; it converges through the webhook
    let subscription = find_subscription(&harness, &seeded.external_subscription_id)
        .await
        .expect("Subscription row should exist");
    assert_eq!(subscription.status, SubscriptionStatus::Trialing);
    assert!(subscription.access_granted);
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_cancel_paid_plan_cancels_at_period_end() {
    let harness = create_test_server().await;
    let seeded = seed_subscription(&harness, "active", 0).await;

    let response = harness
        .server
        .post(&format!(
            "/v1/subscriptions/{}/cancel",
            seeded.external_subscription_id
        ))
        .add_header(
            http::HeaderName::from_static("authorization"),
            service_auth_header(),
        )
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body.get("mode"), Some(&json!("at_period_end")));

    let flag_calls = harness
        .gateway
        .cancel_at_period_end_calls
        .lock()
        .expect("lock poisoned");
    assert_eq!(flag_calls.len(), 1);
    assert_eq!(
        flag_calls[0],
        (seeded.external_subscription_id.clone(), true)
    );
    drop(flag_calls);
    assert!(harness
        .gateway
        .cancel_now_calls
        .lock()
        .expect("lock poisoned")
        .is_empty());

    let subscription = find_subscription(&harness, &seeded.external_subscription_id)
        .await
        .expect("Subscription row should exist");
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert!(
        !subscription.cancel_at_period_end,
        "The flag lands later, via customer.subscription.updated"
    );
}

#[tokio::test]
#[serial(subscriptions_tests)]
async fn test_cancel_unknown_subscription_not_found() {
    let harness = create_test_server().await;
    let response = harness
        .server
        .post(&format!("/v1/subscriptions/{}/cancel", unique_id("sub")))
        .add_header(
            http::HeaderName::from_static("authorization"),
            service_auth_header(),
        )
        .await;
    assert_eq!(response.status_code(), 404);
}
