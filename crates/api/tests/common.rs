#![allow(dead_code)]

use api::{create_router, AppState};
use axum::body::Bytes;
use axum_test::{TestResponse, TestServer};
use database::repositories::{PostgresPlanRepository, PostgresSubscriptionRepository};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use services::catalog::{BillingInterval, NewPlan, Plan, PlanRepository};
use services::payments::test_helpers::FakePaymentGateway;
use services::payments::ProviderSubscription;
use services::provisioning::test_helpers::{RecordingMailer, RecordingProvisioner};
use services::subscription::{
    Subscription, SubscriptionRepository, SubscriptionServiceConfig, SubscriptionServiceImpl,
};
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

// Global once cell to ensure migrations only run once across all tests
static MIGRATIONS_INITIALIZED: OnceCell<()> = OnceCell::const_new();

/// Webhook signing secret wired into every test server
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Service API key wired into every test server
pub const TEST_SERVICE_API_KEY: &str = "test-service-api-key";

/// Configuration for the test server
pub struct TestServerConfig {
    pub instance_urls: Vec<String>,
    pub provisioning_fails: bool,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            instance_urls: vec!["https://instance-1.test".to_string()],
            provisioning_fails: false,
        }
    }
}

/// Test server plus handles on the fakes behind it, so tests can seed
/// gateway state and assert on recorded side effects.
pub struct TestHarness {
    pub server: TestServer,
    pub gateway: Arc<FakePaymentGateway>,
    pub provisioner: Arc<RecordingProvisioner>,
    pub mailer: Arc<RecordingMailer>,
    pub pool: database::DbPool,
}

/// Create a test server with default configuration
pub async fn create_test_server() -> TestHarness {
    create_test_server_with_config(TestServerConfig::default()).await
}

/// Create a test server with custom configuration
pub async fn create_test_server_with_config(test_config: TestServerConfig) -> TestHarness {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::from_env();

    // Create database connection
    let db = database::Database::from_config(&config.database)
        .await
        .expect("Failed to connect to database");

    // Run migrations only once, even when tests run in parallel
    MIGRATIONS_INITIALIZED
        .get_or_init(|| async {
            db.run_migrations()
                .await
                .expect("Failed to run database migrations");
        })
        .await;

    let pool = db.pool().clone();

    // Real repositories against the test database, fakes for the outer world
    let plan_repo = db.plan_repository();
    let customer_repo = db.customer_repository();
    let shop_repo = db.shop_repository();
    let subscription_repo = db.subscription_repository();
    let webhook_repo = db.webhook_event_repository();

    let gateway = Arc::new(FakePaymentGateway::new());
    let provisioner = if test_config.provisioning_fails {
        Arc::new(RecordingProvisioner::failing())
    } else {
        Arc::new(RecordingProvisioner::new())
    };
    let mailer = Arc::new(RecordingMailer::new());

    let subscription_service = Arc::new(SubscriptionServiceImpl::new(SubscriptionServiceConfig {
        db_pool: pool.clone(),
        plan_repo: plan_repo.clone(),
        customer_repo,
        shop_repo,
        subscription_repo,
        webhook_repo,
        gateway: gateway.clone(),
        provisioner: provisioner.clone(),
        mailer: mailer.clone(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        success_url: "https://barbersites.com.br/sucesso".to_string(),
        cancel_url: "https://barbersites.com.br/cancelado".to_string(),
        instance_urls: test_config.instance_urls.clone(),
    }));

    // Create application state
    let app_state = AppState {
        subscription_service,
        plan_repository: plan_repo,
        service_api_key: Arc::new(TEST_SERVICE_API_KEY.to_string()),
    };

    // Create router
    let app = create_router(app_state);

    TestHarness {
        server: TestServer::new(app).expect("Failed to create test server"),
        gateway,
        provisioner,
        mailer,
        pool,
    }
}

/// Insert a plan with a unique name. `external_price_id` of `None` makes the
/// plan unsellable.
pub async fn seed_plan(
    harness: &TestHarness,
    trial_period_days: i32,
    external_price_id: Option<&str>,
) -> Plan {
    let repo = PostgresPlanRepository::new(harness.pool.clone());
    repo.create_plan(NewPlan {
        name: format!("Plano {}", Uuid::new_v4().simple()),
        description: "Plano de teste".to_string(),
        price_cents: 4990,
        billing_interval: Some(BillingInterval::Month),
        external_price_id: external_price_id.map(|s| s.to_string()),
        trial_period_days,
    })
    .await
    .expect("Failed to seed plan")
}

/// Handles to a subscription seeded through the webhook path
pub struct SeededSubscription {
    pub external_subscription_id: String,
    pub customer_email: String,
    pub plan_name: String,
}

/// Drive a full checkout.session.completed delivery so a subscription row
/// exists, linked to a fresh plan, customer and shop.
pub async fn seed_subscription(
    harness: &TestHarness,
    provider_status: &str,
    trial_period_days: i32,
) -> SeededSubscription {
    let plan = seed_plan(harness, trial_period_days, Some(&unique_id("price"))).await;
    let session_id = unique_id("cs");
    let external_subscription_id = unique_id("sub");
    let customer_email = unique_email("owner");

    harness.gateway.insert_subscription(ProviderSubscription {
        external_subscription_id: external_subscription_id.clone(),
        status: provider_status.to_string(),
        cancel_at_period_end: false,
        created: Some(Utc::now()),
        current_period_end: Some(Utc::now() + Duration::days(30)),
        trial_end: if trial_period_days > 0 {
            Some(Utc::now() + Duration::days(i64::from(trial_period_days)))
        } else {
            None
        },
    });
    harness.gateway.insert_session_price(
        &session_id,
        plan.external_price_id.as_deref().expect("seeded with price"),
    );

    let payload = json!({
        "id": unique_id("evt"),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "mode": "subscription",
                "subscription": external_subscription_id,
                "customer": unique_id("cus"),
                "metadata": {
                    "customer_email": customer_email,
                    "shop_name": unique_name("Barbearia")
                }
            }
        }
    })
    .to_string();

    let response = post_signed_webhook(&harness.server, &payload).await;
    assert_eq!(response.status_code(), 200, "Seeding webhook should succeed");

    SeededSubscription {
        external_subscription_id,
        customer_email,
        plan_name: plan.name,
    }
}

/// Fetch a subscription row directly for assertions
pub async fn find_subscription(harness: &TestHarness, external_id: &str) -> Option<Subscription> {
    let repo = PostgresSubscriptionRepository::new(harness.pool.clone());
    repo.find_by_external_id(external_id)
        .await
        .expect("Failed to query subscription")
}

/// Unique email per test; the database is shared across the test binary
pub fn unique_email(prefix: &str) -> String {
    format!("{}+{}@example.com", prefix, Uuid::new_v4().simple())
}

/// Unique name per test (shop names collide on UNIQUE(name, owner_id))
pub fn unique_name(prefix: &str) -> String {
    format!("{} {}", prefix, Uuid::new_v4().simple())
}

/// Unique provider-style id, e.g. `unique_id("sub")` -> "sub_..."
pub fn unique_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Sign a payload the way Stripe does: v1 is an HMAC-SHA256 over
/// "{timestamp}.{payload}" with the webhook secret.
pub fn sign_webhook(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    let signature: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("t={},v1={}", timestamp, signature)
}

/// POST a correctly signed webhook payload
pub async fn post_signed_webhook(server: &TestServer, payload: &str) -> TestResponse {
    let signature = sign_webhook(payload);
    server
        .post("/v1/payments/webhook")
        .add_header(
            http::HeaderName::from_static("stripe-signature"),
            http::HeaderValue::from_str(&signature).unwrap(),
        )
        .add_header(
            http::HeaderName::from_static("content-type"),
            http::HeaderValue::from_static("application/json"),
        )
        .bytes(Bytes::from(payload.as_bytes().to_vec()))
        .await
}

/// Authorization header value for the service-to-service endpoints
pub fn service_auth_header() -> http::HeaderValue {
    http::HeaderValue::from_str(&format!("Token {}", TEST_SERVICE_API_KEY)).unwrap()
}
