use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Snapshot of a subscription resource as the payment provider reports it.
///
/// `current_period_end` and `trial_end` are optional because the provider
/// omits them on some subscription shapes (trial vs non-trial); callers must
/// check presence instead of assuming either field.
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub external_subscription_id: String,
    /// Raw provider status string, e.g. "trialing" or "past_due"
    pub status: String,
    pub cancel_at_period_end: bool,
    pub created: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
}

/// Input for creating a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionSpec {
    pub price_id: String,
    /// Trial propagated from the plan; None when the plan has no trial
    pub trial_period_days: Option<u32>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
    /// Provider customer id from an earlier checkout, reused when present
    pub external_customer_id: Option<String>,
    /// Carried through to the completed-session webhook event
    pub metadata: HashMap<String, String>,
    /// Idempotency key applied to the provider request when present
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedCheckoutSession {
    pub session_id: String,
    /// Hosted payment page URL; absent in some embedded integration modes
    pub url: Option<String>,
    /// Provider customer id minted with the session, when already known
    pub customer_id: Option<String>,
}

#[derive(Debug)]
pub enum PaymentGatewayError {
    /// No secret key configured
    NotConfigured,
    /// A provider-side id failed to parse
    InvalidId(String),
    /// Provider API call failed
    Api(String),
}

impl fmt::Display for PaymentGatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "Payment provider is not configured"),
            Self::InvalidId(id) => write!(f, "Invalid provider id: {}", id),
            Self::Api(msg) => write!(f, "Payment provider error: {}", msg),
        }
    }
}

impl std::error::Error for PaymentGatewayError {}

/// Port over the payment provider API. The subscription service talks to the
/// provider only through this trait, so tests can substitute a fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session in subscription mode
    async fn create_checkout_session(
        &self,
        spec: CheckoutSessionSpec,
    ) -> Result<CreatedCheckoutSession, PaymentGatewayError>;

    /// Fetch the current state of a subscription resource
    async fn fetch_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentGatewayError>;

    /// Price id of the first line item of a checkout session. The completed
    /// event does not embed the price, so it is fetched separately.
    async fn fetch_session_price_id(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, PaymentGatewayError>;

    /// Schedule or unschedule cancellation at the end of the current period
    async fn set_cancel_at_period_end(
        &self,
        external_subscription_id: &str,
        cancel: bool,
    ) -> Result<(), PaymentGatewayError>;

    /// Cancel the subscription immediately
    async fn cancel_now(&self, external_subscription_id: &str)
        -> Result<(), PaymentGatewayError>;
}
