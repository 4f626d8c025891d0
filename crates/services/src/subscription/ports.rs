use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::NewCustomer;
use crate::{CustomerId, PlanId, ShopId, SubscriptionId};

/// Lifecycle states a subscription moves through, mirroring the provider's
/// vocabulary. Stored as text and parsed on read.
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Parses a provider status string. Returns None for statuses outside the
    /// handled lifecycle (e.g. "incomplete"), which callers acknowledge
    /// without mutating local state.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "unpaid" => Some(SubscriptionStatus::Unpaid),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a status transition means for the tenant's storefront access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Grant,
    RevokeNow,
    /// Access stays up until the already-paid period runs out; the provider
    /// sends a deletion event at that point.
    RevokeAtPeriodEnd,
}

/// Maps a subscription status to the access decision for the shop.
pub fn access_action_for(status: SubscriptionStatus, cancel_at_period_end: bool) -> AccessAction {
    match status {
        SubscriptionStatus::Trialing | SubscriptionStatus::Active => AccessAction::Grant,
        SubscriptionStatus::PastDue | SubscriptionStatus::Unpaid => AccessAction::RevokeNow,
        SubscriptionStatus::Canceled => {
            if cancel_at_period_end {
                AccessAction::RevokeAtPeriodEnd
            } else {
                AccessAction::RevokeNow
            }
        }
    }
}

/// Database model for subscription records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub shop_id: ShopId,
    /// Provider-side subscription id; absent only for rows created before the
    /// provider assigned one.
    pub external_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub last_payment_transaction_id: Option<String>,
    pub access_granted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a subscription row from a completed checkout
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub shop_id: ShopId,
    pub external_subscription_id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub last_payment_transaction_id: Option<String>,
    pub access_granted: bool,
}

/// Partial update applied when the provider reports a status change.
/// None fields keep the stored value.
#[derive(Debug, Clone)]
pub struct SubscriptionStatusPatch {
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub period_end: Option<DateTime<Utc>>,
    pub access_granted: Option<bool>,
}

/// Stored webhook event, used as the idempotency ledger
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: uuid::Uuid,
    pub provider: String,
    pub event_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Result of storing a webhook event, with idempotency flag
#[derive(Debug, Clone)]
pub struct StoreEventResult {
    pub event: WebhookEvent,
    /// True if the event was newly inserted; false if it already existed (duplicate/retry)
    pub is_new: bool,
}

/// Per-field validation failure surfaced to API callers
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Checkout initiation payload: who is buying and for which shop
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub shop_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub terms_accepted: bool,
    #[serde(default)]
    pub wants_notifications: bool,
}

impl CheckoutRequest {
    pub fn customer(&self) -> NewCustomer {
        NewCustomer {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
            terms_accepted: self.terms_accepted,
            wants_notifications: self.wants_notifications,
            external_customer_id: None,
        }
    }
}

/// Hosted checkout session handle returned to the storefront
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionCreated {
    pub session_id: String,
    pub url: Option<String>,
}

/// Subscription state as exposed to service-to-service callers
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionStatusView {
    pub external_subscription_id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub plan_name: String,
}

/// How a cancellation request was carried out at the provider
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationMode {
    AtPeriodEnd,
    Immediate,
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub mode: CancellationMode,
}

/// Error types for subscription operations
#[derive(Debug)]
pub enum SubscriptionError {
    /// Checkout payload failed validation
    ValidationFailed(Vec<FieldError>),
    /// Plan id not found
    PlanNotFound(String),
    /// Plan exists but has no provider price attached
    PlanNotSellable(String),
    /// No local subscription for the given provider id
    UnknownSubscription(String),
    /// Webhook referenced a provider price with no local plan
    UnknownPlan(String),
    /// Stripe is not configured
    NotConfigured,
    /// Stripe API error
    StripeError(String),
    /// Database error
    DatabaseError(String),
    /// Webhook signature verification failed
    WebhookVerificationFailed(String),
    /// Internal error
    InternalError(String),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::ValidationFailed(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                write!(f, "Validation failed for fields: {}", fields.join(", "))
            }
            SubscriptionError::PlanNotFound(id) => write!(f, "Plan not found: {}", id),
            SubscriptionError::PlanNotSellable(id) => {
                write!(f, "Plan has no provider price configured: {}", id)
            }
            SubscriptionError::UnknownSubscription(id) => {
                write!(f, "No subscription found for provider id: {}", id)
            }
            SubscriptionError::UnknownPlan(price_id) => {
                write!(f, "No plan found for provider price: {}", price_id)
            }
            SubscriptionError::NotConfigured => write!(f, "Stripe is not configured"),
            SubscriptionError::StripeError(msg) => write!(f, "Stripe API error: {}", msg),
            SubscriptionError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            SubscriptionError::WebhookVerificationFailed(msg) => {
                write!(f, "Webhook verification failed: {}", msg)
            }
            SubscriptionError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl From<anyhow::Error> for SubscriptionError {
    fn from(err: anyhow::Error) -> Self {
        SubscriptionError::DatabaseError(err.to_string())
    }
}

/// Repository interface for subscription persistence
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a subscription keyed by its provider id. Returns the row and
    /// whether it was newly created; a concurrent or repeated insert for the
    /// same provider id returns the existing row with false.
    async fn create_if_absent(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        subscription: NewSubscription,
    ) -> anyhow::Result<(Subscription, bool)>;

    /// Looks up a subscription by its provider-side id
    async fn find_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> anyhow::Result<Option<Subscription>>;

    /// Applies a status patch to the row with the given provider id.
    /// Returns None when no such row exists.
    async fn apply_status_update(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        external_subscription_id: &str,
        patch: SubscriptionStatusPatch,
    ) -> anyhow::Result<Option<Subscription>>;

    /// Marks a successful payment: status becomes active, the trial marker is
    /// cleared and access is granted. Transaction id and period end are only
    /// overwritten when present.
    async fn record_payment_success(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        external_subscription_id: &str,
        transaction_id: Option<&str>,
        period_end: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<Subscription>>;
}

/// Repository interface for the webhook event ledger
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Stores a webhook event keyed by (provider, event_id). The is_new flag
    /// on the result is the idempotency signal: false means this delivery was
    /// already processed.
    async fn store_event(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        provider: &str,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<StoreEventResult>;
}

/// Service interface for checkout, webhook processing and subscription queries
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Creates a hosted checkout session for the given plan, upserting the
    /// customer and shop rows first
    async fn create_checkout_session(
        &self,
        plan_id: PlanId,
        request: CheckoutRequest,
    ) -> Result<CheckoutSessionCreated, SubscriptionError>;

    /// Verifies and processes a provider webhook delivery
    async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), SubscriptionError>;

    /// Returns the stored state for a subscription by provider id
    async fn get_subscription_status(
        &self,
        external_subscription_id: &str,
    ) -> Result<SubscriptionStatusView, SubscriptionError>;

    /// Asks the provider to cancel: at period end for paid plans, immediately
    /// for trial-bearing plans. Local state is updated by the resulting webhook.
    async fn request_cancellation(
        &self,
        external_subscription_id: &str,
    ) -> Result<CancellationOutcome, SubscriptionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_status_parse_rejects_unhandled() {
        assert_eq!(SubscriptionStatus::parse("incomplete"), None);
        assert_eq!(SubscriptionStatus::parse("incomplete_expired"), None);
        assert_eq!(SubscriptionStatus::parse(""), None);
    }

    #[test]
    fn test_access_action_table() {
        assert_eq!(
            access_action_for(SubscriptionStatus::Trialing, false),
            AccessAction::Grant
        );
        assert_eq!(
            access_action_for(SubscriptionStatus::Active, false),
            AccessAction::Grant
        );
        assert_eq!(
            access_action_for(SubscriptionStatus::Active, true),
            AccessAction::Grant
        );
        assert_eq!(
            access_action_for(SubscriptionStatus::PastDue, false),
            AccessAction::RevokeNow
        );
        assert_eq!(
            access_action_for(SubscriptionStatus::Unpaid, true),
            AccessAction::RevokeNow
        );
        assert_eq!(
            access_action_for(SubscriptionStatus::Canceled, false),
            AccessAction::RevokeNow
        );
        assert_eq!(
            access_action_for(SubscriptionStatus::Canceled, true),
            AccessAction::RevokeAtPeriodEnd
        );
    }

    #[test]
    fn test_checkout_request_normalizes_customer_fields() {
        let request = CheckoutRequest {
            full_name: "  João da Silva  ".to_string(),
            email: " Dono@Example.COM ".to_string(),
            phone: " 11987654321 ".to_string(),
            shop_name: "Barbearia Alfa".to_string(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            terms_accepted: true,
            wants_notifications: false,
        };

        let customer = request.customer();
        assert_eq!(customer.full_name, "João da Silva");
        assert_eq!(customer.email, "dono@example.com");
        assert_eq!(customer.phone, "11987654321");
        assert!(customer.terms_accepted);
        assert!(customer.external_customer_id.is_none());
    }
}
