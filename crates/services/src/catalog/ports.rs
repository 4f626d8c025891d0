use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CustomerId, PlanId, ShopId};

/// Two-letter codes for the Brazilian states, the only values accepted for
/// `Shop.state`.
pub const BRAZILIAN_STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Billing interval mirrored from the payment provider's price configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription plan. Prices are stored in centavos to avoid floating point;
/// a plan is sellable once it carries the provider's price id.
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub billing_interval: Option<BillingInterval>,
    pub external_price_id: Option<String>,
    pub trial_period_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a plan (admin/seed path).
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub billing_interval: Option<BillingInterval>,
    pub external_price_id: Option<String>,
    pub trial_period_days: i32,
}

/// Account holder who owns one or more shops. Email is the business key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub terms_accepted: bool,
    pub wants_notifications: bool,
    /// Payment-provider customer id, set lazily on first successful
    /// checkout-session creation
    pub external_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub terms_accepted: bool,
    pub wants_notifications: bool,
    pub external_customer_id: Option<String>,
}

/// Barbershop record. `instance_url` points at the tenant storefront instance
/// once one has been allocated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub owner_id: Option<CustomerId>,
    pub instance_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShop {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn get_plan(&self, plan_id: PlanId) -> anyhow::Result<Option<Plan>>;

    /// Look up a plan by the provider price id carried in webhook line items
    async fn get_plan_by_external_price_id(
        &self,
        external_price_id: &str,
    ) -> anyhow::Result<Option<Plan>>;

    /// Plans with an external price id, i.e. the ones the storefront can sell
    async fn list_sellable_plans(&self) -> anyhow::Result<Vec<Plan>>;

    async fn create_plan(&self, plan: NewPlan) -> anyhow::Result<Plan>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Atomic get-or-create keyed by email. Returns the customer and whether
    /// the row was newly inserted.
    async fn get_or_create(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        customer: NewCustomer,
    ) -> anyhow::Result<(Customer, bool)>;

    async fn get_customer(&self, customer_id: CustomerId) -> anyhow::Result<Option<Customer>>;

    /// Backfill the provider customer id. The update only applies while the
    /// column is still NULL; returns whether a row was changed.
    async fn set_external_customer_id(
        &self,
        customer_id: CustomerId,
        external_customer_id: &str,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// Atomic get-or-create keyed by (name, owner). `default_instance_url` is
    /// only applied on insert; an existing shop keeps its allocation.
    async fn get_or_create(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        owner_id: CustomerId,
        shop: NewShop,
        default_instance_url: Option<&str>,
    ) -> anyhow::Result<(Shop, bool)>;

    async fn get_shop(&self, shop_id: ShopId) -> anyhow::Result<Option<Shop>>;

    /// Total number of shops, used for round-robin instance allocation
    async fn count(&self) -> anyhow::Result<i64>;

    /// Persist an instance allocation for a shop created before the pool was
    /// configured
    async fn set_instance_url(&self, shop_id: ShopId, instance_url: &str) -> anyhow::Result<()>;
}
