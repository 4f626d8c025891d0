pub mod catalog;
pub mod credentials;
pub mod payments;
pub mod provisioning;
pub mod subscription;
pub mod types;

pub use types::{CustomerId, PlanId, ShopId, SubscriptionId};
