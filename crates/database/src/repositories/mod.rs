pub mod customer_repository;
pub mod plan_repository;
pub mod shop_repository;
pub mod subscription_repository;
pub mod webhook_event_repository;

pub use customer_repository::PostgresCustomerRepository;
pub use plan_repository::PostgresPlanRepository;
pub use shop_repository::PostgresShopRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
