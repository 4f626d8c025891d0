pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};

use anyhow::Result;
use repositories::{
    PostgresCustomerRepository, PostgresPlanRepository, PostgresShopRepository,
    PostgresSubscriptionRepository, PostgresWebhookEventRepository,
};
use services::catalog::{CustomerRepository, PlanRepository, ShopRepository};
use services::subscription::{SubscriptionRepository, WebhookEventRepository};
use std::sync::Arc;

/// Database service combining all repositories
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database service from a connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new database service from configuration
    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn plan_repository(&self) -> Arc<dyn PlanRepository> {
        Arc::new(PostgresPlanRepository::new(self.pool.clone()))
    }

    pub fn customer_repository(&self) -> Arc<dyn CustomerRepository> {
        Arc::new(PostgresCustomerRepository::new(self.pool.clone()))
    }

    pub fn shop_repository(&self) -> Arc<dyn ShopRepository> {
        Arc::new(PostgresShopRepository::new(self.pool.clone()))
    }

    pub fn subscription_repository(&self) -> Arc<dyn SubscriptionRepository> {
        Arc::new(PostgresSubscriptionRepository::new(self.pool.clone()))
    }

    pub fn webhook_event_repository(&self) -> Arc<dyn WebhookEventRepository> {
        Arc::new(PostgresWebhookEventRepository::new(self.pool.clone()))
    }
}
