use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub subscription_service: Arc<dyn services::subscription::ports::SubscriptionService>,
    pub plan_repository: Arc<dyn services::catalog::PlanRepository>,
    /// Shared secret for the service-to-service subscription endpoints
    pub service_api_key: Arc<String>,
}
