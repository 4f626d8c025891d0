pub mod checkout;
pub mod plans;
pub mod subscriptions;
pub mod webhooks;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use http::HeaderValue;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::ToSchema;

use crate::{middleware::ServiceAuthState, state::AppState};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// API version
    pub version: &'static str,
}

/// Health check endpoint
///
/// Returns the health status of the API service. This endpoint is typically used by
/// load balancers, monitoring systems, and orchestration tools to verify service availability.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn is_origin_allowed(origin_str: &str, cors_config: &config::CorsConfig) -> bool {
    if cors_config.exact_matches.iter().any(|o| o == origin_str) {
        return true;
    }

    if let Some(remainder) = origin_str.strip_prefix("http://localhost") {
        if remainder.is_empty() || remainder.starts_with(':') {
            return true;
        }
    }

    if let Some(remainder) = origin_str.strip_prefix("http://127.0.0.1") {
        if remainder.is_empty() || remainder.starts_with(':') {
            return true;
        }
    }

    if origin_str.starts_with("https://")
        && cors_config
            .wildcard_suffixes
            .iter()
            .any(|suffix| origin_str.ends_with(suffix))
    {
        return true;
    }

    false
}

/// Create the main API router with CORS configuration
pub fn create_router_with_cors(app_state: AppState, cors_config: config::CorsConfig) -> Router {
    // Create service auth state for middleware
    let service_auth_state = ServiceAuthState {
        service_api_key: app_state.service_api_key.clone(),
    };

    // Plan catalog routes (public, no auth required)
    let plan_routes = plans::create_plans_router();

    // Checkout routes (public, no auth required)
    let checkout_routes = checkout::create_checkout_router();

    // Webhook routes (public, verified by Stripe signature)
    let webhook_routes = webhooks::create_webhooks_router();

    // Subscription routes (requires service API key)
    let subscription_routes =
        subscriptions::create_subscriptions_router().layer(from_fn_with_state(
            service_auth_state,
            crate::middleware::service_auth_middleware,
        ));

    // Build the base router. All sub-routers carry their full /v1 paths, so
    // they are merged instead of nested.
    let router = Router::new()
        .route("/health", get(health_check))
        .merge(plan_routes)
        .merge(checkout_routes)
        .merge(webhook_routes)
        .merge(subscription_routes)
        .with_state(app_state);

    let cors_config_clone = cors_config.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request_parts: &http::request::Parts| {
                let origin_str = match origin.to_str() {
                    Ok(s) => s,
                    Err(_) => return false,
                };
                is_origin_allowed(origin_str, &cors_config_clone)
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    router.layer(cors)
}

/// Create the main API router with CORS settings taken from the environment
pub fn create_router(app_state: AppState) -> Router {
    create_router_with_cors(app_state, config::CorsConfig::default())
}
