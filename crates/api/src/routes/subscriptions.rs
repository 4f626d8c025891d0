use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use services::subscription::{CancellationOutcome, SubscriptionError, SubscriptionStatusView};

/// Get the stored state of a subscription by its provider id
#[utoipa::path(
    get,
    path = "/v1/subscriptions/{external_id}/status",
    tag = "Subscriptions",
    params(
        ("external_id" = String, Path, description = "Provider-side subscription id")
    ),
    responses(
        (status = 200, description = "Subscription state retrieved", body = SubscriptionStatusView),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Subscription not found", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("service_api_key" = [])
    )
)]
pub async fn get_subscription_status(
    State(app_state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<SubscriptionStatusView>, ApiError> {
    tracing::debug!("Fetching subscription status for external_id={}", external_id);

    let view = app_state
        .subscription_service
        .get_subscription_status(&external_id)
        .await
        .map_err(|e| match e {
            SubscriptionError::UnknownSubscription(id) => {
                ApiError::not_found(format!("Subscription not found: {}", id))
            }
            SubscriptionError::DatabaseError(msg) => {
                tracing::error!(error = ?msg, "Database error fetching subscription status");
                ApiError::internal_server_error("Failed to fetch subscription status")
            }
            _ => {
                tracing::error!(error = ?e, "Failed to fetch subscription status");
                ApiError::internal_server_error("Failed to fetch subscription status")
            }
        })?;

    Ok(Json(view))
}

/// Ask the provider to cancel a subscription.
///
/// Paid plans are scheduled to cancel at period end; trial-bearing plans are
/// canceled immediately. Local state is not touched here, it converges
/// through the resulting webhook.
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{external_id}/cancel",
    tag = "Subscriptions",
    params(
        ("external_id" = String, Path, description = "Provider-side subscription id")
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = CancellationOutcome),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Subscription not found", body = crate::error::ApiErrorResponse),
        (status = 502, description = "Payment provider request failed", body = crate::error::ApiErrorResponse),
        (status = 503, description = "Stripe not configured", body = crate::error::ApiErrorResponse)
    ),
    security(
        ("service_api_key" = [])
    )
)]
pub async fn cancel_subscription(
    State(app_state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<CancellationOutcome>, ApiError> {
    tracing::info!("Cancellation requested for external_id={}", external_id);

    let outcome = app_state
        .subscription_service
        .request_cancellation(&external_id)
        .await
        .map_err(|e| match e {
            SubscriptionError::UnknownSubscription(id) => {
                ApiError::not_found(format!("Subscription not found: {}", id))
            }
            SubscriptionError::NotConfigured => {
                ApiError::service_unavailable("Stripe is not configured")
            }
            SubscriptionError::StripeError(msg) => {
                tracing::error!(error = ?msg, "Stripe error canceling subscription");
                ApiError::bad_gateway("Payment provider request failed")
            }
            SubscriptionError::DatabaseError(msg) => {
                tracing::error!(error = ?msg, "Database error canceling subscription");
                ApiError::internal_server_error("Failed to cancel subscription")
            }
            _ => {
                tracing::error!(error = ?e, "Failed to cancel subscription");
                ApiError::internal_server_error("Failed to cancel subscription")
            }
        })?;

    Ok(Json(outcome))
}

/// Create subscription router (service-to-service, key required)
pub fn create_subscriptions_router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/subscriptions/{external_id}/status",
            get(get_subscription_status),
        )
        .route(
            "/v1/subscriptions/{external_id}/cancel",
            post(cancel_subscription),
        )
}
