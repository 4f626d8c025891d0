use crate::{
    error::{validation_details, ApiError},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use services::subscription::{CheckoutRequest, CheckoutSessionCreated, SubscriptionError};
use services::PlanId;

/// Create a hosted checkout session for a plan
#[utoipa::path(
    post,
    path = "/v1/plans/{plan_id}/checkout-session",
    tag = "Checkout",
    params(
        ("plan_id" = PlanId, Path, description = "Plan to check out")
    ),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created successfully", body = CheckoutSessionCreated),
        (status = 400, description = "Validation failed", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Plan not found", body = crate::error::ApiErrorResponse),
        (status = 422, description = "Plan has no provider price", body = crate::error::ApiErrorResponse),
        (status = 502, description = "Payment provider request failed", body = crate::error::ApiErrorResponse),
        (status = 503, description = "Stripe not configured", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn create_checkout_session(
    State(app_state): State<AppState>,
    Path(plan_id): Path<PlanId>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSessionCreated>, ApiError> {
    tracing::info!(
        "Creating checkout session for plan_id={}, shop_name={}",
        plan_id,
        req.shop_name
    );

    let created = app_state
        .subscription_service
        .create_checkout_session(plan_id, req)
        .await
        .map_err(|e| match e {
            SubscriptionError::ValidationFailed(errors) => {
                ApiError::bad_request("Validation failed")
                    .with_details(validation_details(&errors))
            }
            SubscriptionError::PlanNotFound(id) => {
                ApiError::not_found(format!("Plan not found: {}", id))
            }
            SubscriptionError::PlanNotSellable(id) => ApiError::unprocessable_entity(format!(
                "Plan has no provider price configured: {}",
                id
            )),
            SubscriptionError::NotConfigured => {
                ApiError::service_unavailable("Stripe is not configured")
            }
            SubscriptionError::StripeError(msg) => {
                tracing::error!(error = ?msg, "Stripe error creating checkout session");
                ApiError::bad_gateway("Payment provider request failed")
            }
            SubscriptionError::DatabaseError(msg) => {
                tracing::error!(error = ?msg, "Database error creating checkout session");
                ApiError::internal_server_error("Failed to create checkout session")
            }
            _ => {
                tracing::error!(error = ?e, "Failed to create checkout session");
                ApiError::internal_server_error("Failed to create checkout session")
            }
        })?;

    Ok(Json(created))
}

/// Create checkout router (public, no auth)
pub fn create_checkout_router() -> Router<AppState> {
    Router::new().route(
        "/v1/plans/{plan_id}/checkout-session",
        post(create_checkout_session),
    )
}
