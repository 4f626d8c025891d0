use crate::{error::ApiError, state::AppState};
use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Json, Router};
use services::subscription::SubscriptionError;

/// Handle Stripe webhook events (public endpoint - no auth required).
///
/// The status code steers provider redelivery: 2xx acknowledges, 4xx marks the
/// delivery as rejected, 5xx asks for a retry.
pub async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    tracing::info!("Received Stripe webhook");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;

    app_state
        .subscription_service
        .handle_stripe_webhook(&body, signature)
        .await
        .map_err(|e| match e {
            SubscriptionError::WebhookVerificationFailed(msg) => {
                tracing::warn!(error = ?msg, "Webhook verification failed");
                ApiError::bad_request("Invalid webhook signature")
            }
            SubscriptionError::NotConfigured => {
                ApiError::service_unavailable("Stripe is not configured")
            }
            SubscriptionError::DatabaseError(msg) => {
                tracing::error!(error = ?msg, "Database error processing webhook");
                ApiError::internal_server_error("Failed to process webhook")
            }
            _ => {
                tracing::error!(error = ?e, "Failed to process webhook");
                ApiError::internal_server_error("Failed to process webhook")
            }
        })?;

    Ok(Json(serde_json::json!({ "received": true })))
}

/// Create webhook router (public, signature-verified in the service)
pub fn create_webhooks_router() -> Router<AppState> {
    Router::new().route("/v1/payments/webhook", post(handle_stripe_webhook))
}
