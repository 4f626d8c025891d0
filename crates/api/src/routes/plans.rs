use crate::{error::ApiError, state::AppState};
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use services::catalog::Plan;
use services::PlanId;
use utoipa::ToSchema;

/// Plan as exposed to the storefront
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanResponse {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    /// Price in centavos
    pub price_cents: i64,
    /// Billing interval, when known (e.g. "month")
    pub billing_interval: Option<String>,
    /// Trial length in days; 0 means no trial
    pub trial_period_days: i32,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            price_cents: plan.price_cents,
            billing_interval: plan.billing_interval.map(|b| b.to_string()),
            trial_period_days: plan.trial_period_days,
        }
    }
}

/// Response containing the sellable subscription plans
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListPlansResponse {
    /// Plans that can be checked out
    pub plans: Vec<PlanResponse>,
}

/// List the plans available for checkout
#[utoipa::path(
    get,
    path = "/v1/plans",
    tag = "Plans",
    responses(
        (status = 200, description = "Plans retrieved successfully", body = ListPlansResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn list_plans(
    State(app_state): State<AppState>,
) -> Result<Json<ListPlansResponse>, ApiError> {
    tracing::debug!("Listing sellable plans");

    let plans = app_state
        .plan_repository
        .list_sellable_plans()
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "Failed to list plans");
            ApiError::internal_server_error("Failed to list plans")
        })?;

    Ok(Json(ListPlansResponse {
        plans: plans.into_iter().map(PlanResponse::from).collect(),
    }))
}

/// Create plans router (public, no auth)
pub fn create_plans_router() -> Router<AppState> {
    Router::new().route("/v1/plans", get(list_plans))
}
