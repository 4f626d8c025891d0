use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;

/// State for the service-to-service key check
#[derive(Clone)]
pub struct ServiceAuthState {
    pub service_api_key: Arc<String>,
}

/// Extract the key from the Authorization header
fn extract_key_from_request(request: &Request) -> Result<&str, ApiError> {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    let auth_value = auth_header.ok_or_else(|| {
        tracing::warn!("No authorization header found");
        ApiError::missing_auth_header()
    })?;

    auth_value.strip_prefix("Token ").ok_or_else(|| {
        tracing::warn!("Authorization header does not start with 'Token '");
        ApiError::invalid_auth_header()
    })
}

/// Guards the service-to-service subscription endpoints with a shared key
pub async fn service_auth_middleware(
    State(state): State<ServiceAuthState>,
    request: Request,
    next: Next,
) -> Response {
    if state.service_api_key.is_empty() {
        tracing::error!("Service API key is not configured, rejecting request");
        return ApiError::service_unavailable("Service authentication is not configured")
            .into_response();
    }

    let key = match extract_key_from_request(&request) {
        Ok(key) => key.to_string(),
        Err(e) => return e.into_response(),
    };

    if key != *state.service_api_key {
        tracing::warn!("Service API key mismatch");
        return ApiError::unauthorized("Invalid service API key").into_response();
    }

    next.run(request).await
}
