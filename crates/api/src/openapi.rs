use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::OpenApi;

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "BarberSites Billing API",
        description = "Subscription billing and tenant provisioning for barbershop sites.",
        version = "1.0.0",
        contact(name = "BarberSites Team", email = "suporte@barbersites.com.br"),
        license(name = "MIT",)
    ),
    paths(
        // Plan catalog endpoints
        crate::routes::plans::list_plans,
        // Checkout endpoints
        crate::routes::checkout::create_checkout_session,
        // Subscription endpoints
        crate::routes::subscriptions::get_subscription_status,
        crate::routes::subscriptions::cancel_subscription,
    ),
    components(schemas(
        // Plan catalog models
        crate::routes::plans::PlanResponse,
        crate::routes::plans::ListPlansResponse,
        // Checkout models
        services::subscription::CheckoutRequest,
        services::subscription::CheckoutSessionCreated,
        // Subscription models
        services::subscription::SubscriptionStatus,
        services::subscription::SubscriptionStatusView,
        services::subscription::CancellationMode,
        services::subscription::CancellationOutcome,
        crate::error::ApiErrorResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Plans", description = "Public plan catalog endpoints"),
        (name = "Checkout", description = "Checkout session creation endpoints"),
        (name = "Subscriptions", description = "Service-to-service subscription management endpoints")
    )
)]
pub struct ApiDoc;

/// Security scheme addon for the service API key
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "service_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "Service API key, supplied as 'Token <key>'",
                ))),
            )
        }
    }
}
