use api::{create_router_with_cors, ApiDoc, AppState};
use services::{
    payments::StripeGateway,
    provisioning::{DisabledMailer, HttpTenantProvisioner, SmtpCredentialMailer},
    subscription::{SubscriptionServiceConfig, SubscriptionServiceImpl},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
        eprintln!("Continuing with environment variables...");
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,api=debug,services=debug,database=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting API server...");

    // Load configuration from environment
    let config = config::Config::from_env();

    tracing::info!(
        "Database: {}:{}/{}",
        config.database.host,
        config.database.port,
        config.database.database
    );
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);

    // Create database and run migrations
    tracing::info!("Connecting to database...");
    let db = database::Database::from_config(&config.database).await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    let pool = db.pool().clone();

    // Create repositories
    let plan_repo = db.plan_repository();
    let customer_repo = db.customer_repository();
    let shop_repo = db.shop_repository();
    let subscription_repo = db.subscription_repository();
    let webhook_repo = db.webhook_event_repository();

    // Create services
    tracing::info!("Initializing services...");
    let gateway = Arc::new(StripeGateway::new(&config.stripe));
    let provisioner = Arc::new(HttpTenantProvisioner::new(&config.provisioning));

    let mailer: Arc<dyn services::provisioning::CredentialMailer> =
        if config.email.is_configured() {
            Arc::new(SmtpCredentialMailer::new(&config.email)?)
        } else {
            tracing::warn!("SMTP is not configured; credential emails are disabled");
            Arc::new(DisabledMailer)
        };

    if !config.provisioning.is_configured() {
        tracing::warn!("Provisioning is not configured; admin users will not be created");
    }

    let subscription_service = Arc::new(SubscriptionServiceImpl::new(SubscriptionServiceConfig {
        db_pool: pool.clone(),
        plan_repo: plan_repo.clone(),
        customer_repo,
        shop_repo,
        subscription_repo,
        webhook_repo,
        gateway,
        provisioner,
        mailer,
        webhook_secret: config.stripe.webhook_secret.clone(),
        success_url: config.checkout.success_url.clone(),
        cancel_url: config.checkout.cancel_url.clone(),
        instance_urls: config.provisioning.instance_urls.clone(),
    }));

    // Create application state
    let app_state = AppState {
        subscription_service,
        plan_repository: plan_repo,
        service_api_key: Arc::new(config.service_auth.api_key.clone()),
    };

    // Create router
    let app = create_router_with_cors(app_state, config.cors.clone())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("📚 Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
