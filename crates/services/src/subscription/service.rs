use super::ports::{
    access_action_for, AccessAction, CancellationMode, CancellationOutcome, CheckoutRequest,
    CheckoutSessionCreated, FieldError, NewSubscription, SubscriptionError, SubscriptionRepository,
    SubscriptionService, SubscriptionStatus, SubscriptionStatusPatch, SubscriptionStatusView,
    WebhookEventRepository,
};
use crate::catalog::{
    CustomerRepository, NewCustomer, NewShop, PlanRepository, ShopRepository, BRAZILIAN_STATES,
};
use crate::credentials;
use crate::payments::{
    CheckoutSessionSpec, PaymentGateway, PaymentGatewayError, ProviderSubscription,
};
use crate::provisioning::{AdminUserRequest, CredentialEmail, CredentialMailer, TenantProvisioner};
use crate::{PlanId, ShopId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use stripe::{Webhook, WebhookError};

const WEBHOOK_PROVIDER: &str = "stripe";

/// Configuration for SubscriptionServiceImpl
pub struct SubscriptionServiceConfig {
    pub db_pool: deadpool_postgres::Pool,
    pub plan_repo: Arc<dyn PlanRepository>,
    pub customer_repo: Arc<dyn CustomerRepository>,
    pub shop_repo: Arc<dyn ShopRepository>,
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub webhook_repo: Arc<dyn WebhookEventRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub provisioner: Arc<dyn TenantProvisioner>,
    pub mailer: Arc<dyn CredentialMailer>,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Tenant instance pool for round-robin allocation
    pub instance_urls: Vec<String>,
}

pub struct SubscriptionServiceImpl {
    db_pool: deadpool_postgres::Pool,
    plan_repo: Arc<dyn PlanRepository>,
    customer_repo: Arc<dyn CustomerRepository>,
    shop_repo: Arc<dyn ShopRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    webhook_repo: Arc<dyn WebhookEventRepository>,
    gateway: Arc<dyn PaymentGateway>,
    provisioner: Arc<dyn TenantProvisioner>,
    mailer: Arc<dyn CredentialMailer>,
    webhook_secret: String,
    success_url: String,
    cancel_url: String,
    instance_urls: Vec<String>,
}

impl SubscriptionServiceImpl {
    pub fn new(config: SubscriptionServiceConfig) -> Self {
        Self {
            db_pool: config.db_pool,
            plan_repo: config.plan_repo,
            customer_repo: config.customer_repo,
            shop_repo: config.shop_repo,
            subscription_repo: config.subscription_repo,
            webhook_repo: config.webhook_repo,
            gateway: config.gateway,
            provisioner: config.provisioner,
            mailer: config.mailer,
            webhook_secret: config.webhook_secret,
            success_url: config.success_url,
            cancel_url: config.cancel_url,
            instance_urls: config.instance_urls,
        }
    }
}

fn map_gateway_error(err: PaymentGatewayError) -> SubscriptionError {
    match err {
        PaymentGatewayError::NotConfigured => SubscriptionError::NotConfigured,
        PaymentGatewayError::InvalidId(msg) => SubscriptionError::StripeError(msg),
        PaymentGatewayError::Api(msg) => SubscriptionError::StripeError(msg),
    }
}

fn validate_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.contains(char::is_whitespace) {
        return false;
    }
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(|c| c.is_ascii_digit()).count()
}

fn validate_checkout_request(request: &CheckoutRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if request.full_name.trim().is_empty() {
        errors.push(FieldError {
            field: "full_name".to_string(),
            message: "Full name is required".to_string(),
        });
    }
    if !validate_email(&request.email) {
        errors.push(FieldError {
            field: "email".to_string(),
            message: "Invalid email address".to_string(),
        });
    }
    let phone_digits = digit_count(&request.phone);
    if !(10..=11).contains(&phone_digits) {
        errors.push(FieldError {
            field: "phone".to_string(),
            message: "Phone must have 10 or 11 digits".to_string(),
        });
    }
    if request.shop_name.trim().is_empty() {
        errors.push(FieldError {
            field: "shop_name".to_string(),
            message: "Shop name is required".to_string(),
        });
    }
    if !request.postal_code.trim().is_empty() && digit_count(&request.postal_code) != 8 {
        errors.push(FieldError {
            field: "postal_code".to_string(),
            message: "Postal code must have 8 digits".to_string(),
        });
    }
    let state = request.state.trim().to_uppercase();
    if !state.is_empty() && !BRAZILIAN_STATES.contains(&state.as_str()) {
        errors.push(FieldError {
            field: "state".to_string(),
            message: "State must be a valid two-letter code".to_string(),
        });
    }

    errors
}

/// Hourly-bucketed idempotency key so checkout retries within the hour reuse
/// the provider-side session
fn checkout_idempotency_key(email: &str, price_id: &str) -> String {
    let hour_bucket = Utc::now().timestamp() / 3600;
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", email, price_id, hour_bucket));
    format!("{:x}", hasher.finalize())
}

fn username_from_email(email: &str) -> &str {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local,
        _ => email,
    }
}

/// Period end and transaction id for a newly observed subscription. Trials
/// have neither settled yet.
fn settlement_fields(
    fresh: &ProviderSubscription,
    payment_intent: Option<String>,
) -> (Option<DateTime<Utc>>, Option<String>) {
    if fresh.trial_end.is_some() {
        (None, None)
    } else {
        (fresh.current_period_end, payment_intent)
    }
}

/// Provider object references arrive either as a bare id string or expanded
/// into the full object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IdOrObject {
    Id(String),
    Object { id: String },
}

impl IdOrObject {
    fn id(&self) -> &str {
        match self {
            IdOrObject::Id(id) => id,
            IdOrObject::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    mode: Option<String>,
    subscription: Option<IdOrObject>,
    customer: Option<IdOrObject>,
    payment_intent: Option<IdOrObject>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: String,
    subscription: Option<IdOrObject>,
    payment_intent: Option<IdOrObject>,
    period_end: Option<i64>,
}

fn event_data_object<T: serde::de::DeserializeOwned>(
    event: &serde_json::Value,
) -> Result<T, SubscriptionError> {
    let object = event
        .get("data")
        .and_then(|d| d.get("object"))
        .cloned()
        .ok_or_else(|| SubscriptionError::InternalError("Event missing data.object".to_string()))?;
    serde_json::from_value(object)
        .map_err(|e| SubscriptionError::InternalError(format!("Malformed event object: {}", e)))
}

fn timestamp_to_datetime(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
}

/// Post-commit side-effect work for a freshly created subscription
struct ProvisioningJob {
    shop_id: ShopId,
    instance_url: Option<String>,
    customer_full_name: String,
    customer_email: String,
    external_subscription_id: String,
}

/// Picks the next instance from the pool for a shop about to be created.
/// `existing_shops` is the shop count before the insert.
fn allocate_instance_url(instance_urls: &[String], existing_shops: i64) -> Option<&str> {
    if instance_urls.is_empty() {
        return None;
    }
    let index = (existing_shops.max(0) as usize) % instance_urls.len();
    Some(instance_urls[index].as_str())
}

impl SubscriptionServiceImpl {
    async fn handle_checkout_completed(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        event: &serde_json::Value,
    ) -> Result<Option<ProvisioningJob>, SubscriptionError> {
        let session: CheckoutSessionObject = event_data_object(event)?;

        if session.mode.as_deref() != Some("subscription") {
            tracing::info!(
                "Ignoring non-subscription checkout session: session_id={}",
                session.id
            );
            return Ok(None);
        }

        let external_subscription_id = session
            .subscription
            .as_ref()
            .map(|s| s.id().to_string())
            .ok_or_else(|| {
                SubscriptionError::InternalError(format!(
                    "Checkout session missing subscription id: session_id={}",
                    session.id
                ))
            })?;

        let customer_email = session
            .metadata
            .get("customer_email")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SubscriptionError::InternalError(format!(
                    "Checkout session metadata missing customer_email: session_id={}",
                    session.id
                ))
            })?;
        let shop_name = session
            .metadata
            .get("shop_name")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SubscriptionError::InternalError(format!(
                    "Checkout session metadata missing shop_name: session_id={}",
                    session.id
                ))
            })?;

        // The event payload carries a stale snapshot; fetch the live resource
        let fresh = self
            .gateway
            .fetch_subscription(&external_subscription_id)
            .await
            .map_err(map_gateway_error)?;

        let status = match SubscriptionStatus::parse(&fresh.status) {
            Some(status) => status,
            None => {
                tracing::warn!(
                    "Unhandled provider status on checkout, acknowledging without record: \
                     subscription_id={}, status={}",
                    external_subscription_id,
                    fresh.status
                );
                return Ok(None);
            }
        };

        // The price id is not embedded in the event; list the session line items
        let price_id = self
            .gateway
            .fetch_session_price_id(&session.id)
            .await
            .map_err(map_gateway_error)?
            .ok_or_else(|| {
                SubscriptionError::InternalError(format!(
                    "Checkout session has no line item price: session_id={}",
                    session.id
                ))
            })?;

        let plan = self
            .plan_repo
            .get_plan_by_external_price_id(&price_id)
            .await?
            .ok_or_else(|| SubscriptionError::UnknownPlan(price_id.clone()))?;

        let existing_shops = self.shop_repo.count().await?;

        let external_customer_id = session.customer.as_ref().map(|c| c.id().to_string());
        let (customer, customer_created) = self
            .customer_repo
            .get_or_create(
                txn,
                NewCustomer {
                    full_name: username_from_email(&customer_email).to_string(),
                    email: customer_email.clone(),
                    phone: String::new(),
                    terms_accepted: true,
                    wants_notifications: false,
                    external_customer_id: external_customer_id.clone(),
                },
            )
            .await?;

        if customer_created {
            tracing::warn!(
                "Customer created from webhook, checkout row was missing: email={}",
                customer.email
            );
        } else if customer.external_customer_id.is_none() {
            if let Some(ref external_id) = external_customer_id {
                self.customer_repo
                    .set_external_customer_id(customer.id, external_id)
                    .await?;
            }
        }

        let (shop, _) = self
            .shop_repo
            .get_or_create(
                txn,
                customer.id,
                NewShop {
                    name: shop_name,
                    address: String::new(),
                    city: String::new(),
                    state: String::new(),
                    postal_code: String::new(),
                },
                allocate_instance_url(&self.instance_urls, existing_shops),
            )
            .await?;

        let payment_intent = session.payment_intent.as_ref().map(|p| p.id().to_string());
        let (period_end, transaction_id) = settlement_fields(&fresh, payment_intent);
        let access_granted = matches!(
            status,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active
        );

        let (subscription, created) = self
            .subscription_repo
            .create_if_absent(
                txn,
                NewSubscription {
                    customer_id: customer.id,
                    plan_id: plan.id,
                    shop_id: shop.id,
                    external_subscription_id: external_subscription_id.clone(),
                    status,
                    cancel_at_period_end: fresh.cancel_at_period_end,
                    period_start: fresh.created,
                    period_end,
                    trial_end: fresh.trial_end,
                    last_payment_transaction_id: transaction_id,
                    access_granted,
                },
            )
            .await?;

        if !created {
            tracing::info!(
                "Subscription already recorded, skipping provisioning: external_id={}",
                external_subscription_id
            );
            return Ok(None);
        }

        tracing::info!(
            "Subscription created: external_id={}, plan={}, shop_id={}, status={}",
            external_subscription_id,
            plan.name,
            shop.id,
            subscription.status
        );

        Ok(Some(ProvisioningJob {
            shop_id: shop.id,
            instance_url: shop.instance_url.clone(),
            customer_full_name: customer.full_name.clone(),
            customer_email: customer.email.clone(),
            external_subscription_id,
        }))
    }

    async fn handle_subscription_updated(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        event: &serde_json::Value,
    ) -> Result<(), SubscriptionError> {
        let object: SubscriptionObject = event_data_object(event)?;

        let status = match SubscriptionStatus::parse(&object.status) {
            Some(status) => status,
            None => {
                tracing::warn!(
                    "Unhandled provider status on update, acknowledging without change: \
                     subscription_id={}, status={}",
                    object.id,
                    object.status
                );
                return Ok(());
            }
        };

        let existing = self
            .subscription_repo
            .find_by_external_id(&object.id)
            .await?
            .ok_or_else(|| SubscriptionError::UnknownSubscription(object.id.clone()))?;

        if existing.status == SubscriptionStatus::Canceled && status != SubscriptionStatus::Canceled
        {
            tracing::warn!(
                "Canceled subscription reported with status {}, overwriting anyway: external_id={}",
                status,
                object.id
            );
        }

        let access_granted = match access_action_for(status, object.cancel_at_period_end) {
            AccessAction::Grant => Some(true),
            AccessAction::RevokeNow => Some(false),
            AccessAction::RevokeAtPeriodEnd => {
                tracing::info!(
                    "Cancellation takes effect at period end, access kept: external_id={}",
                    object.id
                );
                None
            }
        };

        self.subscription_repo
            .apply_status_update(
                txn,
                &object.id,
                SubscriptionStatusPatch {
                    status,
                    cancel_at_period_end: object.cancel_at_period_end,
                    period_end: timestamp_to_datetime(object.current_period_end),
                    access_granted,
                },
            )
            .await?
            .ok_or_else(|| SubscriptionError::UnknownSubscription(object.id.clone()))?;

        tracing::info!(
            "Subscription updated: external_id={}, status={}, cancel_at_period_end={}",
            object.id,
            status,
            object.cancel_at_period_end
        );
        Ok(())
    }

    async fn handle_subscription_deleted(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        event: &serde_json::Value,
    ) -> Result<(), SubscriptionError> {
        let object: SubscriptionObject = event_data_object(event)?;

        // Deletion is authoritative; access goes regardless of any deferral
        self.subscription_repo
            .apply_status_update(
                txn,
                &object.id,
                SubscriptionStatusPatch {
                    status: SubscriptionStatus::Canceled,
                    cancel_at_period_end: object.cancel_at_period_end,
                    period_end: timestamp_to_datetime(object.current_period_end),
                    access_granted: Some(false),
                },
            )
            .await?
            .ok_or_else(|| SubscriptionError::UnknownSubscription(object.id.clone()))?;

        tracing::info!("Subscription canceled: external_id={}", object.id);
        Ok(())
    }

    async fn handle_invoice_payment_succeeded(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        event: &serde_json::Value,
    ) -> Result<(), SubscriptionError> {
        let invoice: InvoiceObject = event_data_object(event)?;

        let external_subscription_id = match invoice.subscription.as_ref() {
            Some(subscription) => subscription.id().to_string(),
            None => {
                tracing::info!(
                    "Invoice not linked to a subscription, ignoring: invoice_id={}",
                    invoice.id
                );
                return Ok(());
            }
        };

        let transaction_id = invoice.payment_intent.as_ref().map(|p| p.id().to_string());
        self.subscription_repo
            .record_payment_success(
                txn,
                &external_subscription_id,
                transaction_id.as_deref(),
                timestamp_to_datetime(invoice.period_end),
            )
            .await?
            .ok_or_else(|| {
                SubscriptionError::UnknownSubscription(external_subscription_id.clone())
            })?;

        tracing::info!(
            "Payment recorded: external_id={}, invoice_id={}",
            external_subscription_id,
            invoice.id
        );
        Ok(())
    }

    /// Runs after the webhook transaction commits. Never fails the delivery:
    /// the provider has already been acknowledged, so every failure here is
    /// terminal and only logged.
    async fn run_provisioning(&self, job: ProvisioningJob) {
        let instance_url = match job.instance_url {
            Some(url) => url,
            None => {
                // Shops from before the pool existed have no allocation yet
                let existing_shops = match self.shop_repo.count().await {
                    Ok(count) => count,
                    Err(e) => {
                        tracing::error!(
                            "Instance allocation failed, skipping provisioning: shop_id={}, error={:#}",
                            job.shop_id,
                            e
                        );
                        return;
                    }
                };
                let url = match allocate_instance_url(&self.instance_urls, existing_shops) {
                    Some(url) => url.to_string(),
                    None => {
                        tracing::error!(
                            "No tenant instances configured, skipping provisioning: shop_id={}",
                            job.shop_id
                        );
                        return;
                    }
                };
                if let Err(e) = self.shop_repo.set_instance_url(job.shop_id, &url).await {
                    tracing::error!(
                        "Failed to persist instance allocation, skipping provisioning: \
                         shop_id={}, error={:#}",
                        job.shop_id,
                        e
                    );
                    return;
                }
                url
            }
        };

        let username = username_from_email(&job.customer_email).to_string();
        let password = match credentials::generate_password(credentials::DEFAULT_PASSWORD_LENGTH) {
            Ok(password) => password,
            Err(e) => {
                tracing::error!(
                    "Password generation failed, skipping provisioning: shop_id={}, error={}",
                    job.shop_id,
                    e
                );
                return;
            }
        };

        let request = AdminUserRequest {
            username: username.clone(),
            email: job.customer_email.clone(),
            password: password.clone(),
            external_subscription_id: job.external_subscription_id.clone(),
        };

        if let Err(e) = self
            .provisioner
            .create_admin_user(&instance_url, &request)
            .await
        {
            // No credential email when the admin account does not exist
            tracing::error!(
                "Provisioning failed, credential email suppressed: shop_id={}, \
                 instance_url={}, error={}",
                job.shop_id,
                instance_url,
                e
            );
            return;
        }

        let email = CredentialEmail {
            recipient: job.customer_email.clone(),
            full_name: job.customer_full_name.clone(),
            username,
            password,
            login_url: format!("{}/admin/", instance_url.trim_end_matches('/')),
        };
        if let Err(e) = self.mailer.send_credentials(&email).await {
            tracing::error!(
                "Credential email failed: recipient={}, error={}",
                job.customer_email,
                e
            );
        }
    }
}

#[async_trait]
impl SubscriptionService for SubscriptionServiceImpl {
    async fn create_checkout_session(
        &self,
        plan_id: PlanId,
        request: CheckoutRequest,
    ) -> Result<CheckoutSessionCreated, SubscriptionError> {
        let errors = validate_checkout_request(&request);
        if !errors.is_empty() {
            return Err(SubscriptionError::ValidationFailed(errors));
        }

        let plan = self
            .plan_repo
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound(plan_id.to_string()))?;
        let price_id = plan
            .external_price_id
            .clone()
            .ok_or_else(|| SubscriptionError::PlanNotSellable(plan_id.to_string()))?;

        let existing_shops = self.shop_repo.count().await?;

        let mut client = self
            .db_pool
            .get()
            .await
            .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;
        let txn = client
            .transaction()
            .await
            .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;

        let (customer, _) = self
            .customer_repo
            .get_or_create(&txn, request.customer())
            .await?;
        let (shop, _) = self
            .shop_repo
            .get_or_create(
                &txn,
                customer.id,
                NewShop {
                    name: request.shop_name.trim().to_string(),
                    address: request.address.trim().to_string(),
                    city: request.city.trim().to_string(),
                    state: request.state.trim().to_uppercase(),
                    postal_code: request.postal_code.trim().to_string(),
                },
                allocate_instance_url(&self.instance_urls, existing_shops),
            )
            .await?;

        // Commit before calling out; the session must reference durable rows
        txn.commit()
            .await
            .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;

        let mut metadata = HashMap::new();
        metadata.insert("shop_name".to_string(), shop.name.clone());
        metadata.insert("customer_email".to_string(), customer.email.clone());

        let spec = CheckoutSessionSpec {
            price_id: price_id.clone(),
            trial_period_days: if plan.trial_period_days > 0 {
                Some(plan.trial_period_days as u32)
            } else {
                None
            },
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            customer_email: customer.email.clone(),
            external_customer_id: customer.external_customer_id.clone(),
            metadata,
            idempotency_key: Some(checkout_idempotency_key(&customer.email, &price_id)),
        };

        let created = self
            .gateway
            .create_checkout_session(spec)
            .await
            .map_err(map_gateway_error)?;

        if customer.external_customer_id.is_none() {
            if let Some(ref external_id) = created.customer_id {
                if let Err(e) = self
                    .customer_repo
                    .set_external_customer_id(customer.id, external_id)
                    .await
                {
                    tracing::warn!(
                        "Failed to store provider customer id: customer_id={}, error={:#}",
                        customer.id,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Checkout session created: session_id={}, plan={}, shop_id={}",
            created.session_id,
            plan.name,
            shop.id
        );

        Ok(CheckoutSessionCreated {
            session_id: created.session_id,
            url: created.url,
        })
    }

    async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), SubscriptionError> {
        if self.webhook_secret.is_empty() {
            return Err(SubscriptionError::NotConfigured);
        }

        let payload_str = std::str::from_utf8(payload).map_err(|e| {
            SubscriptionError::WebhookVerificationFailed(format!("Payload is not UTF-8: {}", e))
        })?;

        if let Err(e) = Webhook::construct_event(payload_str, signature, &self.webhook_secret) {
            match e {
                WebhookError::BadKey
                | WebhookError::BadSignature
                | WebhookError::BadTimestamp(_)
                | WebhookError::BadHeader(_) => {
                    tracing::error!("Webhook signature verification failed: {}", e);
                    return Err(SubscriptionError::WebhookVerificationFailed(e.to_string()));
                }
                WebhookError::BadParse(parse_err) => {
                    // Signature checked out; the SDK just has no type for this event
                    tracing::debug!(
                        "Webhook payload outside SDK schema, continuing: {}",
                        parse_err
                    );
                }
            }
        }

        let event: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| SubscriptionError::InternalError(format!("Invalid webhook JSON: {}", e)))?;
        let event_id = event
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SubscriptionError::InternalError("Event missing id".to_string()))?
            .to_string();
        let event_type = event
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let mut client = self
            .db_pool
            .get()
            .await
            .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;
        let txn = client
            .transaction()
            .await
            .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;

        let stored = self
            .webhook_repo
            .store_event(&txn, WEBHOOK_PROVIDER, &event_id, &event)
            .await?;
        if !stored.is_new {
            tracing::info!(
                "Webhook already processed, skipping: event_id={}, type={}",
                event_id,
                event_type
            );
            txn.commit()
                .await
                .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;
            return Ok(());
        }

        let result = match event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&txn, &event).await,
            "customer.subscription.updated" => self
                .handle_subscription_updated(&txn, &event)
                .await
                .map(|_| None),
            "customer.subscription.deleted" => self
                .handle_subscription_deleted(&txn, &event)
                .await
                .map(|_| None),
            "invoice.payment_succeeded" => self
                .handle_invoice_payment_succeeded(&txn, &event)
                .await
                .map(|_| None),
            other => {
                tracing::debug!("Ignoring webhook event type: {}", other);
                Ok(None)
            }
        };

        let job = match result {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    "Webhook handler failed: event_id={}, type={}, error={}",
                    event_id,
                    event_type,
                    e
                );
                return Err(e);
            }
        };

        txn.commit()
            .await
            .map_err(|e| SubscriptionError::DatabaseError(e.to_string()))?;

        tracing::info!(
            "Webhook processed successfully: event_id={}, type={}",
            event_id,
            event_type
        );

        if let Some(job) = job {
            self.run_provisioning(job).await;
        }

        Ok(())
    }

    async fn get_subscription_status(
        &self,
        external_subscription_id: &str,
    ) -> Result<SubscriptionStatusView, SubscriptionError> {
        let subscription = self
            .subscription_repo
            .find_by_external_id(external_subscription_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::UnknownSubscription(external_subscription_id.to_string())
            })?;

        let plan = self
            .plan_repo
            .get_plan(subscription.plan_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::InternalError(format!(
                    "Subscription references missing plan: plan_id={}",
                    subscription.plan_id
                ))
            })?;

        Ok(SubscriptionStatusView {
            external_subscription_id: external_subscription_id.to_string(),
            status: subscription.status,
            cancel_at_period_end: subscription.cancel_at_period_end,
            period_start: subscription.period_start,
            period_end: subscription.period_end,
            trial_end: subscription.trial_end,
            plan_name: plan.name,
        })
    }

    async fn request_cancellation(
        &self,
        external_subscription_id: &str,
    ) -> Result<CancellationOutcome, SubscriptionError> {
        let subscription = self
            .subscription_repo
            .find_by_external_id(external_subscription_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::UnknownSubscription(external_subscription_id.to_string())
            })?;

        let plan = self
            .plan_repo
            .get_plan(subscription.plan_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::InternalError(format!(
                    "Subscription references missing plan: plan_id={}",
                    subscription.plan_id
                ))
            })?;

        // Paid plans ride out the paid period; trial-bearing plans stop now.
        // Local state converges through the resulting webhook.
        let mode = if plan.trial_period_days == 0 {
            self.gateway
                .set_cancel_at_period_end(external_subscription_id, true)
                .await
                .map_err(map_gateway_error)?;
            CancellationMode::AtPeriodEnd
        } else {
            self.gateway
                .cancel_now(external_subscription_id)
                .await
                .map_err(map_gateway_error)?;
            CancellationMode::Immediate
        };

        tracing::info!(
            "Cancellation requested: external_id={}, mode={:?}",
            external_subscription_id,
            mode
        );

        Ok(CancellationOutcome { mode })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_accepts_normal_addresses() {
        assert!(validate_email("dono@example.com"));
        assert!(validate_email("a.b-c+tag@sub.example.com.br"));
        assert!(validate_email("  padded@example.com  "));
    }

    #[test]
    fn test_validate_email_rejects_malformed_addresses() {
        assert!(!validate_email(""));
        assert!(!validate_email("no-at-sign.com"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("user@"));
        assert!(!validate_email("user@@example.com"));
        assert!(!validate_email("user@nodot"));
        assert!(!validate_email("user@.example.com"));
        assert!(!validate_email("user@example.com."));
        assert!(!validate_email("two words@example.com"));
    }

    fn valid_request() -> CheckoutRequest {
        CheckoutRequest {
            full_name: "João da Silva".to_string(),
            email: "dono@example.com".to_string(),
            phone: "(11) 98765-4321".to_string(),
            shop_name: "Barbearia Alfa".to_string(),
            address: "Rua das Tesouras, 10".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            postal_code: "01310-100".to_string(),
            terms_accepted: true,
            wants_notifications: false,
        }
    }

    #[test]
    fn test_validate_checkout_request_accepts_valid_payload() {
        assert!(validate_checkout_request(&valid_request()).is_empty());
    }

    #[test]
    fn test_validate_checkout_request_optional_fields_may_be_empty() {
        let mut request = valid_request();
        request.address = String::new();
        request.city = String::new();
        request.state = String::new();
        request.postal_code = String::new();
        assert!(validate_checkout_request(&request).is_empty());
    }

    #[test]
    fn test_validate_checkout_request_collects_all_failures() {
        let request = CheckoutRequest {
            full_name: "  ".to_string(),
            email: "not-an-email".to_string(),
            phone: "123".to_string(),
            shop_name: String::new(),
            address: String::new(),
            city: String::new(),
            state: "XX".to_string(),
            postal_code: "123".to_string(),
            terms_accepted: false,
            wants_notifications: false,
        };

        let errors = validate_checkout_request(&request);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "full_name",
                "email",
                "phone",
                "shop_name",
                "postal_code",
                "state"
            ]
        );
    }

    #[test]
    fn test_validate_checkout_request_phone_digit_bounds() {
        let mut request = valid_request();
        request.phone = "1198765432".to_string(); // 10 digits
        assert!(validate_checkout_request(&request).is_empty());

        request.phone = "119876543".to_string(); // 9 digits
        assert_eq!(validate_checkout_request(&request).len(), 1);

        request.phone = "119876543210".to_string(); // 12 digits
        assert_eq!(validate_checkout_request(&request).len(), 1);
    }

    #[test]
    fn test_validate_checkout_request_lowercase_state_is_accepted() {
        let mut request = valid_request();
        request.state = "sp".to_string();
        assert!(validate_checkout_request(&request).is_empty());
    }

    #[test]
    fn test_checkout_idempotency_key_is_stable_within_the_hour() {
        let a = checkout_idempotency_key("dono@example.com", "price_123");
        let b = checkout_idempotency_key("dono@example.com", "price_123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = checkout_idempotency_key("outra@example.com", "price_123");
        assert_ne!(a, other);
    }

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("dono@example.com"), "dono");
        assert_eq!(username_from_email("no-at-sign"), "no-at-sign");
        assert_eq!(username_from_email("@example.com"), "@example.com");
    }

    #[test]
    fn test_settlement_fields_trial_shape() {
        let trial_end = DateTime::from_timestamp(1_700_000_000, 0);
        let fresh = ProviderSubscription {
            external_subscription_id: "sub_1".to_string(),
            status: "trialing".to_string(),
            cancel_at_period_end: false,
            created: DateTime::from_timestamp(1_699_000_000, 0),
            current_period_end: DateTime::from_timestamp(1_701_000_000, 0),
            trial_end,
        };

        let (period_end, transaction) = settlement_fields(&fresh, Some("pi_123".to_string()));
        assert!(period_end.is_none());
        assert!(transaction.is_none());
    }

    #[test]
    fn test_settlement_fields_paid_shape() {
        let fresh = ProviderSubscription {
            external_subscription_id: "sub_1".to_string(),
            status: "active".to_string(),
            cancel_at_period_end: false,
            created: DateTime::from_timestamp(1_699_000_000, 0),
            current_period_end: DateTime::from_timestamp(1_701_000_000, 0),
            trial_end: None,
        };

        let (period_end, transaction) = settlement_fields(&fresh, Some("pi_123".to_string()));
        assert_eq!(period_end, DateTime::from_timestamp(1_701_000_000, 0));
        assert_eq!(transaction.as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_id_or_object_deserializes_both_shapes() {
        let bare: IdOrObject = serde_json::from_value(serde_json::json!("sub_123")).unwrap();
        assert_eq!(bare.id(), "sub_123");

        let expanded: IdOrObject =
            serde_json::from_value(serde_json::json!({"id": "sub_123", "object": "subscription"}))
                .unwrap();
        assert_eq!(expanded.id(), "sub_123");
    }

    #[test]
    fn test_checkout_session_object_tolerates_missing_metadata() {
        let event = serde_json::json!({
            "data": {
                "object": {
                    "id": "cs_123",
                    "mode": "subscription",
                    "subscription": "sub_123"
                }
            }
        });

        let session: CheckoutSessionObject = event_data_object(&event).unwrap();
        assert_eq!(session.id, "cs_123");
        assert!(session.metadata.is_empty());
        assert!(session.customer.is_none());
    }

    #[test]
    fn test_event_data_object_requires_data_object() {
        let event = serde_json::json!({"id": "evt_1", "type": "x"});
        let result: Result<CheckoutSessionObject, _> = event_data_object(&event);
        assert!(result.is_err());
    }

    #[test]
    fn test_allocate_instance_url_wraps_around() {
        let urls = vec![
            "https://a.example.com".to_string(),
            "https://b.example.com".to_string(),
            "https://c.example.com".to_string(),
        ];
        assert_eq!(allocate_instance_url(&urls, 0), Some("https://a.example.com"));
        assert_eq!(allocate_instance_url(&urls, 1), Some("https://b.example.com"));
        assert_eq!(allocate_instance_url(&urls, 3), Some("https://a.example.com"));
        assert_eq!(allocate_instance_url(&urls, 7), Some("https://b.example.com"));
        assert_eq!(allocate_instance_url(&[], 5), None);
    }
}
