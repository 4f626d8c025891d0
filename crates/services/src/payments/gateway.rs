use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData, RequestStrategy,
    Subscription as StripeSubscription,
};

use super::ports::{
    CheckoutSessionSpec, CreatedCheckoutSession, PaymentGateway, PaymentGatewayError,
    ProviderSubscription,
};

/// Stripe-backed implementation of the payment gateway port.
///
/// Holds only the secret key; a `Client` is constructed per call the same way
/// a request-scoped client would be, so no connection state outlives a request.
pub struct StripeGateway {
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &config::StripeConfig) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
        }
    }

    fn client(&self) -> Result<Client, PaymentGatewayError> {
        if self.secret_key.is_empty() {
            return Err(PaymentGatewayError::NotConfigured);
        }
        Ok(Client::new(&self.secret_key))
    }
}

fn provider_subscription_from_stripe(stripe_sub: &StripeSubscription) -> ProviderSubscription {
    ProviderSubscription {
        external_subscription_id: stripe_sub.id.to_string(),
        status: stripe_sub.status.to_string(),
        cancel_at_period_end: stripe_sub.cancel_at_period_end,
        created: chrono::DateTime::from_timestamp(stripe_sub.created, 0),
        current_period_end: chrono::DateTime::from_timestamp(stripe_sub.current_period_end, 0),
        trial_end: stripe_sub
            .trial_end
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        spec: CheckoutSessionSpec,
    ) -> Result<CreatedCheckoutSession, PaymentGatewayError> {
        let base_client = self.client()?;

        // Idempotency key scopes retries of the same checkout to one session
        let client = match &spec.idempotency_key {
            Some(key) => base_client.with_strategy(RequestStrategy::Idempotent(key.clone())),
            None => base_client,
        };

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&spec.success_url);
        params.cancel_url = Some(&spec.cancel_url);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(spec.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(spec.metadata.clone());

        // Reuse the provider customer when we already have one, otherwise let
        // the provider create one from the email
        if let Some(customer_id) = &spec.external_customer_id {
            params.customer = Some(customer_id.parse().map_err(|_| {
                PaymentGatewayError::InvalidId(format!("customer id {}", customer_id))
            })?);
        } else {
            params.customer_email = Some(&spec.customer_email);
        }

        if let Some(days) = spec.trial_period_days {
            params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
                trial_period_days: Some(days),
                ..Default::default()
            });
        }

        let session = CheckoutSession::create(&client, params)
            .await
            .map_err(|e| PaymentGatewayError::Api(e.to_string()))?;

        let customer_id = session.customer.as_ref().map(|c| match c {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(customer) => customer.id.to_string(),
        });

        Ok(CreatedCheckoutSession {
            session_id: session.id.to_string(),
            url: session.url,
            customer_id,
        })
    }

    async fn fetch_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<ProviderSubscription, PaymentGatewayError> {
        let client = self.client()?;

        let subscription_id: stripe::SubscriptionId =
            external_subscription_id.parse().map_err(|_| {
                PaymentGatewayError::InvalidId(format!(
                    "subscription id {}",
                    external_subscription_id
                ))
            })?;

        let stripe_sub = StripeSubscription::retrieve(&client, &subscription_id, &[])
            .await
            .map_err(|e| PaymentGatewayError::Api(e.to_string()))?;

        Ok(provider_subscription_from_stripe(&stripe_sub))
    }

    async fn fetch_session_price_id(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, PaymentGatewayError> {
        let client = self.client()?;

        let session_id: stripe::CheckoutSessionId = session_id
            .parse()
            .map_err(|_| PaymentGatewayError::InvalidId(format!("session id {}", session_id)))?;

        let session = CheckoutSession::retrieve(&client, &session_id, &["line_items"])
            .await
            .map_err(|e| PaymentGatewayError::Api(e.to_string()))?;

        Ok(session.line_items.and_then(|items| {
            items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .map(|price| price.id.to_string())
        }))
    }

    async fn set_cancel_at_period_end(
        &self,
        external_subscription_id: &str,
        cancel: bool,
    ) -> Result<(), PaymentGatewayError> {
        let client = self.client()?;

        let subscription_id: stripe::SubscriptionId =
            external_subscription_id.parse().map_err(|_| {
                PaymentGatewayError::InvalidId(format!(
                    "subscription id {}",
                    external_subscription_id
                ))
            })?;

        let params = stripe::UpdateSubscription {
            cancel_at_period_end: Some(cancel),
            ..Default::default()
        };

        StripeSubscription::update(&client, &subscription_id, params)
            .await
            .map_err(|e| PaymentGatewayError::Api(e.to_string()))?;

        Ok(())
    }

    async fn cancel_now(
        &self,
        external_subscription_id: &str,
    ) -> Result<(), PaymentGatewayError> {
        let client = self.client()?;

        let subscription_id: stripe::SubscriptionId =
            external_subscription_id.parse().map_err(|_| {
                PaymentGatewayError::InvalidId(format!(
                    "subscription id {}",
                    external_subscription_id
                ))
            })?;

        StripeSubscription::cancel(&client, &subscription_id, stripe::CancelSubscription::default())
            .await
            .map_err(|e| PaymentGatewayError::Api(e.to_string()))?;

        Ok(())
    }
}

/// Test helpers for the payment gateway port
pub mod test_helpers {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory gateway for tests: serves canned subscription snapshots and
    /// records every mutating call.
    pub struct FakePaymentGateway {
        pub subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
        pub session_price_ids: Mutex<HashMap<String, String>>,
        pub created_sessions: Mutex<Vec<CheckoutSessionSpec>>,
        pub next_session: Mutex<CreatedCheckoutSession>,
        pub cancel_at_period_end_calls: Mutex<Vec<(String, bool)>>,
        pub cancel_now_calls: Mutex<Vec<String>>,
    }

    impl FakePaymentGateway {
        pub fn new() -> Self {
            Self {
                subscriptions: Mutex::new(HashMap::new()),
                session_price_ids: Mutex::new(HashMap::new()),
                created_sessions: Mutex::new(Vec::new()),
                next_session: Mutex::new(CreatedCheckoutSession {
                    session_id: "cs_test_fake".to_string(),
                    url: Some("https://checkout.example.com/cs_test_fake".to_string()),
                    customer_id: None,
                }),
                cancel_at_period_end_calls: Mutex::new(Vec::new()),
                cancel_now_calls: Mutex::new(Vec::new()),
            }
        }

        /// Register a subscription snapshot for `fetch_subscription`
        pub fn insert_subscription(&self, subscription: ProviderSubscription) {
            self.subscriptions
                .lock()
                .expect("lock poisoned")
                .insert(subscription.external_subscription_id.clone(), subscription);
        }

        /// Register the price id returned for a session's line items
        pub fn insert_session_price(&self, session_id: &str, price_id: &str) {
            self.session_price_ids
                .lock()
                .expect("lock poisoned")
                .insert(session_id.to_string(), price_id.to_string());
        }

        pub fn set_next_session(&self, session: CreatedCheckoutSession) {
            *self.next_session.lock().expect("lock poisoned") = session;
        }
    }

    impl Default for FakePaymentGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl PaymentGateway for FakePaymentGateway {
        async fn create_checkout_session(
            &self,
            spec: CheckoutSessionSpec,
        ) -> Result<CreatedCheckoutSession, PaymentGatewayError> {
            self.created_sessions
                .lock()
                .expect("lock poisoned")
                .push(spec);
            Ok(self.next_session.lock().expect("lock poisoned").clone())
        }

        async fn fetch_subscription(
            &self,
            external_subscription_id: &str,
        ) -> Result<ProviderSubscription, PaymentGatewayError> {
            self.subscriptions
                .lock()
                .expect("lock poisoned")
                .get(external_subscription_id)
                .cloned()
                .ok_or_else(|| {
                    PaymentGatewayError::Api(format!(
                        "no such subscription: {}",
                        external_subscription_id
                    ))
                })
        }

        async fn fetch_session_price_id(
            &self,
            session_id: &str,
        ) -> Result<Option<String>, PaymentGatewayError> {
            Ok(self
                .session_price_ids
                .lock()
                .expect("lock poisoned")
                .get(session_id)
                .cloned())
        }

        async fn set_cancel_at_period_end(
            &self,
            external_subscription_id: &str,
            cancel: bool,
        ) -> Result<(), PaymentGatewayError> {
            self.cancel_at_period_end_calls
                .lock()
                .expect("lock poisoned")
                .push((external_subscription_id.to_string(), cancel));
            Ok(())
        }

        async fn cancel_now(
            &self,
            external_subscription_id: &str,
        ) -> Result<(), PaymentGatewayError> {
            self.cancel_now_calls
                .lock()
                .expect("lock poisoned")
                .push(external_subscription_id.to_string());
            Ok(())
        }
    }
}
