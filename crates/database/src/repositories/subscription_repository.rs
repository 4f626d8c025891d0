use crate::pool::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::subscription::ports::{
    NewSubscription, Subscription, SubscriptionRepository, SubscriptionStatus,
    SubscriptionStatusPatch,
};
use services::SubscriptionId;

pub struct PostgresSubscriptionRepository {
    pool: DbPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, customer_id, plan_id, shop_id, external_subscription_id, status, \
     cancel_at_period_end, period_start, period_end, trial_end, \
     last_payment_transaction_id, access_granted, created_at, updated_at";

fn row_to_subscription(row: &tokio_postgres::Row) -> anyhow::Result<Subscription> {
    let status_raw: String = row.get("status");
    let status = SubscriptionStatus::parse(&status_raw)
        .ok_or_else(|| anyhow::anyhow!("Unknown subscription status in database: {}", status_raw))?;

    Ok(Subscription {
        id: row.get("id"),
        customer_id: row.get("customer_id"),
        plan_id: row.get("plan_id"),
        shop_id: row.get("shop_id"),
        external_subscription_id: row.get("external_subscription_id"),
        status,
        cancel_at_period_end: row.get("cancel_at_period_end"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        trial_end: row.get("trial_end"),
        last_payment_transaction_id: row.get("last_payment_transaction_id"),
        access_granted: row.get("access_granted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create_if_absent(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        subscription: NewSubscription,
    ) -> anyhow::Result<(Subscription, bool)> {
        tracing::info!(
            "Repository: Creating subscription if absent - external_id={}",
            subscription.external_subscription_id
        );

        let subscription_id = SubscriptionId::new();
        let status = subscription.status.as_str();

        // UNIQUE(external_subscription_id) absorbs event replays; the
        // original row wins
        let result = txn
            .query_opt(
                &format!(
                    "INSERT INTO subscriptions (
                        id, customer_id, plan_id, shop_id, external_subscription_id,
                        status, cancel_at_period_end, period_start, period_end,
                        trial_end, last_payment_transaction_id, access_granted
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                     ON CONFLICT (external_subscription_id) DO NOTHING
                     RETURNING {}",
                    SUBSCRIPTION_COLUMNS
                ),
                &[
                    &subscription_id,
                    &subscription.customer_id,
                    &subscription.plan_id,
                    &subscription.shop_id,
                    &subscription.external_subscription_id,
                    &status,
                    &subscription.cancel_at_period_end,
                    &subscription.period_start,
                    &subscription.period_end,
                    &subscription.trial_end,
                    &subscription.last_payment_transaction_id,
                    &subscription.access_granted,
                ],
            )
            .await?;

        if let Some(row) = result {
            return Ok((row_to_subscription(&row)?, true));
        }

        tracing::debug!(
            "Repository: Subscription already exists, fetching - external_id={}",
            subscription.external_subscription_id
        );

        let row = txn
            .query_one(
                &format!(
                    "SELECT {} FROM subscriptions WHERE external_subscription_id = $1",
                    SUBSCRIPTION_COLUMNS
                ),
                &[&subscription.external_subscription_id],
            )
            .await?;

        Ok((row_to_subscription(&row)?, false))
    }

    async fn find_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> anyhow::Result<Option<Subscription>> {
        tracing::debug!(
            "Repository: Fetching subscription - external_id={}",
            external_subscription_id
        );

        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM subscriptions WHERE external_subscription_id = $1",
                    SUBSCRIPTION_COLUMNS
                ),
                &[&external_subscription_id],
            )
            .await?;

        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn apply_status_update(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        external_subscription_id: &str,
        patch: SubscriptionStatusPatch,
    ) -> anyhow::Result<Option<Subscription>> {
        tracing::info!(
            "Repository: Applying status update - external_id={}, status={}",
            external_subscription_id,
            patch.status
        );

        let status = patch.status.as_str();

        let row = txn
            .query_opt(
                &format!(
                    "UPDATE subscriptions
                     SET status = $2,
                         cancel_at_period_end = $3,
                         period_end = COALESCE($4, period_end),
                         access_granted = COALESCE($5, access_granted),
                         updated_at = NOW()
                     WHERE external_subscription_id = $1
                     RETURNING {}",
                    SUBSCRIPTION_COLUMNS
                ),
                &[
                    &external_subscription_id,
                    &status,
                    &patch.cancel_at_period_end,
                    &patch.period_end,
                    &patch.access_granted,
                ],
            )
            .await?;

        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn record_payment_success(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        external_subscription_id: &str,
        transaction_id: Option<&str>,
        period_end: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<Subscription>> {
        tracing::info!(
            "Repository: Recording payment - external_id={}",
            external_subscription_id
        );

        let row = txn
            .query_opt(
                &format!(
                    "UPDATE subscriptions
                     SET status = 'active',
                         trial_end = NULL,
                         access_granted = TRUE,
                         last_payment_transaction_id = COALESCE($2, last_payment_transaction_id),
                         period_end = COALESCE($3, period_end),
                         updated_at = NOW()
                     WHERE external_subscription_id = $1
                     RETURNING {}",
                    SUBSCRIPTION_COLUMNS
                ),
                &[&external_subscription_id, &transaction_id, &period_end],
            )
            .await?;

        row.as_ref().map(row_to_subscription).transpose()
    }
}
