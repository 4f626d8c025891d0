use crate::pool::DbPool;
use async_trait::async_trait;
use services::subscription::ports::{StoreEventResult, WebhookEvent, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    #[allow(dead_code)]
    pool: DbPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &tokio_postgres::Row) -> WebhookEvent {
    WebhookEvent {
        id: row.get("id"),
        provider: row.get("provider"),
        event_id: row.get("event_id"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn store_event(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        provider: &str,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<StoreEventResult> {
        tracing::info!(
            "Repository: Storing webhook event - provider={}, event_id={}",
            provider,
            event_id
        );

        // This query is idempotent due to UNIQUE(provider, event_id) constraint
        let result = txn
            .query_opt(
                "INSERT INTO webhook_events (provider, event_id, payload)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (provider, event_id) DO NOTHING
                 RETURNING id, provider, event_id, payload, created_at",
                &[&provider, &event_id, &payload],
            )
            .await?;

        if let Some(row) = result {
            return Ok(StoreEventResult {
                event: row_to_event(&row),
                is_new: true,
            });
        }

        // Event already exists, fetch it
        tracing::debug!(
            "Repository: Webhook event already exists, fetching - provider={}, event_id={}",
            provider,
            event_id
        );

        let row = txn
            .query_one(
                "SELECT id, provider, event_id, payload, created_at
                 FROM webhook_events
                 WHERE provider = $1 AND event_id = $2",
                &[&provider, &event_id],
            )
            .await?;

        Ok(StoreEventResult {
            event: row_to_event(&row),
            is_new: false,
        })
    }
}
