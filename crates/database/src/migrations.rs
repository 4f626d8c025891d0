use crate::pool::DbPool;

/// Idempotent schema setup, applied at startup
pub async fn run(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("Running database migrations");

    let client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS plans (
                 id UUID PRIMARY KEY,
                 name TEXT NOT NULL,
                 description TEXT NOT NULL DEFAULT '',
                 price_cents BIGINT NOT NULL,
                 billing_interval TEXT,
                 external_price_id TEXT UNIQUE,
                 trial_period_days INTEGER NOT NULL DEFAULT 0,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );

             CREATE TABLE IF NOT EXISTS customers (
                 id UUID PRIMARY KEY,
                 full_name TEXT NOT NULL,
                 email TEXT NOT NULL UNIQUE,
                 phone TEXT NOT NULL DEFAULT '',
                 terms_accepted BOOLEAN NOT NULL DEFAULT FALSE,
                 wants_notifications BOOLEAN NOT NULL DEFAULT FALSE,
                 external_customer_id TEXT UNIQUE,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );

             CREATE TABLE IF NOT EXISTS shops (
                 id UUID PRIMARY KEY,
                 name TEXT NOT NULL,
                 address TEXT NOT NULL DEFAULT '',
                 city TEXT NOT NULL DEFAULT '',
                 state TEXT NOT NULL DEFAULT '',
                 postal_code TEXT NOT NULL DEFAULT '',
                 owner_id UUID REFERENCES customers(id),
                 instance_url TEXT,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 UNIQUE (name, owner_id)
             );

             CREATE TABLE IF NOT EXISTS subscriptions (
                 id UUID PRIMARY KEY,
                 customer_id UUID NOT NULL REFERENCES customers(id),
                 plan_id UUID NOT NULL REFERENCES plans(id),
                 shop_id UUID NOT NULL REFERENCES shops(id),
                 external_subscription_id TEXT UNIQUE,
                 status TEXT NOT NULL,
                 cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
                 period_start TIMESTAMPTZ,
                 period_end TIMESTAMPTZ,
                 trial_end TIMESTAMPTZ,
                 last_payment_transaction_id TEXT UNIQUE,
                 access_granted BOOLEAN NOT NULL DEFAULT FALSE,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );

             CREATE TABLE IF NOT EXISTS webhook_events (
                 id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                 provider TEXT NOT NULL,
                 event_id TEXT NOT NULL,
                 payload JSONB NOT NULL,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 UNIQUE (provider, event_id)
             );

             CREATE INDEX IF NOT EXISTS idx_subscriptions_customer_id
                 ON subscriptions (customer_id);
             CREATE INDEX IF NOT EXISTS idx_shops_owner_id
                 ON shops (owner_id);",
        )
        .await?;

    tracing::info!("Database migrations completed");
    Ok(())
}
