use crate::pool::DbPool;
use async_trait::async_trait;
use services::catalog::{BillingInterval, NewPlan, Plan, PlanRepository};
use services::PlanId;

pub struct PostgresPlanRepository {
    pool: DbPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const PLAN_COLUMNS: &str = "id, name, description, price_cents, billing_interval, \
                            external_price_id, trial_period_days, created_at, updated_at";

fn row_to_plan(row: &tokio_postgres::Row) -> anyhow::Result<Plan> {
    let billing_interval = match row.get::<_, Option<String>>("billing_interval") {
        Some(value) => Some(BillingInterval::parse(&value).ok_or_else(|| {
            anyhow::anyhow!("Unknown billing interval in database: {}", value)
        })?),
        None => None,
    };

    Ok(Plan {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        price_cents: row.get("price_cents"),
        billing_interval,
        external_price_id: row.get("external_price_id"),
        trial_period_days: row.get("trial_period_days"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn get_plan(&self, plan_id: PlanId) -> anyhow::Result<Option<Plan>> {
        tracing::debug!("Repository: Fetching plan - plan_id={}", plan_id);

        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM plans WHERE id = $1", PLAN_COLUMNS),
                &[&plan_id],
            )
            .await?;

        row.as_ref().map(row_to_plan).transpose()
    }

    async fn get_plan_by_external_price_id(
        &self,
        external_price_id: &str,
    ) -> anyhow::Result<Option<Plan>> {
        tracing::debug!(
            "Repository: Fetching plan by price - external_price_id={}",
            external_price_id
        );

        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM plans WHERE external_price_id = $1",
                    PLAN_COLUMNS
                ),
                &[&external_price_id],
            )
            .await?;

        row.as_ref().map(row_to_plan).transpose()
    }

    async fn list_sellable_plans(&self) -> anyhow::Result<Vec<Plan>> {
        tracing::debug!("Repository: Listing sellable plans");

        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM plans
                     WHERE external_price_id IS NOT NULL
                     ORDER BY price_cents ASC",
                    PLAN_COLUMNS
                ),
                &[],
            )
            .await?;

        rows.iter().map(row_to_plan).collect()
    }

    async fn create_plan(&self, plan: NewPlan) -> anyhow::Result<Plan> {
        tracing::info!("Repository: Creating plan - name={}", plan.name);

        let plan_id = PlanId::new();
        let billing_interval = plan.billing_interval.map(|b| b.as_str().to_string());

        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO plans (
                        id, name, description, price_cents, billing_interval,
                        external_price_id, trial_period_days
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     RETURNING {}",
                    PLAN_COLUMNS
                ),
                &[
                    &plan_id,
                    &plan.name,
                    &plan.description,
                    &plan.price_cents,
                    &billing_interval,
                    &plan.external_price_id,
                    &plan.trial_period_days,
                ],
            )
            .await?;

        row_to_plan(&row)
    }
}
