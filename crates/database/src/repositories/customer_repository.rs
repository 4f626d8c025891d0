use crate::pool::DbPool;
use async_trait::async_trait;
use services::catalog::{Customer, CustomerRepository, NewCustomer};
use services::CustomerId;

pub struct PostgresCustomerRepository {
    pool: DbPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const CUSTOMER_COLUMNS: &str = "id, full_name, email, phone, terms_accepted, \
                                wants_notifications, external_customer_id, created_at, updated_at";

fn row_to_customer(row: &tokio_postgres::Row) -> Customer {
    Customer {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        terms_accepted: row.get("terms_accepted"),
        wants_notifications: row.get("wants_notifications"),
        external_customer_id: row.get("external_customer_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn get_or_create(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        customer: NewCustomer,
    ) -> anyhow::Result<(Customer, bool)> {
        tracing::info!(
            "Repository: Getting or creating customer - email={}",
            customer.email
        );

        let customer_id = CustomerId::new();

        // UNIQUE(email) makes the insert race-safe; the loser falls through
        // to the select
        let result = txn
            .query_opt(
                &format!(
                    "INSERT INTO customers (
                        id, full_name, email, phone, terms_accepted,
                        wants_notifications, external_customer_id
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT (email) DO NOTHING
                     RETURNING {}",
                    CUSTOMER_COLUMNS
                ),
                &[
                    &customer_id,
                    &customer.full_name,
                    &customer.email,
                    &customer.phone,
                    &customer.terms_accepted,
                    &customer.wants_notifications,
                    &customer.external_customer_id,
                ],
            )
            .await?;

        if let Some(row) = result {
            return Ok((row_to_customer(&row), true));
        }

        tracing::debug!(
            "Repository: Customer already exists, fetching - email={}",
            customer.email
        );

        let row = txn
            .query_one(
                &format!("SELECT {} FROM customers WHERE email = $1", CUSTOMER_COLUMNS),
                &[&customer.email],
            )
            .await?;

        Ok((row_to_customer(&row), false))
    }

    async fn get_customer(&self, customer_id: CustomerId) -> anyhow::Result<Option<Customer>> {
        tracing::debug!("Repository: Fetching customer - customer_id={}", customer_id);

        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM customers WHERE id = $1", CUSTOMER_COLUMNS),
                &[&customer_id],
            )
            .await?;

        Ok(row.as_ref().map(row_to_customer))
    }

    async fn set_external_customer_id(
        &self,
        customer_id: CustomerId,
        external_customer_id: &str,
    ) -> anyhow::Result<bool> {
        tracing::info!(
            "Repository: Storing provider customer id - customer_id={}",
            customer_id
        );

        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE customers
                 SET external_customer_id = $2, updated_at = NOW()
                 WHERE id = $1 AND external_customer_id IS NULL",
                &[&customer_id, &external_customer_id],
            )
            .await?;

        Ok(updated > 0)
    }
}
