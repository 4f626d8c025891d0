use crate::pool::DbPool;
use async_trait::async_trait;
use services::catalog::{NewShop, Shop, ShopRepository};
use services::{CustomerId, ShopId};

pub struct PostgresShopRepository {
    pool: DbPool,
}

impl PostgresShopRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SHOP_COLUMNS: &str = "id, name, address, city, state, postal_code, owner_id, \
                            instance_url, created_at, updated_at";

fn row_to_shop(row: &tokio_postgres::Row) -> Shop {
    Shop {
        id: row.get("id"),
        name: row.get("name"),
        address: row.get("address"),
        city: row.get("city"),
        state: row.get("state"),
        postal_code: row.get("postal_code"),
        owner_id: row.get("owner_id"),
        instance_url: row.get("instance_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl ShopRepository for PostgresShopRepository {
    async fn get_or_create(
        &self,
        txn: &tokio_postgres::Transaction<'_>,
        owner_id: CustomerId,
        shop: NewShop,
        default_instance_url: Option<&str>,
    ) -> anyhow::Result<(Shop, bool)> {
        tracing::info!(
            "Repository: Getting or creating shop - name={}, owner_id={}",
            shop.name,
            owner_id
        );

        let shop_id = ShopId::new();

        // The instance allocation only applies on insert; an existing shop
        // keeps whatever it already has
        let result = txn
            .query_opt(
                &format!(
                    "INSERT INTO shops (
                        id, name, address, city, state, postal_code, owner_id, instance_url
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (name, owner_id) DO NOTHING
                     RETURNING {}",
                    SHOP_COLUMNS
                ),
                &[
                    &shop_id,
                    &shop.name,
                    &shop.address,
                    &shop.city,
                    &shop.state,
                    &shop.postal_code,
                    &owner_id,
                    &default_instance_url,
                ],
            )
            .await?;

        if let Some(row) = result {
            return Ok((row_to_shop(&row), true));
        }

        tracing::debug!(
            "Repository: Shop already exists, fetching - name={}, owner_id={}",
            shop.name,
            owner_id
        );

        let row = txn
            .query_one(
                &format!(
                    "SELECT {} FROM shops WHERE name = $1 AND owner_id = $2",
                    SHOP_COLUMNS
                ),
                &[&shop.name, &owner_id],
            )
            .await?;

        Ok((row_to_shop(&row), false))
    }

    async fn get_shop(&self, shop_id: ShopId) -> anyhow::Result<Option<Shop>> {
        tracing::debug!("Repository: Fetching shop - shop_id={}", shop_id);

        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM shops WHERE id = $1", SHOP_COLUMNS),
                &[&shop_id],
            )
            .await?;

        Ok(row.as_ref().map(row_to_shop))
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let client = self.pool.get().await?;
        let row = client.query_one("SELECT COUNT(*) FROM shops", &[]).await?;
        Ok(row.get(0))
    }

    async fn set_instance_url(&self, shop_id: ShopId, instance_url: &str) -> anyhow::Result<()> {
        tracing::info!(
            "Repository: Setting instance url - shop_id={}, instance_url={}",
            shop_id,
            instance_url
        );

        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE shops SET instance_url = $2, updated_at = NOW() WHERE id = $1",
                &[&shop_id, &instance_url],
            )
            .await?;

        if updated == 0 {
            anyhow::bail!("Shop not found: {}", shop_id);
        }
        Ok(())
    }
}
