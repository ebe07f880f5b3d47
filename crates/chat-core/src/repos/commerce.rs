use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{Store, StoreError};
use crate::commerce::{
    CartLine, CartSnapshot, CommerceDirectory, DirectoryFuture, Identity, OrderSnapshot,
};

// Storefront tables are owned by the shop application; these queries only read.
impl Store {
    pub async fn resolve_token_identity(&self, token: &str) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query(
            "SELECT u.id::BIGINT AS id, u.username, u.first_name
             FROM authtoken_token t
             JOIN auth_user u ON u.id = t.user_id
             WHERE t.key = $1
               AND u.is_active",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Identity {
                user_id: row.try_get("id")?,
                username: row.try_get("username")?,
                first_name: row.try_get("first_name")?,
            })
        })
        .transpose()
    }

    pub async fn load_cart_snapshot(&self, user_id: i64) -> Result<Option<CartSnapshot>, StoreError> {
        // Older storefront builds could leave duplicate carts; the newest wins.
        let cart_id: Option<i64> = sqlx::query_scalar(
            "SELECT id::BIGINT
             FROM cart_cart
             WHERE user_id = $1
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(cart_id) = cart_id else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT p.name AS product_name,
                    ci.quantity::BIGINT AS quantity,
                    ROUND(p.price * 100)::BIGINT AS unit_price_cents
             FROM cart_cartitem ci
             JOIN products_product p ON p.id = ci.product_id
             WHERE ci.cart_id = $1
             ORDER BY ci.id ASC",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(|row| -> Result<CartLine, StoreError> {
                let quantity: i64 = row.try_get("quantity")?;
                Ok(CartLine {
                    product_name: row.try_get("product_name")?,
                    quantity: u32::try_from(quantity).map_err(|_| {
                        StoreError::InvalidData(format!("cart quantity out of range: {quantity}"))
                    })?,
                    unit_price_cents: row.try_get("unit_price_cents")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CartSnapshot { lines }))
    }

    pub async fn load_recent_orders(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<OrderSnapshot>, StoreError> {
        let limit = i64::try_from(limit)
            .map_err(|_| StoreError::InvalidData("order limit exceeds i64".to_string()))?;

        let rows = sqlx::query(
            "SELECT id::BIGINT AS id,
                    status,
                    ROUND(total_price * 100)::BIGINT AS total_cents,
                    created_at
             FROM products_order
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<OrderSnapshot, StoreError> {
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                Ok(OrderSnapshot {
                    id: row.try_get("id")?,
                    status: row.try_get("status")?,
                    total_cents: row.try_get("total_cents")?,
                    created_at,
                })
            })
            .collect()
    }
}

impl CommerceDirectory for Store {
    fn resolve_bearer_token<'a>(&'a self, token: &'a str) -> DirectoryFuture<'a, Option<Identity>> {
        Box::pin(async move { Ok(self.resolve_token_identity(token).await?) })
    }

    fn cart_for_user<'a>(&'a self, user_id: i64) -> DirectoryFuture<'a, Option<CartSnapshot>> {
        Box::pin(async move { Ok(self.load_cart_snapshot(user_id).await?) })
    }

    fn recent_orders<'a>(
        &'a self,
        user_id: i64,
        limit: usize,
    ) -> DirectoryFuture<'a, Vec<OrderSnapshot>> {
        Box::pin(async move { Ok(self.load_recent_orders(user_id, limit).await?) })
    }
}
