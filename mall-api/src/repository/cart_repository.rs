use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::domain::models::cart::{Cart, CartItem};
use crate::error::AppError;

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn create(&self) -> Result<Cart, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, AppError>;
    /// 新商品插入数量 1，已有商品数量 +1
    async fn add_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError>;
    async fn set_quantity(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, AppError>;
    async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError>;
    /// 整体替换购物车内容，结算后写回未成交的部分
    async fn replace_items(&self, cart_id: Uuid, items: &[CartItem]) -> Result<(), AppError>;
    async fn clear(&self, cart_id: Uuid) -> Result<(), AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

pub struct MySqlCartRepository {
    pool: MySqlPool,
}

impl MySqlCartRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: Uuid) -> Result<Cart, AppError> {
        self.fetch(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cart {id} not found")))
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Cart>, AppError> {
        let head = sqlx::query_as::<_, CartRow>(
            "SELECT id, created_at, updated_at FROM carts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(head) = head else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, quantity FROM cart_items WHERE cart_id = ? ORDER BY added_at, product_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Cart {
            id: head.id,
            items: items
                .into_iter()
                .map(|row| CartItem {
                    product_id: row.product_id,
                    quantity: row.quantity,
                })
                .collect(),
            created_at: head.created_at,
            updated_at: head.updated_at,
        }))
    }

    async fn touch(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: Uuid,
    quantity: u32,
}

#[async_trait]
impl CartRepository for MySqlCartRepository {
    async fn create(&self) -> Result<Cart, AppError> {
        let cart = Cart::new();
        sqlx::query("INSERT INTO carts (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(cart.id)
            .bind(cart.created_at)
            .bind(cart.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(cart)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, AppError> {
        self.fetch(id).await
    }

    async fn add_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError> {
        self.load(cart_id).await?;

        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity, added_at)
            VALUES (?, ?, 1, ?)
            ON DUPLICATE KEY UPDATE quantity = quantity + 1
            "#,
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.touch(cart_id).await?;
        self.load(cart_id).await
    }

    async fn set_quantity(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, AppError> {
        self.load(cart_id).await?;

        let result =
            sqlx::query("UPDATE cart_items SET quantity = ? WHERE cart_id = ? AND product_id = ?")
                .bind(quantity)
                .bind(cart_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "product {product_id} is not in cart {cart_id}"
            )));
        }

        self.touch(cart_id).await?;
        self.load(cart_id).await
    }

    async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError> {
        self.load(cart_id).await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = ? AND product_id = ?")
            .bind(cart_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "product {product_id} is not in cart {cart_id}"
            )));
        }

        self.touch(cart_id).await?;
        self.load(cart_id).await
    }

    async fn replace_items(&self, cart_id: Uuid, items: &[CartItem]) -> Result<(), AppError> {
        self.load(cart_id).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for item in items {
            sqlx::query(
                "INSERT INTO cart_items (cart_id, product_id, quantity, added_at) VALUES (?, ?, ?, ?)",
            )
            .bind(cart_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, cart_id: Uuid) -> Result<(), AppError> {
        self.load(cart_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;

        self.touch(cart_id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM carts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}
