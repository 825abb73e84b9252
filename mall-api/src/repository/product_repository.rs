use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::models::product::{PriceSort, Product, ProductFilter};
use crate::error::AppError;
use crate::repository::map_unique_violation;
use crate::utils::pagination::Paginated;

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list(
        &self,
        filter: &ProductFilter,
        sort: Option<PriceSort>,
        page: u64,
        limit: u64,
    ) -> Result<Paginated<Product>, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, AppError>;
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, AppError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, AppError>;
    async fn insert(&self, product: &Product) -> Result<(), AppError>;
    async fn update(&self, product: &Product) -> Result<(), AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
    /// 条件扣减库存：只有剩余库存足够时才生效，同一商品上的并发由此串行化
    async fn decrement_stock_if_available(&self, id: Uuid, quantity: u32)
    -> Result<bool, AppError>;
}

pub struct MySqlProductRepository {
    pool: MySqlPool,
}

impl MySqlProductRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, title, description, code, price, stock, category, status, thumbnails, created_at, updated_at";

/// 行结构，手动转换为领域对象
#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    title: String,
    description: String,
    code: String,
    price: f64,
    stock: i32,
    category: String,
    status: bool,
    thumbnails: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            title: row.title,
            description: row.description,
            code: row.code,
            price: row.price,
            stock: row.stock,
            category: row.category,
            status: row.status,
            thumbnails: row.thumbnails.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ProductRepository for MySqlProductRepository {
    async fn list(
        &self,
        filter: &ProductFilter,
        sort: Option<PriceSort>,
        page: u64,
        limit: u64,
    ) -> Result<Paginated<Product>, AppError> {
        // query 同时匹配分类与上架状态字面值
        let where_sql = if filter.query.is_some() {
            " WHERE category = ? OR status = ?"
        } else {
            ""
        };
        let order_sql = match sort {
            Some(PriceSort::Asc) => " ORDER BY price ASC, id ASC",
            Some(PriceSort::Desc) => " ORDER BY price DESC, id ASC",
            None => " ORDER BY created_at DESC, id ASC",
        };

        let count_sql = format!("SELECT COUNT(*) FROM products{where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(q) = &filter.query {
            count_query = count_query.bind(q).bind(q == "true");
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        let offset = (page - 1) * limit;
        let select_sql =
            format!("SELECT {PRODUCT_COLUMNS} FROM products{where_sql}{order_sql} LIMIT ? OFFSET ?");
        let mut select_query = sqlx::query_as::<_, ProductRow>(&select_sql);
        if let Some(q) = &filter.query {
            select_query = select_query.bind(q).bind(q == "true");
        }
        let rows = select_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated::new(
            rows.into_iter().map(Product::from).collect(),
            total,
            page,
            limit,
        ))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Product::from))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, ProductRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = ?");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Product::from))
    }

    async fn insert(&self, product: &Product) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, title, description, code, price, stock, category, status, thumbnails, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.code)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.category)
        .bind(product.status)
        .bind(Json(&product.thumbnails))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "product code already exists"))?;

        Ok(())
    }

    async fn update(&self, product: &Product) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE products
            SET title = ?, description = ?, code = ?, price = ?, stock = ?, category = ?, status = ?, thumbnails = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.code)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.category)
        .bind(product.status)
        .bind(Json(&product.thumbnails))
        .bind(product.updated_at)
        .bind(product.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "product code already exists"))?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn decrement_stock_if_available(
        &self,
        id: Uuid,
        quantity: u32,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - ?, updated_at = ? WHERE id = ? AND stock >= ?",
        )
        .bind(quantity)
        .bind(Utc::now())
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
