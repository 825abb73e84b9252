use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::product::{PriceSort, Product, ProductFilter};
use crate::error::AppError;
use crate::repository::ProductRepository;
use crate::utils::pagination::Paginated;

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub code: String,
    pub price: f64,
    pub stock: i32,
    pub category: String,
    pub thumbnails: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub status: Option<bool>,
    pub thumbnails: Option<Vec<String>>,
}

pub struct ProductService {
    products: Arc<dyn ProductRepository>,
}

impl ProductService {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    pub async fn list(
        &self,
        filter: ProductFilter,
        sort: Option<PriceSort>,
        page: u64,
        limit: u64,
    ) -> Result<Paginated<Product>, AppError> {
        self.products.list(&filter, sort, page, limit).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, AppError> {
        self.products
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {id} not found")))
    }

    pub async fn create(&self, data: NewProduct) -> Result<Product, AppError> {
        // 1. 业务字段校验
        validate_text("title", &data.title)?;
        validate_text("description", &data.description)?;
        validate_text("code", &data.code)?;
        validate_text("category", &data.category)?;
        validate_price(data.price)?;
        validate_stock(data.stock)?;

        // 2. 商品编码唯一
        if self.products.find_by_code(&data.code).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "product code {} already exists",
                data.code
            )));
        }

        // 3. 入库
        let product = Product::new(
            &data.title,
            &data.description,
            &data.code,
            data.price,
            data.stock,
            &data.category,
            data.thumbnails,
        );
        self.products.insert(&product).await?;

        tracing::info!(product = %product.id, code = %product.code, "product created");
        Ok(product)
    }

    pub async fn update(&self, id: Uuid, patch: ProductPatch) -> Result<Product, AppError> {
        let mut product = self.get(id).await?;

        if let Some(title) = patch.title {
            validate_text("title", &title)?;
            product.title = title;
        }
        if let Some(description) = patch.description {
            validate_text("description", &description)?;
            product.description = description;
        }
        if let Some(code) = patch.code {
            validate_text("code", &code)?;
            // 换编码时重新检查唯一性
            if code != product.code
                && self.products.find_by_code(&code).await?.is_some()
            {
                return Err(AppError::Conflict(format!("product code {code} already exists")));
            }
            product.code = code;
        }
        if let Some(price) = patch.price {
            validate_price(price)?;
            product.price = price;
        }
        if let Some(stock) = patch.stock {
            validate_stock(stock)?;
            product.stock = stock;
        }
        if let Some(category) = patch.category {
            validate_text("category", &category)?;
            product.category = category;
        }
        if let Some(status) = patch.status {
            product.status = status;
        }
        if let Some(thumbnails) = patch.thumbnails {
            product.thumbnails = thumbnails;
        }

        product.updated_at = Utc::now();
        self.products.update(&product).await?;
        Ok(product)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.products.delete(id).await? {
            return Err(AppError::NotFound(format!("product {id} not found")));
        }
        tracing::info!(product = %id, "product deleted");
        Ok(())
    }
}

fn validate_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), AppError> {
    if !(price > 0.0) {
        return Err(AppError::Validation("price must be positive".to_string()));
    }
    Ok(())
}

fn validate_stock(stock: i32) -> Result<(), AppError> {
    if stock < 0 {
        return Err(AppError::Validation("stock cannot be negative".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn service() -> ProductService {
        ProductService::new(Arc::new(MemoryStore::new()))
    }

    fn new_product(code: &str) -> NewProduct {
        NewProduct {
            title: "keyboard".to_string(),
            description: "mechanical keyboard".to_string(),
            code: code.to_string(),
            price: 89.9,
            stock: 10,
            category: "peripherals".to_string(),
            thumbnails: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_rejects_blank_fields_and_bad_numbers() {
        let service = service();

        let mut data = new_product("K-1");
        data.title = "  ".to_string();
        assert!(matches!(
            service.create(data).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let mut data = new_product("K-1");
        data.price = 0.0;
        assert!(matches!(
            service.create(data).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let mut data = new_product("K-1");
        data.stock = -1;
        assert!(matches!(
            service.create(data).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_code_is_a_conflict() {
        let service = service();
        service.create(new_product("K-1")).await.unwrap();
        let err = service.create(new_product("K-1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn created_product_defaults_to_available() {
        let service = service();
        let product = service.create(new_product("K-2")).await.unwrap();
        assert!(product.status);
        assert_eq!(service.get(product.id).await.unwrap().code, "K-2");
    }

    #[tokio::test]
    async fn update_patches_only_given_fields() {
        let service = service();
        let product = service.create(new_product("K-3")).await.unwrap();

        let updated = service
            .update(
                product.id,
                ProductPatch {
                    price: Some(59.9),
                    stock: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.price, 59.9);
        assert_eq!(updated.stock, 3);
        assert_eq!(updated.title, "keyboard");
        assert_eq!(updated.code, "K-3");
    }

    #[tokio::test]
    async fn update_to_taken_code_conflicts() {
        let service = service();
        service.create(new_product("K-4")).await.unwrap();
        let other = service.create(new_product("K-5")).await.unwrap();

        let err = service
            .update(
                other.id,
                ProductPatch {
                    code: Some("K-4".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let service = service();
        assert!(matches!(
            service.get(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            service.delete(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
