use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::cart::Cart;
use crate::domain::models::product::Product;
use crate::error::AppError;
use crate::repository::{CartRepository, ProductRepository};

/// 购物车行，带上显式关联出来的商品；商品被删后 product 为空
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartDetail {
    pub id: Uuid,
    pub items: Vec<CartLine>,
}

pub struct CartService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>, products: Arc<dyn ProductRepository>) -> Self {
        Self { carts, products }
    }

    pub async fn create(&self) -> Result<Cart, AppError> {
        self.carts.create().await
    }

    pub async fn get_detail(&self, id: Uuid) -> Result<CartDetail, AppError> {
        // 1. 读取购物车
        let cart = self
            .carts
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cart {id} not found")))?;

        // 2. 批量取回关联商品，不依赖存储层联查
        let ids: Vec<Uuid> = cart.items.iter().map(|i| i.product_id).collect();
        let mut by_id: HashMap<Uuid, Product> = self
            .products
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(CartDetail {
            id: cart.id,
            items: cart
                .items
                .into_iter()
                .map(|item| CartLine {
                    product: by_id.remove(&item.product_id),
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        })
    }

    pub async fn add_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError> {
        // 加购前商品必须存在
        if self.products.find_by_id(product_id).await?.is_none() {
            return Err(AppError::NotFound(format!("product {product_id} not found")));
        }
        self.carts.add_item(cart_id, product_id).await
    }

    pub async fn set_quantity(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, AppError> {
        if quantity < 1 {
            return Err(AppError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        self.carts.set_quantity(cart_id, product_id, quantity).await
    }

    pub async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError> {
        self.carts.remove_item(cart_id, product_id).await
    }

    pub async fn clear(&self, cart_id: Uuid) -> Result<(), AppError> {
        self.carts.clear(cart_id).await
    }

    pub async fn delete(&self, cart_id: Uuid) -> Result<(), AppError> {
        if !self.carts.delete(cart_id).await? {
            return Err(AppError::NotFound(format!("cart {cart_id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::product::Product;
    use crate::repository::MemoryStore;

    fn service() -> (CartService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CartService::new(store.clone(), store.clone()), store)
    }

    async fn seed_product(store: &MemoryStore) -> Product {
        let product = Product::new("mug", "ceramic mug", "M-1", 9.5, 20, "kitchen", Vec::new());
        ProductRepository::insert(store, &product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn adding_unknown_product_fails() {
        let (service, _) = service();
        let cart = service.create().await.unwrap();
        let err = service.add_item(cart.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn quantity_below_one_is_rejected() {
        let (service, store) = service();
        let product = seed_product(&store).await;
        let cart = service.create().await.unwrap();
        service.add_item(cart.id, product.id).await.unwrap();

        let err = service
            .set_quantity(cart.id, product.id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let cart = service.set_quantity(cart.id, product.id, 4).await.unwrap();
        assert_eq!(cart.items[0].quantity, 4);
    }

    #[tokio::test]
    async fn detail_joins_products_and_flags_missing_ones() {
        let (service, store) = service();
        let product = seed_product(&store).await;
        let cart = service.create().await.unwrap();
        service.add_item(cart.id, product.id).await.unwrap();

        let detail = service.get_detail(cart.id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(
            detail.items[0].product.as_ref().map(|p| p.code.as_str()),
            Some("M-1")
        );

        // 商品被目录删掉后，行还在但快照为空
        ProductRepository::delete(store.as_ref(), product.id)
            .await
            .unwrap();
        let detail = service.get_detail(cart.id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        assert!(detail.items[0].product.is_none());
    }

    #[tokio::test]
    async fn clear_empties_but_keeps_the_cart() {
        let (service, store) = service();
        let product = seed_product(&store).await;
        let cart = service.create().await.unwrap();
        service.add_item(cart.id, product.id).await.unwrap();

        service.clear(cart.id).await.unwrap();
        let detail = service.get_detail(cart.id).await.unwrap();
        assert!(detail.items.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_the_cart() {
        let (service, _) = service();
        let cart = service.create().await.unwrap();
        service.delete(cart.id).await.unwrap();
        assert!(matches!(
            service.get_detail(cart.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
