use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::cart::{Cart, CartItem};
use crate::domain::models::password_reset::PasswordResetToken;
use crate::domain::models::product::{PriceSort, Product, ProductFilter};
use crate::domain::models::ticket::{Ticket, TicketDraft};
use crate::domain::models::user::User;
use crate::error::AppError;
use crate::repository::{
    CartRepository, PasswordResetRepository, ProductRepository, TicketRepository, UserRepository,
};
use crate::utils::pagination::Paginated;

/// 内存后端：供测试和无数据库部署使用。
/// 条件更新（库存扣减、令牌消费）靠写锁获得与数据库同级的原子性。
pub struct MemoryStore {
    products: RwLock<HashMap<Uuid, Product>>,
    carts: RwLock<HashMap<Uuid, Cart>>,
    tickets: RwLock<Vec<Ticket>>,
    users: RwLock<HashMap<Uuid, User>>,
    reset_tokens: RwLock<HashMap<String, PasswordResetToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            carts: RwLock::new(HashMap::new()),
            tickets: RwLock::new(Vec::new()),
            users: RwLock::new(HashMap::new()),
            reset_tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cart_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("cart {id} not found"))
}

fn paginate<T>(mut items: Vec<T>, page: u64, limit: u64) -> Paginated<T> {
    let total = items.len() as u64;
    let offset = ((page - 1) * limit) as usize;
    let items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(limit as usize).collect()
    };
    Paginated::new(items, total, page, limit)
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list(
        &self,
        filter: &ProductFilter,
        sort: Option<PriceSort>,
        page: u64,
        limit: u64,
    ) -> Result<Paginated<Product>, AppError> {
        let guard = self.products.read().await;
        let mut matched: Vec<Product> = guard
            .values()
            .filter(|product| filter.matches(product))
            .cloned()
            .collect();
        drop(guard);

        // 排序补上 id 作为决胜项，保证翻页切片稳定
        match sort {
            Some(PriceSort::Asc) => matched.sort_by(|a, b| {
                a.price
                    .partial_cmp(&b.price)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            Some(PriceSort::Desc) => matched.sort_by(|a, b| {
                b.price
                    .partial_cmp(&a.price)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            None => matched
                .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))),
        }

        Ok(paginate(matched, page, limit))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>, AppError> {
        let guard = self.products.read().await;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        let guard = self.products.read().await;
        Ok(guard.values().find(|p| p.code == code).cloned())
    }

    async fn insert(&self, product: &Product) -> Result<(), AppError> {
        let mut guard = self.products.write().await;
        if guard.values().any(|p| p.code == product.code) {
            return Err(AppError::Conflict("product code already exists".to_string()));
        }
        guard.insert(product.id, product.clone());
        Ok(())
    }

    async fn update(&self, product: &Product) -> Result<(), AppError> {
        let mut guard = self.products.write().await;
        if guard
            .values()
            .any(|p| p.code == product.code && p.id != product.id)
        {
            return Err(AppError::Conflict("product code already exists".to_string()));
        }
        guard.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.products.write().await.remove(&id).is_some())
    }

    async fn decrement_stock_if_available(
        &self,
        id: Uuid,
        quantity: u32,
    ) -> Result<bool, AppError> {
        let mut guard = self.products.write().await;
        let Some(product) = guard.get_mut(&id) else {
            return Ok(false);
        };
        if product.stock < quantity as i32 {
            return Ok(false);
        }
        product.stock -= quantity as i32;
        product.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn create(&self) -> Result<Cart, AppError> {
        let cart = Cart::new();
        self.carts.write().await.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, AppError> {
        Ok(self.carts.read().await.get(&id).cloned())
    }

    async fn add_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError> {
        let mut guard = self.carts.write().await;
        let cart = guard.get_mut(&cart_id).ok_or_else(|| cart_not_found(cart_id))?;

        match cart.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => item.quantity += 1,
            None => cart.items.push(CartItem {
                product_id,
                quantity: 1,
            }),
        }
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn set_quantity(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, AppError> {
        let mut guard = self.carts.write().await;
        let cart = guard.get_mut(&cart_id).ok_or_else(|| cart_not_found(cart_id))?;

        let item = cart
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("product {product_id} is not in cart {cart_id}"))
            })?;
        item.quantity = quantity;
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<Cart, AppError> {
        let mut guard = self.carts.write().await;
        let cart = guard.get_mut(&cart_id).ok_or_else(|| cart_not_found(cart_id))?;

        let before = cart.items.len();
        cart.items.retain(|i| i.product_id != product_id);
        if cart.items.len() == before {
            return Err(AppError::NotFound(format!(
                "product {product_id} is not in cart {cart_id}"
            )));
        }
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn replace_items(&self, cart_id: Uuid, items: &[CartItem]) -> Result<(), AppError> {
        let mut guard = self.carts.write().await;
        let cart = guard.get_mut(&cart_id).ok_or_else(|| cart_not_found(cart_id))?;
        cart.items = items.to_vec();
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn clear(&self, cart_id: Uuid) -> Result<(), AppError> {
        let mut guard = self.carts.write().await;
        let cart = guard.get_mut(&cart_id).ok_or_else(|| cart_not_found(cart_id))?;
        cart.items.clear();
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.carts.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn create(&self, draft: TicketDraft) -> Result<Ticket, AppError> {
        let ticket = Ticket {
            id: Uuid::new_v4(),
            code: Uuid::new_v4().to_string(),
            purchaser: draft.purchaser,
            amount: draft.amount,
            purchase_datetime: Utc::now(),
            items: draft.items,
        };
        self.tickets.write().await.push(ticket.clone());
        Ok(ticket)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>, AppError> {
        let guard = self.tickets.read().await;
        Ok(guard.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_purchaser(&self, email: &str) -> Result<Vec<Ticket>, AppError> {
        let guard = self.tickets.read().await;
        let mut tickets: Vec<Ticket> = guard
            .iter()
            .filter(|t| t.purchaser == email)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.purchase_datetime.cmp(&a.purchase_datetime));
        Ok(tickets)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<(), AppError> {
        let mut guard = self.users.write().await;
        if guard.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("email is already registered".to_string()));
        }
        guard.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let guard = self.users.read().await;
        Ok(guard.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self, page: u64, limit: u64) -> Result<Paginated<User>, AppError> {
        let guard = self.users.read().await;
        let mut users: Vec<User> = guard.values().cloned().collect();
        drop(guard);
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(users, page, limit))
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let mut guard = self.users.write().await;
        if guard
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(AppError::Conflict("email is already registered".to_string()));
        }
        guard.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut guard = self.users.write().await;
        if let Some(user) = guard.get_mut(&id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_cart(&self, id: Uuid, cart: Option<Uuid>) -> Result<(), AppError> {
        let mut guard = self.users.write().await;
        if let Some(user) = guard.get_mut(&id) {
            user.cart = cart;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryStore {
    async fn insert(&self, token: &PasswordResetToken) -> Result<(), AppError> {
        let mut guard = self.reset_tokens.write().await;
        if guard.contains_key(&token.token) {
            return Err(AppError::Conflict("reset token collision".to_string()));
        }
        guard.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PasswordResetToken>, AppError> {
        Ok(self.reset_tokens.read().await.get(token).cloned())
    }

    async fn consume(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Uuid>, AppError> {
        // 写锁内完成校验和置位，与数据库的条件 UPDATE 等价
        let mut guard = self.reset_tokens.write().await;
        let Some(entry) = guard.get_mut(token) else {
            return Ok(None);
        };
        if entry.used || now >= entry.expires_at {
            return Ok(None);
        }
        entry.used = true;
        Ok(Some(entry.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::future::join_all;
    use std::sync::Arc;

    fn product(title: &str, code: &str, price: f64, stock: i32) -> Product {
        Product::new(title, "test item", code, price, stock, "misc", Vec::new())
    }

    #[tokio::test]
    async fn concurrent_decrements_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let item = product("phone", "P-001", 499.0, 5);
        ProductRepository::insert(store.as_ref(), &item).await.unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                let id = item.id;
                async move { store.decrement_stock_if_available(id, 1).await.unwrap() }
            })
            .collect();
        let results = join_all(tasks).await;

        assert_eq!(results.iter().filter(|ok| **ok).count(), 5);
        let remaining = ProductRepository::find_by_id(store.as_ref(), item.id)
            .await
            .unwrap()
            .unwrap()
            .stock;
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn decrement_rejects_larger_than_stock() {
        let store = MemoryStore::new();
        let item = product("desk", "P-002", 120.0, 3);
        ProductRepository::insert(&store, &item).await.unwrap();

        assert!(!store.decrement_stock_if_available(item.id, 4).await.unwrap());
        assert!(store.decrement_stock_if_available(item.id, 3).await.unwrap());
        assert!(!store.decrement_stock_if_available(item.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_product_code_conflicts() {
        let store = MemoryStore::new();
        ProductRepository::insert(&store, &product("a", "SAME", 1.0, 1))
            .await
            .unwrap();
        let err = ProductRepository::insert(&store, &product("b", "SAME", 2.0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn repeated_add_merges_into_one_line() {
        let store = MemoryStore::new();
        let cart = CartRepository::create(&store).await.unwrap();
        let product_id = Uuid::new_v4();

        store.add_item(cart.id, product_id).await.unwrap();
        let cart = store.add_item(cart.id, product_id).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn removing_absent_item_is_not_found() {
        let store = MemoryStore::new();
        let cart = CartRepository::create(&store).await.unwrap();
        let err = store.remove_item(cart.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn product_pages_are_disjoint_and_complete() {
        let store = MemoryStore::new();
        for i in 0..23 {
            let item = product(&format!("item {i}"), &format!("C-{i:03}"), f64::from(i), 1);
            ProductRepository::insert(&store, &item).await.unwrap();
        }

        let filter = ProductFilter::default();
        let mut seen = Vec::new();
        let mut page = 1;
        loop {
            let result = ProductRepository::list(&store, &filter, Some(PriceSort::Asc), page, 5)
                .await
                .unwrap();
            assert_eq!(result.has_next_page, page < 5);
            for item in &result.items {
                assert!(!seen.contains(&item.id), "page {page} overlaps a previous page");
                seen.push(item.id);
            }
            match result.next_page {
                Some(next) => page = next,
                None => break,
            }
        }
        assert_eq!(seen.len(), 23);
    }

    #[tokio::test]
    async fn query_matches_category_or_availability() {
        let store = MemoryStore::new();
        let mut hidden = product("old", "H-1", 1.0, 1);
        hidden.status = false;
        hidden.category = "legacy".to_string();
        ProductRepository::insert(&store, &hidden).await.unwrap();
        let mut shoes = product("sneaker", "S-1", 59.0, 4);
        shoes.category = "shoes".to_string();
        ProductRepository::insert(&store, &shoes).await.unwrap();

        let by_category = ProductRepository::list(
            &store,
            &ProductFilter { query: Some("legacy".to_string()) },
            None,
            1,
            10,
        )
        .await
        .unwrap();
        assert_eq!(by_category.items.len(), 1);
        assert_eq!(by_category.items[0].code, "H-1");

        // "true" 匹配所有上架商品
        let available = ProductRepository::list(
            &store,
            &ProductFilter { query: Some("true".to_string()) },
            None,
            1,
            10,
        )
        .await
        .unwrap();
        assert_eq!(available.items.len(), 1);
        assert_eq!(available.items[0].code, "S-1");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let first = User::new("Ana", "Silva", "ana@example.com", 30, "hash");
        UserRepository::insert(&store, &first).await.unwrap();
        let second = User::new("Other", "Ana", "ana@example.com", 25, "hash");
        let err = UserRepository::insert(&store, &second).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let token = PasswordResetToken::new(user_id, "tok-1".to_string(), Duration::hours(1));
        PasswordResetRepository::insert(&store, &token).await.unwrap();

        let now = Utc::now();
        assert_eq!(store.consume("tok-1", now).await.unwrap(), Some(user_id));
        assert_eq!(store.consume("tok-1", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_consume_spends_token_once() {
        let store = Arc::new(MemoryStore::new());
        let token = PasswordResetToken::new(Uuid::new_v4(), "tok-2".to_string(), Duration::hours(1));
        PasswordResetRepository::insert(store.as_ref(), &token)
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                async move { store.consume("tok-2", Utc::now()).await.unwrap() }
            })
            .collect();
        let winners = join_all(tasks)
            .await
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn expired_token_cannot_be_consumed() {
        let store = MemoryStore::new();
        let token =
            PasswordResetToken::new(Uuid::new_v4(), "tok-3".to_string(), Duration::minutes(-1));
        PasswordResetRepository::insert(&store, &token).await.unwrap();
        assert_eq!(store.consume("tok-3", Utc::now()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tickets_list_newest_first() {
        let store = MemoryStore::new();
        for amount in [10.0, 20.0, 30.0] {
            TicketRepository::create(
                &store,
                TicketDraft {
                    purchaser: "buyer@example.com".to_string(),
                    amount,
                    items: Vec::new(),
                },
            )
            .await
            .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let tickets = store.list_by_purchaser("buyer@example.com").await.unwrap();
        assert_eq!(tickets.len(), 3);
        assert!(tickets[0].purchase_datetime >= tickets[1].purchase_datetime);
        assert!(tickets[1].purchase_datetime >= tickets[2].purchase_datetime);
        assert!(store.list_by_purchaser("other@example.com").await.unwrap().is_empty());
    }
}
