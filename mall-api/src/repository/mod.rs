mod cart_repository;
mod memory;
mod password_reset_repository;
mod product_repository;
mod ticket_repository;
mod user_repository;

pub use cart_repository::{CartRepository, MySqlCartRepository};
pub use memory::MemoryStore;
pub use password_reset_repository::{MySqlPasswordResetRepository, PasswordResetRepository};
pub use product_repository::{MySqlProductRepository, ProductRepository};
pub use ticket_repository::{MySqlTicketRepository, TicketRepository};
pub use user_repository::{MySqlUserRepository, UserRepository};

use sqlx::MySqlPool;
use std::sync::Arc;

use crate::error::AppError;

/// 仓储集合，按配置装配 MySQL 或内存后端
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub users: Arc<dyn UserRepository>,
    pub reset_tokens: Arc<dyn PasswordResetRepository>,
}

impl Stores {
    pub fn mysql(pool: MySqlPool) -> Self {
        Self {
            products: Arc::new(MySqlProductRepository::new(pool.clone())),
            carts: Arc::new(MySqlCartRepository::new(pool.clone())),
            tickets: Arc::new(MySqlTicketRepository::new(pool.clone())),
            users: Arc::new(MySqlUserRepository::new(pool.clone())),
            reset_tokens: Arc::new(MySqlPasswordResetRepository::new(pool)),
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            products: store.clone(),
            carts: store.clone(),
            tickets: store.clone(),
            users: store.clone(),
            reset_tokens: store,
        }
    }
}

/// 唯一键冲突转换为业务冲突错误，其余原样上抛
pub(crate) fn map_unique_violation(err: sqlx::Error, conflict: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(conflict.to_string())
        }
        _ => AppError::Database(err),
    }
}
