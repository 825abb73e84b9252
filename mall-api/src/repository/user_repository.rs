use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::domain::models::user::{Role, User};
use crate::error::AppError;
use crate::repository::map_unique_violation;
use crate::utils::pagination::Paginated;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 邮箱唯一，冲突返回 Conflict
    async fn insert(&self, user: &User) -> Result<(), AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list(&self, page: u64, limit: u64) -> Result<Paginated<User>, AppError>;
    async fn update(&self, user: &User) -> Result<(), AppError>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;
    async fn set_cart(&self, id: Uuid, cart: Option<Uuid>) -> Result<(), AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

pub struct MySqlUserRepository {
    pool: MySqlPool,
}

impl MySqlUserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, age, password_hash, role, cart, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    age: i32,
    password_hash: String,
    role: String,
    cart: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            age: row.age,
            password_hash: row.password_hash,
            // 未知角色一律按最低权限处理
            role: Role::parse(&row.role).unwrap_or(Role::User),
            cart: row.cart,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl UserRepository for MySqlUserRepository {
    async fn insert(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, email, age, password_hash, role, cart, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.age)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.cart)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email is already registered"))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn list(&self, page: u64, limit: u64) -> Result<Paginated<User>, AppError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await? as u64;

        let offset = (page - 1) * limit;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated::new(
            rows.into_iter().map(User::from).collect(),
            total,
            page,
            limit,
        ))
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = ?, last_name = ?, email = ?, age = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.age)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email is already registered"))?;

        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_cart(&self, id: Uuid, cart: Option<Uuid>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET cart = ?, updated_at = ? WHERE id = ?")
            .bind(cart)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
