use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::domain::models::password_reset::PasswordResetToken;
use crate::error::AppError;
use crate::repository::map_unique_violation;

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    async fn insert(&self, token: &PasswordResetToken) -> Result<(), AppError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<PasswordResetToken>, AppError>;
    /// 原子消费：仅当令牌未使用且未过期时置为已用并返回所属用户。
    /// 并发重放时只有一个调用方拿到 Some。
    async fn consume(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Uuid>, AppError>;
}

pub struct MySqlPasswordResetRepository {
    pool: MySqlPool,
}

impl MySqlPasswordResetRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PasswordResetRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
    used: bool,
    created_at: DateTime<Utc>,
}

impl From<PasswordResetRow> for PasswordResetToken {
    fn from(row: PasswordResetRow) -> Self {
        PasswordResetToken {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            expires_at: row.expires_at,
            used: row.used,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PasswordResetRepository for MySqlPasswordResetRepository {
    async fn insert(&self, token: &PasswordResetToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (id, user_id, token, expires_at, used, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.used)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "reset token collision"))?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PasswordResetToken>, AppError> {
        let row = sqlx::query_as::<_, PasswordResetRow>(
            "SELECT id, user_id, token, expires_at, used, created_at FROM password_resets WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PasswordResetToken::from))
    }

    async fn consume(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Uuid>, AppError> {
        // 校验和置位在同一条语句里完成，数据库保证只有一个并发调用生效
        let result = sqlx::query(
            "UPDATE password_resets SET used = TRUE WHERE token = ? AND used = FALSE AND expires_at > ?",
        )
        .bind(token)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Ok(None);
        }

        let user_id =
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM password_resets WHERE token = ?")
                .bind(token)
                .fetch_one(&self.pool)
                .await?;

        Ok(Some(user_id))
    }
}
