use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::domain::models::user::{Role, User};
use crate::error::AppError;
use crate::infrastructure::mail::MailManager;
use crate::repository::{PasswordResetRepository, Stores, UserRepository};
use crate::domain::models::password_reset::PasswordResetToken;

const RESET_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

/// 已通过认证的调用方身份
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// 凭据按认证方式区分，各实现只认自己那种
#[derive(Debug, Clone)]
pub enum Credential {
    Password { email: String, password: String },
    Bearer(String),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: Credential) -> Result<Identity, AppError>;
}

/// 邮箱 + 密码认证，登录入口使用
pub struct PasswordAuthenticator {
    users: Arc<dyn UserRepository>,
}

impl PasswordAuthenticator {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn authenticate(&self, credential: Credential) -> Result<Identity, AppError> {
        let Credential::Password { email, password } = credential else {
            return Err(AppError::Auth("unsupported credential type".to_string()));
        };

        // 查无此人与密码不对给同一个提示
        let user = self
            .users
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or_else(|| AppError::Auth("invalid email or password".to_string()))?;

        if !verify_password(&password, &user.password_hash)? {
            return Err(AppError::Auth("invalid email or password".to_string()));
        }

        Ok(Identity {
            id: user.id,
            email: user.email,
            role: user.role,
        })
    }
}

/// Bearer JWT 认证，中间件使用
pub struct BearerAuthenticator {
    secret: String,
}

impl BearerAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn authenticate(&self, credential: Credential) -> Result<Identity, AppError> {
        let Credential::Bearer(token) = credential else {
            return Err(AppError::Auth("unsupported credential type".to_string()));
        };

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AppError::Auth("invalid token".to_string()))?;

        let id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::Auth("invalid token subject".to_string()))?;

        Ok(Identity {
            id,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn generate_reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RegisterData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i32,
    pub password: String,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    reset_tokens: Arc<dyn PasswordResetRepository>,
    mail: MailManager,
    jwt_secret: String,
    token_expiry_hours: u64,
    reset_token_expiry_minutes: i64,
    reset_link_base: String,
}

impl AuthService {
    pub fn new(stores: &Stores, mail: MailManager, config: &AuthConfig) -> Self {
        Self {
            users: stores.users.clone(),
            reset_tokens: stores.reset_tokens.clone(),
            mail,
            jwt_secret: config.jwt_secret.clone(),
            token_expiry_hours: config.token_expiry_hours,
            reset_token_expiry_minutes: config.reset_token_expiry_minutes,
            reset_link_base: config.reset_link_base.clone(),
        }
    }

    pub async fn register(&self, data: RegisterData) -> Result<(User, String), AppError> {
        // 1. 邮箱统一小写，先查重
        let email = data.email.trim().to_lowercase();
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("email is already registered".to_string()));
        }
        if !(0..=120).contains(&data.age) {
            return Err(AppError::Validation("age must be between 0 and 120".to_string()));
        }

        // 2. 哈希密码后入库
        let user = User::new(
            &data.first_name,
            &data.last_name,
            &email,
            data.age,
            &hash_password(&data.password)?,
        );
        self.users.insert(&user).await?;

        tracing::info!(user = %user.id, "user registered");

        // 3. 注册即颁发令牌
        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), AppError> {
        let authenticator = PasswordAuthenticator::new(self.users.clone());
        let identity = authenticator
            .authenticate(Credential::Password {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;

        let user = self
            .users
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| AppError::Auth("invalid email or password".to_string()))?;

        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(Duration::hours(self.token_expiry_hours as i64))
            .ok_or_else(|| AppError::Internal("invalid token expiry".to_string()))?
            .timestamp() as usize;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp() as usize,
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("failed to create token: {e}")))
    }

    /// 无论邮箱是否存在都返回成功，不暴露注册状态
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let Some(user) = self
            .users
            .find_by_email(&email.trim().to_lowercase())
            .await?
        else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token();
        let entry = PasswordResetToken::new(
            user.id,
            token.clone(),
            Duration::minutes(self.reset_token_expiry_minutes),
        );
        self.reset_tokens.insert(&entry).await?;

        let link = format!(
            "{}/api/v1/sessions/reset-password/{token}",
            self.reset_link_base
        );
        // 投递失败只记日志，流程照常返回成功
        if let Err(err) = self
            .mail
            .send_password_reset(&user.email, &user.first_name, &token, &link)
            .await
        {
            tracing::warn!(error = %err, "failed to publish password reset mail");
        }

        Ok(())
    }

    pub async fn validate_reset_token(&self, token: &str) -> Result<bool, AppError> {
        Ok(self
            .reset_tokens
            .find_by_token(token)
            .await?
            .map(|t| !t.used && Utc::now() < t.expires_at)
            .unwrap_or(false))
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        if new_password.len() < 6 {
            return Err(AppError::Validation(
                "password must be at least 6 characters".to_string(),
            ));
        }

        // 校验与消费是同一个原子操作，并发重放只有一个能成功
        let Some(user_id) = self.reset_tokens.consume(token, Utc::now()).await? else {
            return Err(AppError::Validation(
                "invalid or expired reset token".to_string(),
            ));
        };

        self.users
            .update_password(user_id, &hash_password(new_password)?)
            .await?;

        tracing::info!(user = %user_id, "password reset completed");
        Ok(())
    }
}
