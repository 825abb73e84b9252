use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::api::response::ApiResponse;
use crate::domain::models::user::{Role, User};
use crate::domain::services::auth_service::{AuthService, Identity, RegisterData};
use crate::domain::services::user_service::UserService;
use crate::error::AppError;
use crate::server::AppState;

/// 忘记密码永远回同一句话，不能让调用方探测邮箱是否注册
const RESET_REQUESTED_MESSAGE: &str =
    "If the email is registered, a recovery message has been sent";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/current", get(current))
        .route("/forgot-password", post(forgot_password))
        .route(
            "/reset-password/{token}",
            get(validate_reset_token).post(reset_password),
        )
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "first_name cannot be empty"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last_name cannot be empty"))]
    pub last_name: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(range(min = 0, max = 120, message = "age must be between 0 and 120"))]
    pub age: i32,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// 登录/注册响应：旧客户端期望 token 自带 Bearer 前缀
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i32,
    pub role: Role,
    pub cart: Option<Uuid>,
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(&state.stores, state.mail.clone(), &state.config.auth)
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (user, token) = auth_service(&state)
        .register(RegisterData {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            age: payload.age,
            password: payload.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            status: "success",
            message: "user registered",
            token: format!("Bearer {token}"),
            user: SessionUser::from(&user),
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (user, token) = auth_service(&state)
        .login(&payload.email, &payload.password)
        .await?;

    Ok(Json(AuthResponse {
        status: "success",
        message: "login successful",
        token: format!("Bearer {token}"),
        user: SessionUser::from(&user),
    }))
}

async fn current(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<ApiResponse<ProfileResponse>, AppError> {
    let user = UserService::new(state.stores.users.clone())
        .get(identity.id)
        .await?;

    Ok(ApiResponse::success(ProfileResponse {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        age: user.age,
        role: user.role,
        cart: user.cart,
    }))
}

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    auth_service(&state).forgot_password(&payload.email).await?;

    Ok(ApiResponse::message(RESET_REQUESTED_MESSAGE))
}

async fn validate_reset_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    if !auth_service(&state).validate_reset_token(&token).await? {
        return Err(AppError::Validation(
            "invalid or expired reset token".to_string(),
        ));
    }

    Ok(ApiResponse::message("reset token is valid"))
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    auth_service(&state)
        .reset_password(&token, &payload.password)
        .await?;

    Ok(ApiResponse::message("password updated"))
}
