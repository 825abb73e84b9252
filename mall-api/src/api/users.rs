use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::api::response::ApiResponse;
use crate::domain::models::user::{Role, User};
use crate::domain::services::auth_service::Identity;
use crate::domain::services::user_service::{UserPatch, UserService};
use crate::error::AppError;
use crate::middleware::auth::{require_admin, require_self_or_admin};
use crate::server::AppState;
use crate::utils::pagination::{Paginated, PaginationParams};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i32,
    pub role: Role,
    pub cart: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            age: user.age,
            role: user.role,
            cart: user.cart,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// 密码和角色都不在可更新字段里
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,
    #[validate(range(min = 0, max = 120, message = "age must be between 0 and 120"))]
    pub age: Option<i32>,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(pagination): Query<PaginationParams>,
) -> Result<ApiResponse<Paginated<UserResponse>>, AppError> {
    require_admin(&identity)?;

    let service = UserService::new(state.stores.users.clone());
    let users = service
        .list(pagination.page(), pagination.limit())
        .await?
        .map(UserResponse::from);

    Ok(ApiResponse::success(users))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    require_self_or_admin(&identity, id)?;

    let service = UserService::new(state.stores.users.clone());
    let user = service.get(id).await?;

    Ok(ApiResponse::success(UserResponse::from(user)))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    require_self_or_admin(&identity, id)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = UserService::new(state.stores.users.clone());
    let user = service
        .update_profile(
            id,
            UserPatch {
                first_name: payload.first_name,
                last_name: payload.last_name,
                email: payload.email,
                age: payload.age,
            },
        )
        .await?;

    Ok(ApiResponse::success(UserResponse::from(user)))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    require_self_or_admin(&identity, id)?;

    let service = UserService::new(state.stores.users.clone());
    service.delete(id).await?;

    Ok(ApiResponse::message("user deleted"))
}
