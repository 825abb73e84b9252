use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::domain::models::cart::Cart;
use crate::domain::models::user::Role;
use crate::domain::services::auth_service::Identity;
use crate::domain::services::cart_service::{CartDetail, CartService};
use crate::domain::services::checkout_service::{CheckoutService, PurchaseOutcome};
use crate::domain::services::user_service::UserService;
use crate::error::AppError;
use crate::middleware::auth::require_admin;
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_cart))
        .route("/{id}", axum::routing::get(get_cart).delete(clear_cart))
        .route(
            "/{id}/product/{pid}",
            post(add_product).put(update_quantity).delete(remove_product),
        )
        .route("/{id}/delete", delete(delete_cart))
        .route("/{id}/purchase", post(purchase))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// 购物车属于谁由 user.cart 记录；管理员放行
async fn ensure_cart_access(
    state: &AppState,
    identity: &Identity,
    cart_id: Uuid,
) -> Result<(), AppError> {
    if identity.is_admin() {
        return Ok(());
    }

    let user = state
        .stores
        .users
        .find_by_id(identity.id)
        .await?
        .ok_or_else(|| AppError::Auth("account no longer exists".to_string()))?;

    if user.cart == Some(cart_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "cart does not belong to the current user".to_string(),
        ))
    }
}

fn cart_service(state: &AppState) -> CartService {
    CartService::new(state.stores.carts.clone(), state.stores.products.clone())
}

async fn create_cart(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<(StatusCode, Json<ApiResponse<Cart>>), AppError> {
    let cart = cart_service(&state).create().await?;

    // 第一个购物车自动挂到账号上
    let users = UserService::new(state.stores.users.clone());
    users.bind_cart_if_absent(identity.id, cart.id).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(cart))))
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<CartDetail>, AppError> {
    ensure_cart_access(&state, &identity, id).await?;

    let detail = cart_service(&state).get_detail(id).await?;
    Ok(ApiResponse::success(detail))
}

async fn add_product(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((id, pid)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<Cart>, AppError> {
    ensure_cart_access(&state, &identity, id).await?;

    let cart = cart_service(&state).add_item(id, pid).await?;
    Ok(ApiResponse::success(cart))
}

async fn update_quantity(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((id, pid)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<ApiResponse<Cart>, AppError> {
    ensure_cart_access(&state, &identity, id).await?;

    let cart = cart_service(&state)
        .set_quantity(id, pid, payload.quantity)
        .await?;
    Ok(ApiResponse::success(cart))
}

async fn remove_product(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((id, pid)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<Cart>, AppError> {
    ensure_cart_access(&state, &identity, id).await?;

    let cart = cart_service(&state).remove_item(id, pid).await?;
    Ok(ApiResponse::success(cart))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    ensure_cart_access(&state, &identity, id).await?;

    cart_service(&state).clear(id).await?;
    Ok(ApiResponse::message("cart emptied"))
}

/// 彻底删除购物车，仅管理员
async fn delete_cart(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    require_admin(&identity)?;

    cart_service(&state).delete(id).await?;
    Ok(ApiResponse::message("cart deleted"))
}

async fn purchase(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<PurchaseOutcome>, AppError> {
    // 结算是买家动作：要求 user 角色，且只能结算自己的购物车
    if identity.role != Role::User {
        return Err(AppError::Forbidden("user role required".to_string()));
    }
    let user = state
        .stores
        .users
        .find_by_id(identity.id)
        .await?
        .ok_or_else(|| AppError::Auth("account no longer exists".to_string()))?;
    if user.cart != Some(id) {
        return Err(AppError::Forbidden(
            "cart does not belong to the current user".to_string(),
        ));
    }

    let service = CheckoutService::new(
        state.stores.carts.clone(),
        state.stores.products.clone(),
        state.stores.tickets.clone(),
    );
    let outcome = service.purchase(id, &identity.email).await?;

    Ok(ApiResponse::success(outcome))
}
