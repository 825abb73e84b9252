use axum::{
    Extension, Router,
    extract::{Path, State},
    routing::get,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::domain::models::ticket::Ticket;
use crate::domain::services::auth_service::Identity;
use crate::error::AppError;
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(my_tickets))
        .route("/{id}", get(get_ticket))
}

/// 当前用户的购买记录，新的在前
async fn my_tickets(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<ApiResponse<Vec<Ticket>>, AppError> {
    let tickets = state
        .stores
        .tickets
        .list_by_purchaser(&identity.email)
        .await?;

    Ok(ApiResponse::success(tickets))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Ticket>, AppError> {
    let ticket = state
        .stores
        .tickets
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ticket {id} not found")))?;

    // 只有买家本人和管理员能看
    if !identity.is_admin() && ticket.purchaser != identity.email {
        return Err(AppError::Forbidden(
            "ticket belongs to another purchaser".to_string(),
        ));
    }

    Ok(ApiResponse::success(ticket))
}
