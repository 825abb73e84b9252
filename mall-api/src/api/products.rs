use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::api::realtime;
use crate::api::response::ApiResponse;
use crate::domain::models::product::{PriceSort, Product, ProductFilter};
use crate::domain::services::auth_service::Identity;
use crate::domain::services::product_service::{NewProduct, ProductPatch, ProductService};
use crate::error::AppError;
use crate::middleware::auth::require_admin;
use crate::server::AppState;
use crate::utils::pagination::{DEFAULT_LIMIT, Paginated};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub limit: Option<u64>,
    pub page: Option<u64>,
    pub sort: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub code: String,
    pub price: f64,
    pub stock: i32,
    pub category: String,
    pub status: bool,
    pub thumbnails: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            title: product.title,
            description: product.description,
            code: product.code,
            price: product.price,
            stock: product.stock,
            category: product.category,
            status: product.status,
            thumbnails: product.thumbnails,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

/// 目录列表沿用旧客户端依赖的扁平分页格式
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListResponse {
    pub status: &'static str,
    pub payload: Vec<ProductResponse>,
    pub total_pages: u64,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
    pub page: u64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_link: Option<String>,
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "title cannot be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "description cannot be empty"))]
    pub description: String,
    #[validate(length(min = 1, message = "code cannot be empty"))]
    pub code: String,
    #[validate(range(min = 0.01, message = "price must be positive"))]
    pub price: f64,
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: i32,
    #[validate(length(min = 1, message = "category cannot be empty"))]
    pub category: String,
    #[serde(default)]
    pub thumbnails: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    #[validate(range(min = 0.01, message = "price must be positive"))]
    pub price: Option<f64>,
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub status: Option<bool>,
    pub thumbnails: Option<Vec<String>>,
}

fn page_link(
    page: Option<u64>,
    limit: u64,
    sort: &Option<String>,
    query: &Option<String>,
) -> Option<String> {
    let page = page?;
    let mut link = format!("/api/v1/products?page={page}&limit={limit}");
    if let Some(sort) = sort {
        link.push_str(&format!("&sort={sort}"));
    }
    if let Some(query) = query {
        link.push_str(&format!("&query={query}"));
    }
    Some(link)
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListProductsQuery>,
) -> Result<Json<ProductListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).max(1);
    let page = params.page.unwrap_or(1).max(1);
    // 非法排序值按未排序处理
    let sort = params.sort.as_deref().and_then(PriceSort::parse);
    let sort_str = sort.and_then(|_| params.sort.clone());
    let filter = ProductFilter {
        query: params.query.clone(),
    };

    let service = ProductService::new(state.stores.products.clone());
    let result: Paginated<Product> = service.list(filter, sort, page, limit).await?;

    Ok(Json(ProductListResponse {
        status: "success",
        prev_link: page_link(result.prev_page, limit, &sort_str, &params.query),
        next_link: page_link(result.next_page, limit, &sort_str, &params.query),
        payload: result.items.into_iter().map(ProductResponse::from).collect(),
        total_pages: result.total_pages,
        prev_page: result.prev_page,
        next_page: result.next_page,
        page: result.page,
        has_prev_page: result.has_prev_page,
        has_next_page: result.has_next_page,
    }))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<ProductResponse>, AppError> {
    let service = ProductService::new(state.stores.products.clone());
    let product = service.get(id).await?;

    Ok(ApiResponse::success(ProductResponse::from(product)))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), AppError> {
    require_admin(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = ProductService::new(state.stores.products.clone());
    let product = service
        .create(NewProduct {
            title: payload.title,
            description: payload.description,
            code: payload.code,
            price: payload.price,
            stock: payload.stock,
            category: payload.category,
            thumbnails: payload.thumbnails,
        })
        .await?;

    // 目录变了，推给所有在线订阅者
    realtime::publish_catalog(&state).await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ProductResponse::from(product))),
    ))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<ApiResponse<ProductResponse>, AppError> {
    require_admin(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = ProductService::new(state.stores.products.clone());
    let product = service
        .update(
            id,
            ProductPatch {
                title: payload.title,
                description: payload.description,
                code: payload.code,
                price: payload.price,
                stock: payload.stock,
                category: payload.category,
                status: payload.status,
                thumbnails: payload.thumbnails,
            },
        )
        .await?;

    Ok(ApiResponse::success(ProductResponse::from(product)))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    require_admin(&identity)?;

    let service = ProductService::new(state.stores.products.clone());
    service.delete(id).await?;

    realtime::publish_catalog(&state).await;

    Ok(ApiResponse::message("product deleted"))
}
