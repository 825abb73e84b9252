use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{carts, products, realtime, sessions, tickets, users};
use crate::config::Config;
use crate::domain::services::auth_service::{Authenticator, BearerAuthenticator};
use crate::error::AppError;
use crate::infrastructure::mail::MailManager;
use crate::middleware::auth as auth_middleware;
use crate::repository::Stores;

/// 目录变更的广播缓冲：订阅者总会再收到全量，积压可以很小
const FEED_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub mail: MailManager,
    pub authenticator: Arc<dyn Authenticator>,
    pub feed: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, mail: MailManager) -> Self {
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(BearerAuthenticator::new(config.auth.jwt_secret.clone()));
        let (feed, _) = broadcast::channel(FEED_CAPACITY);

        Self {
            config,
            stores,
            mail,
            authenticator,
            feed,
        }
    }
}

pub async fn create_app(state: AppState) -> Result<Router, AppError> {
    let app_state = Arc::new(state);

    // 健康检查路由
    let health_route = Router::new().route("/health", get(|| async { "OK" }));

    // API 路由
    let api_routes = Router::new()
        .nest("/products", products::routes())
        .nest("/carts", carts::routes())
        .nest("/sessions", sessions::routes())
        .nest("/users", users::routes())
        .nest("/tickets", tickets::routes());

    // 组合所有路由
    let app = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/ws", realtime::routes())
        .merge(health_route)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(app_state);

    Ok(app)
}
