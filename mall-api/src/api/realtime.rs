use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::api::products::ProductResponse;
use crate::domain::models::product::ProductFilter;
use crate::domain::services::product_service::ProductService;
use crate::error::AppError;
use crate::server::AppState;
use crate::utils::pagination::DEFAULT_LIMIT;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/products", get(products_feed))
}

async fn products_feed(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| subscriber_loop(socket, state))
}

async fn subscriber_loop(mut socket: WebSocket, state: Arc<AppState>) {
    let mut feed = state.feed.subscribe();

    // 新连接先收到一份当前目录
    match current_catalog(&state).await {
        Ok(snapshot) => {
            if socket.send(Message::Text(snapshot.into())).await.is_err() {
                return;
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to send catalog snapshot");
            return;
        }
    }

    loop {
        match feed.recv().await {
            Ok(update) => {
                if socket.send(Message::Text(update.into())).await.is_err() {
                    break;
                }
            }
            // 掉队的订阅者跳过积压，等下一次全量推送
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// 商品增删之后调用：把刷新后的第一页完整推给所有订阅者
pub async fn publish_catalog(state: &AppState) {
    match current_catalog(state).await {
        // 没有订阅者时 send 返回 Err，无需处理
        Ok(payload) => {
            let _ = state.feed.send(payload);
        }
        Err(err) => tracing::warn!(error = %err, "failed to refresh catalog feed"),
    }
}

async fn current_catalog(state: &AppState) -> Result<String, AppError> {
    let service = ProductService::new(state.stores.products.clone());
    let page = service
        .list(ProductFilter::default(), None, 1, DEFAULT_LIMIT)
        .await?;
    let items: Vec<ProductResponse> = page.items.into_iter().map(ProductResponse::from).collect();

    Ok(serde_json::to_string(&items)?)
}
