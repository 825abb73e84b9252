use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use mall_api::config::{
    AuthConfig, Config, DatabaseConfig, LoggingConfig, MailConfig, ServerConfig, StorageConfig,
};
use mall_api::domain::models::user::{Role, User};
use mall_api::domain::services::auth_service::hash_password;
use mall_api::infrastructure::mail::MailManager;
use mall_api::repository::Stores;
use mall_api::server::{AppState, create_app};

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
        },
        storage: StorageConfig {
            backend: "memory".to_string(),
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret".to_string(),
            token_expiry_hours: 24,
            reset_token_expiry_minutes: 60,
            reset_link_base: "http://localhost:8080".to_string(),
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
        mail: MailConfig {
            url: None,
            queue: "mall.mail".to_string(),
            from: "noreply@mall.local".to_string(),
        },
    }
}

async fn test_app() -> (Router, Stores) {
    let stores = Stores::memory();
    let config = test_config();
    let mail = MailManager::disabled(&config.mail);
    let state = AppState::new(config, stores.clone(), mail);
    let app = create_app(state).await.unwrap();
    (app, stores)
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// 注册响应里带着 "Bearer xxx"，取出裸令牌
fn strip_bearer(value: &Value) -> String {
    value["token"]
        .as_str()
        .unwrap()
        .trim_start_matches("Bearer ")
        .to_string()
}

async fn seed_admin(stores: &Stores) -> String {
    let mut admin = User::new(
        "Root",
        "Admin",
        "admin@mall.local",
        40,
        &hash_password("admin-secret").unwrap(),
    );
    admin.role = Role::Admin;
    stores.users.insert(&admin).await.unwrap();
    "admin-secret".to_string()
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = request(
        app,
        "POST",
        "/api/v1/sessions/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    strip_bearer(&body)
}

async fn register_user(app: &Router, email: &str) -> String {
    let (status, body) = request(
        app,
        "POST",
        "/api/v1/sessions/register",
        None,
        Some(json!({
            "first_name": "Ana",
            "last_name": "Silva",
            "email": email,
            "age": 30,
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    assert_eq!(body["status"], "success");
    strip_bearer(&body)
}

async fn create_product(app: &Router, admin_token: &str, code: &str, price: f64, stock: i32) -> String {
    let (status, body) = request(
        app,
        "POST",
        "/api/v1/products",
        Some(admin_token),
        Some(json!({
            "title": format!("product {code}"),
            "description": "integration test product",
            "code": code,
            "price": price,
            "stock": stock,
            "category": "test"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create product failed: {body}");
    body["payload"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_login_and_profile_round_trip() {
    let (app, _) = test_app().await;
    register_user(&app, "ana@example.com").await;
    let token = login(&app, "ana@example.com", "secret123").await;

    let (status, body) = request(&app, "GET", "/api/v1/sessions/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["email"], "ana@example.com");
    assert_eq!(body["payload"]["role"], "user");
    assert!(body["payload"].get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (app, _) = test_app().await;
    register_user(&app, "ana@example.com").await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/v1/sessions/register",
        None,
        Some(json!({
            "first_name": "Ana",
            "last_name": "Clone",
            "email": "ana@example.com",
            "age": 25,
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn catalog_writes_are_admin_only() {
    let (app, stores) = test_app().await;
    seed_admin(&stores).await;
    let user_token = register_user(&app, "ana@example.com").await;

    // 未登录不能建商品
    let (status, _) = request(
        &app,
        "POST",
        "/api/v1/products",
        None,
        Some(json!({ "title": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 普通用户也不行
    let (status, body) = request(
        &app,
        "POST",
        "/api/v1/products",
        Some(&user_token),
        Some(json!({
            "title": "t", "description": "d", "code": "C-1",
            "price": 1.0, "stock": 1, "category": "c"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    // 目录读取无需登录
    let admin_token = login(&app, "admin@mall.local", "admin-secret").await;
    create_product(&app, &admin_token, "C-2", 5.0, 3).await;
    let (status, body) = request(&app, "GET", "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["payload"].as_array().unwrap().len(), 1);
    assert_eq!(body["totalPages"], 1);
    assert_eq!(body["hasNextPage"], false);
}

#[tokio::test]
async fn duplicate_product_code_conflicts() {
    let (app, stores) = test_app().await;
    seed_admin(&stores).await;
    let admin_token = login(&app, "admin@mall.local", "admin-secret").await;

    create_product(&app, &admin_token, "DUP", 5.0, 3).await;
    let (status, body) = request(
        &app,
        "POST",
        "/api/v1/products",
        Some(&admin_token),
        Some(json!({
            "title": "again", "description": "d", "code": "DUP",
            "price": 2.0, "stock": 1, "category": "c"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn purchase_flow_splits_ticket_and_remainder() {
    let (app, stores) = test_app().await;
    seed_admin(&stores).await;
    let admin_token = login(&app, "admin@mall.local", "admin-secret").await;

    let product_a = create_product(&app, &admin_token, "A-1", 10.0, 5).await;
    let product_b = create_product(&app, &admin_token, "B-1", 20.0, 1).await;

    let user_token = register_user(&app, "buyer@example.com").await;

    // 建购物车并自动绑定到账号
    let (status, body) = request(&app, "POST", "/api/v1/carts", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let cart_id = body["payload"]["id"].as_str().unwrap().to_string();

    // A x2, B x3
    let uri = format!("/api/v1/carts/{cart_id}/product/{product_a}");
    let (status, _) = request(&app, "POST", &uri, Some(&user_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(
        &app,
        "PUT",
        &uri,
        Some(&user_token),
        Some(json!({ "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/v1/carts/{cart_id}/product/{product_b}");
    request(&app, "POST", &uri, Some(&user_token), None).await;
    let (status, _) = request(
        &app,
        "PUT",
        &uri,
        Some(&user_token),
        Some(json!({ "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // 别人的购物车不让结算
    let other_token = register_user(&app, "other@example.com").await;
    let purchase_uri = format!("/api/v1/carts/{cart_id}/purchase");
    let (status, _) = request(&app, "POST", &purchase_uri, Some(&other_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // 结算：A 成交，B 缺货
    let (status, body) = request(&app, "POST", &purchase_uri, Some(&user_token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    let outcome = &body["payload"];
    assert_eq!(outcome["ticket"]["amount"], 20.0);
    assert_eq!(outcome["ticket"]["purchaser"], "buyer@example.com");
    assert_eq!(outcome["ticket"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(outcome["out_of_stock"][0]["requested"], 3);
    assert_eq!(outcome["out_of_stock"][0]["available"], 1);
    assert_eq!(outcome["remainder"][0]["quantity"], 3);

    // A 库存扣到 3
    let (_, body) = request(
        &app,
        "GET",
        &format!("/api/v1/products/{product_a}"),
        None,
        None,
    )
    .await;
    assert_eq!(body["payload"]["stock"], 3);

    // 购物车里只剩 B
    let (_, body) = request(
        &app,
        "GET",
        &format!("/api/v1/carts/{cart_id}"),
        Some(&user_token),
        None,
    )
    .await;
    let items = body["payload"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"].as_str().unwrap(), product_b);
    assert_eq!(items[0]["quantity"], 3);

    // 票据可按购买人查到
    let (status, body) = request(&app, "GET", "/api/v1/tickets", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"].as_array().unwrap().len(), 1);

    // 空购物车再结算直接拒绝
    let uri = format!("/api/v1/carts/{cart_id}/product/{product_b}");
    request(&app, "DELETE", &uri, Some(&user_token), None).await;
    let (status, _) = request(&app, "POST", &purchase_uri, Some(&user_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forgot_password_is_constant_regardless_of_account() {
    let (app, _) = test_app().await;
    register_user(&app, "ana@example.com").await;

    let (status, known) = request(
        &app,
        "POST",
        "/api/v1/sessions/forgot-password",
        None,
        Some(json!({ "email": "ana@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, unknown) = request(
        &app,
        "POST",
        "/api/v1/sessions/forgot-password",
        None,
        Some(json!({ "email": "ghost@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // 已注册与未注册的响应完全一致
    assert_eq!(known, unknown);
}

#[tokio::test]
async fn users_listing_requires_admin() {
    let (app, stores) = test_app().await;
    seed_admin(&stores).await;
    let user_token = register_user(&app, "ana@example.com").await;

    let (status, _) = request(&app, "GET", "/api/v1/users", Some(&user_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_token = login(&app, "admin@mall.local", "admin-secret").await;
    let (status, body) = request(&app, "GET", "/api/v1/users", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["items"].as_array().unwrap().len(), 2);
}
