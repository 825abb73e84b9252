use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// 统一响应包装：成功带 payload，失败带 message
#[derive(Debug, Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(payload: T) -> Self {
        Self {
            status: "success",
            payload: Some(payload),
            message: None,
        }
    }

    pub fn success_with_message(message: impl Into<String>, payload: T) -> Self {
        Self {
            status: "success",
            payload: Some(payload),
            message: Some(message.into()),
        }
    }
}

impl ApiResponse<Value> {
    /// 只有提示语、没有数据的成功响应
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            payload: None,
            message: Some(message.into()),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
