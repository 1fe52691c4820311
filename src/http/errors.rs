//! 统一的错误响应
//!
//! 失败统一返回 `{success: false, error}`；非生产模式下由 `attach_error_details`
//! 中间件补充 `details` 字段。

use std::any::Any;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, OriginalUri, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::models::{AppError, AppErrorType};

pub fn status_for(error_type: AppErrorType) -> StatusCode {
    match error_type {
        AppErrorType::Validation => StatusCode::BAD_REQUEST,
        AppErrorType::NotFound => StatusCode::NOT_FOUND,
        AppErrorType::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        AppErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
        AppErrorType::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AppErrorType::LLM | AppErrorType::Network => StatusCode::BAD_GATEWAY,
        AppErrorType::Database => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn render(err: &AppError, with_details: bool) -> Response {
    let mut body = json!({
        "success": false,
        "error": err.message,
    });
    if with_details {
        if let Some(details) = &err.details {
            body["details"] = details.clone();
        }
    }
    (status_for(err.error_type), Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.error_type);
        if status.is_server_error() {
            tracing::error!("❌ {:?}: {} ({:?})", self.error_type, self.message, self.details);
        }
        let mut response = render(&self, false);
        response.extensions_mut().insert(self);
        response
    }
}

/// 非生产模式下把内部细节写回错误响应
pub async fn attach_error_details(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if state.config.production {
        return response;
    }
    match response.extensions().get::<AppError>() {
        Some(err) if err.details.is_some() => {
            let mut detailed = render(err, true);
            // 保留内层中间件写入的响应头（如限流计数）
            *detailed.headers_mut() = response.headers().clone();
            detailed
        }
        _ => response,
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::with_details(
            AppErrorType::Validation,
            "请求体不是合法的JSON",
            Value::String(rejection.body_text()),
        )
    }
}

/// `axum::Json` 的包装，解析失败时返回统一的 400 信封
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

pub async fn not_found(OriginalUri(uri): OriginalUri) -> Response {
    not_found_response(uri.to_string())
}

fn not_found_response(path: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "接口不存在",
            "path": path,
        })),
    )
        .into_response()
}

/// 路径存在但方法未注册时，同样返回 404 信封
pub async fn method_not_allowed_as_not_found(request: Request, next: Next) -> Response {
    let path = request.uri().to_string();
    let response = next.run(request).await;
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        return not_found_response(path);
    }
    response
}

pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!("💥 请求处理发生 panic: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "error": "服务器内部错误",
        })),
    )
        .into_response()
}
