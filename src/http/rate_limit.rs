//! 按客户端 IP 的固定窗口限流

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use serde_json::json;

use super::AppState;
use crate::server_config::RateLimitConfig;

/// 超过该数量的客户端记录时清理已过期窗口
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    message: &'static str,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, message: &'static str) -> Self {
        Self {
            config,
            message,
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, client: &str) -> Result<RateLimitStatus, RateLimitExceeded> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Result<RateLimitStatus, RateLimitExceeded> {
        let window_len = self.config.window();
        if self.windows.len() > PRUNE_THRESHOLD {
            self.windows
                .retain(|_, w| now.duration_since(w.started) < window_len);
        }

        let mut entry = self.windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= window_len {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let elapsed = now.duration_since(entry.started);
        let reset_secs = window_len.saturating_sub(elapsed).as_secs().max(1);
        if entry.count >= self.config.max_requests {
            return Err(RateLimitExceeded {
                limit: self.config.max_requests,
                retry_after_secs: reset_secs,
            });
        }
        entry.count += 1;
        Ok(RateLimitStatus {
            limit: self.config.max_requests,
            remaining: self.config.max_requests - entry.count,
            reset_secs,
        })
    }
}

/// 优先使用连接地址，其次 `X-Forwarded-For` 的第一个地址
fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 已存在的限流头保留（AI 路由的限流头优先于全局限流）
fn append_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    for (name, value) in [
        ("x-ratelimit-limit", status.limit.to_string()),
        ("x-ratelimit-remaining", status.remaining.to_string()),
        ("x-ratelimit-reset", status.reset_secs.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.entry(name).or_insert(value);
        }
    }
}

async fn enforce(limiter: &RateLimiter, request: Request, next: Next) -> Response {
    let client = client_key(&request);
    match limiter.check(&client) {
        Ok(status) => {
            let mut response = next.run(request).await;
            append_rate_limit_headers(response.headers_mut(), &status);
            response
        }
        Err(rate) => {
            tracing::warn!("🚦 限流触发: client={}, path={}", client, request.uri().path());
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "success": false,
                    "error": limiter.message,
                })),
            )
                .into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&rate.retry_after_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
            append_rate_limit_headers(
                headers,
                &RateLimitStatus {
                    limit: rate.limit,
                    remaining: 0,
                    reset_secs: rate.retry_after_secs,
                },
            );
            response
        }
    }
}

pub async fn global_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state.global_limiter, request, next).await
}

pub async fn ai_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state.ai_limiter, request, next).await
}
