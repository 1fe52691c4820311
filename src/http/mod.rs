//! HTTP API
//!
//! 路由、跨域、安全响应头、限流与统一错误信封。
//! 成功响应均带 `success: true`，失败响应为 `{success: false, error}`。

mod ai;
pub mod errors;
mod health;
mod notes;
pub mod rate_limit;
mod todos;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::crypto::CryptoService;
use crate::database::Database;
use crate::llm_manager::{AiService, ChatCompletion};
use crate::notes_manager::NotesService;
use crate::server_config::ServerConfig;
use crate::settings_service::SettingsService;
use crate::todo_service::TodoService;
use rate_limit::RateLimiter;

pub use errors::AppJson;

/// 请求体上限
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
     script-src 'self'; img-src 'self' data: https:; connect-src 'self' https://api.moonshot.cn";

pub struct AppState {
    pub config: ServerConfig,
    pub notes: NotesService,
    pub todos: TodoService,
    pub ai: AiService,
    pub global_limiter: RateLimiter,
    pub ai_limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, db: Arc<Database>, client: Arc<dyn ChatCompletion>) -> Self {
        let crypto = Arc::new(CryptoService::from_secret(config.encryption_key.as_deref()));
        match crypto.verify_key_integrity() {
            Ok(true) => tracing::info!("✅ 加密服务自检通过 (临时密钥: {})", crypto.is_ephemeral()),
            Ok(false) => tracing::error!("❌ 加密服务自检失败: 解密结果不一致"),
            Err(e) => tracing::error!("❌ 加密服务自检失败: {}", e),
        }
        let settings = Arc::new(SettingsService::new(
            db.clone(),
            crypto,
            config.fallback_api_keys.clone(),
        ));
        Self {
            notes: NotesService::new(db.clone()),
            todos: TodoService::new(db),
            ai: AiService::new(client, settings),
            global_limiter: RateLimiter::new(config.global_rate_limit, "请求过于频繁，请稍后再试"),
            ai_limiter: RateLimiter::new(config.ai_rate_limit, "AI请求过于频繁，请稍后再试"),
            started_at: Instant::now(),
            config,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let ai_routes = Router::new()
        .route("/chat", post(ai::chat))
        .route("/improve", post(ai::improve))
        .route("/summarize", post(ai::summarize))
        .route("/translate", post(ai::translate))
        .route("/polish", post(ai::polish))
        .route("/rewrite", post(ai::rewrite))
        .route("/generate-tags", post(ai::generate_tags))
        .route("/semantic-search", post(ai::semantic_search))
        .route("/status", get(ai::status))
        .route("/set-key", post(ai::set_key))
        .route("/remove-key", delete(ai::remove_key))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::ai_rate_limit,
        ));

    let api_routes = Router::new()
        .route(
            "/api/notes",
            get(notes::list_notes)
                .post(notes::create_note)
                .delete(notes::delete_notes),
        )
        .route("/api/notes/search/:query", get(notes::search_notes))
        .route("/api/notes/stats/summary", get(notes::note_stats))
        .route("/api/notes/recent", get(notes::recent_notes))
        .route(
            "/api/notes/:id",
            get(notes::get_note)
                .put(notes::update_note)
                .delete(notes::delete_note),
        )
        .route("/api/todos", get(todos::list_todos).post(todos::create_todo))
        .route("/api/todos/stats/summary", get(todos::todo_stats))
        .route(
            "/api/todos/cleanup/completed",
            delete(todos::cleanup_completed),
        )
        .route(
            "/api/todos/:id",
            get(todos::get_todo)
                .put(todos::update_todo)
                .delete(todos::delete_todo),
        )
        .nest("/api/ai", ai_routes);

    let cors = build_cors_layer(&state.config.allowed_origins());

    Router::new()
        .route("/health", get(health::health))
        .merge(api_routes)
        .fallback(errors::not_found)
        .layer(middleware::from_fn(errors::method_not_allowed_as_not_found))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            errors::attach_error_details,
        ))
        // 覆盖全部请求，包括健康检查与未匹配路径
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::global_rate_limit,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(CatchPanicLayer::custom(errors::handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let mut parsed = Vec::new();
    for origin in allowed_origins {
        match HeaderValue::from_str(origin) {
            Ok(value) => parsed.push(value),
            Err(err) => tracing::warn!("忽略无效的跨域来源 '{}': {}", origin, err),
        }
    }

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(parsed)
        .allow_credentials(true)
}
