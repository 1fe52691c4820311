//! 记事本后端：笔记、待办事项与 Kimi AI 助手

pub mod crypto;
pub mod database;
pub mod http;
pub mod llm_manager;
pub mod models;
pub mod notes_manager;
pub mod server_config;
pub mod settings_service;
pub mod todo_service;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::database::Database;
use crate::http::{create_router, AppState};
use crate::llm_manager::MoonshotClient;
use crate::server_config::ServerConfig;

/// 初始化日志；`RUST_LOG` 未设置时默认 info 级别
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// 组装数据库、AI 客户端与路由，监听直到收到退出信号
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!("⚙️ 配置加载完成: {:?}", config);

    let db = Arc::new(Database::new(&config.database_path)?);
    let client = Arc::new(MoonshotClient::new(
        &config.kimi_base_url,
        &config.kimi_model,
        config.request_timeout,
    )?);
    tracing::info!("🤖 Kimi 模型: {}", client.model());
    let port = config.port;
    let production = config.production;
    let state = Arc::new(AppState::new(config, db, client));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听端口 {}", port))?;

    tracing::info!("🚀 服务器运行在端口 {}", port);
    tracing::info!("📝 记事本API: http://localhost:{}/api/notes", port);
    tracing::info!("🤖 AI助手API: http://localhost:{}/api/ai", port);
    tracing::info!("💚 健康检查: http://localhost:{}/health", port);
    if !production {
        tracing::info!("🔧 开发模式已启用");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("服务器异常退出")?;

    tracing::info!("👋 服务器已关闭");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("监听 Ctrl+C 失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("收到SIGINT信号，正在关闭服务器..."),
        _ = terminate => tracing::info!("收到SIGTERM信号，正在关闭服务器..."),
    }
}
