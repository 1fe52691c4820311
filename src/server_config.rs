//! 服务配置
//!
//! 加载顺序：`.env` → `NOTEBOOK__*` 环境变量 / `config/notebook.toml` → 直接环境变量兜底 → 默认值。

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_DATABASE_PATH: &str = "data/notes.db";
pub const DEFAULT_KIMI_BASE_URL: &str = "https://api.moonshot.cn/v1";
pub const DEFAULT_KIMI_MODEL: &str = "kimi-k2-turbo-preview";
const CONFIG_FILE: &str = "config/notebook";

/// 固定窗口限流参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `NODE_ENV=production`
    pub production: bool,
    pub frontend_url: Option<String>,
    pub encryption_key: Option<String>,
    /// 数据库中的密钥无法解密时使用的兜底凭据，按优先级排列
    pub fallback_api_keys: Vec<String>,
    pub database_path: PathBuf,
    pub kimi_base_url: String,
    pub kimi_model: String,
    pub request_timeout: Option<Duration>,
    pub global_rate_limit: RateLimitConfig,
    pub ai_rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("production", &self.production)
            .field("frontend_url", &self.frontend_url)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .field("fallback_api_keys", &self.fallback_api_keys.len())
            .field("database_path", &self.database_path)
            .field("kimi_base_url", &self.kimi_base_url)
            .field("kimi_model", &self.kimi_model)
            .field("request_timeout", &self.request_timeout)
            .field("global_rate_limit", &self.global_rate_limit)
            .field("ai_rate_limit", &self.ai_rate_limit)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            production: false,
            frontend_url: None,
            encryption_key: None,
            fallback_api_keys: Vec::new(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            kimi_base_url: DEFAULT_KIMI_BASE_URL.to_string(),
            kimi_model: DEFAULT_KIMI_MODEL.to_string(),
            request_timeout: None,
            global_rate_limit: RateLimitConfig {
                max_requests: 100,
                window_secs: 15 * 60,
            },
            ai_rate_limit: RateLimitConfig {
                max_requests: 10,
                window_secs: 60,
            },
        }
    }
}

/// 配置源中出现的字段，全部可缺省
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    port: Option<u16>,
    node_env: Option<String>,
    frontend_url: Option<String>,
    encryption_key: Option<String>,
    kimi_api_key: Option<String>,
    moonshot_api_key: Option<String>,
    database_path: Option<String>,
    kimi_base_url: Option<String>,
    kimi_model: Option<String>,
    request_timeout_secs: Option<u64>,
    global_rate_limit: Option<RateLimitConfig>,
    ai_rate_limit: Option<RateLimitConfig>,
}

impl ServerConfig {
    pub fn from_env_and_file() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut builder = config::Config::builder().add_source(
            config::Environment::with_prefix("NOTEBOOK")
                .separator("__")
                .try_parsing(true),
        );
        if std::path::Path::new(&format!("{CONFIG_FILE}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(CONFIG_FILE));
        }
        let raw = builder
            .build()
            .context("读取配置失败")?
            .try_deserialize::<RawConfig>()
            .context("解析配置失败")?;
        Self::resolve(raw, |name| std::env::var(name).ok())
    }

    /// 合并配置源与直接环境变量（`env` 便于测试注入）
    fn resolve(raw: RawConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let env = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match raw.port {
            Some(port) => port,
            None => match env("PORT") {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("PORT 不是合法端口号: {}", value))?,
                None => defaults.port,
            },
        };

        let node_env = raw.node_env.or_else(|| env("NODE_ENV"));
        let production = node_env.as_deref() == Some("production");

        let mut fallback_api_keys = Vec::new();
        for key in [
            raw.kimi_api_key.or_else(|| env("KIMI_API_KEY")),
            raw.moonshot_api_key.or_else(|| env("MOONSHOT_API_KEY")),
        ]
        .into_iter()
        .flatten()
        {
            if !fallback_api_keys.contains(&key) {
                fallback_api_keys.push(key);
            }
        }

        let kimi_base_url = raw
            .kimi_base_url
            .or_else(|| env("KIMI_BASE_URL"))
            .unwrap_or(defaults.kimi_base_url);
        let parsed = Url::parse(&kimi_base_url)
            .with_context(|| format!("KIMI_BASE_URL 无效: {}", kimi_base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("KIMI_BASE_URL 必须是 http(s) 地址: {}", kimi_base_url));
        }

        Ok(Self {
            port,
            production,
            frontend_url: raw.frontend_url.or_else(|| env("FRONTEND_URL")),
            encryption_key: raw.encryption_key.or_else(|| env("ENCRYPTION_KEY")),
            fallback_api_keys,
            database_path: raw
                .database_path
                .or_else(|| env("DATABASE_PATH"))
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            kimi_base_url: kimi_base_url.trim_end_matches('/').to_string(),
            kimi_model: raw
                .kimi_model
                .or_else(|| env("KIMI_MODEL"))
                .unwrap_or(defaults.kimi_model),
            request_timeout: raw.request_timeout_secs.map(Duration::from_secs),
            global_rate_limit: raw.global_rate_limit.unwrap_or(defaults.global_rate_limit),
            ai_rate_limit: raw.ai_rate_limit.unwrap_or(defaults.ai_rate_limit),
        })
    }

    /// 允许跨域访问的前端源
    pub fn allowed_origins(&self) -> Vec<String> {
        if self.production {
            self.frontend_url.iter().cloned().collect()
        } else {
            vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ]
        }
    }
}
