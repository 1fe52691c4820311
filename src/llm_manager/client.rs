//! Kimi (Moonshot) Chat Completions 客户端

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::AppError;

pub const NOT_CONFIGURED_MESSAGE: &str = "AI服务未配置，请在设置页面配置Kimi API密钥";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{}", NOT_CONFIGURED_MESSAGE)]
    NotConfigured,
    #[error("Kimi API密钥无效")]
    InvalidApiKey,
    #[error("API请求过于频繁或配额已用完")]
    RateLimited,
    #[error("Kimi服务器错误")]
    UpstreamServer { status: u16, body: String },
    #[error("网络连接错误，请检查网络设置")]
    Network(String),
    #[error("AI服务错误: {message}")]
    Upstream { status: u16, message: String },
    #[error("AI服务错误: 响应格式无效")]
    InvalidResponse(String),
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        let message = err.to_string();
        match err {
            AiError::NotConfigured => AppError::configuration(message),
            AiError::InvalidApiKey => AppError::unauthorized(message),
            AiError::RateLimited => AppError::rate_limited(message),
            AiError::UpstreamServer { status, body } => AppError::with_details(
                crate::models::AppErrorType::LLM,
                message,
                serde_json::json!({ "status": status, "body": body }),
            ),
            AiError::Network(cause) => AppError::with_details(
                crate::models::AppErrorType::Network,
                message,
                serde_json::Value::String(cause),
            ),
            AiError::Upstream { status, .. } => AppError::with_details(
                crate::models::AppErrorType::LLM,
                message,
                serde_json::json!({ "status": status }),
            ),
            AiError::InvalidResponse(cause) => AppError::with_details(
                crate::models::AppErrorType::LLM,
                message,
                serde_json::Value::String(cause),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// 一次补全请求的采样参数（模型由客户端填充）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// 发送补全请求，返回首个候选回复（已去除首尾空白）
    async fn complete(&self, api_key: &str, request: &CompletionRequest) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a CompletionRequest,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct MoonshotClient {
    client: Client,
    base_url: String,
    model: String,
}

impl MoonshotClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = ClientBuilder::new().use_rustls_tls();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow::anyhow!("创建HTTP客户端失败: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for MoonshotClient {
    async fn complete(&self, api_key: &str, request: &CompletionRequest) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            "🤖 Kimi 请求: model={}, max_tokens={}",
            self.model,
            request.max_tokens
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&RequestBody {
                model: &self.model,
                request,
            })
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Kimi API 返回错误状态: {}", status);
            return Err(map_status_error(status, body));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| AiError::InvalidResponse("响应中没有 choices[0].message.content".into()))
    }
}

fn map_status_error(status: StatusCode, body: String) -> AiError {
    match status {
        StatusCode::UNAUTHORIZED => AiError::InvalidApiKey,
        StatusCode::TOO_MANY_REQUESTS => AiError::RateLimited,
        s if s.is_server_error() => AiError::UpstreamServer {
            status: s.as_u16(),
            body,
        },
        s => {
            // OpenAI 兼容错误体: {"error": {"message": "..."}}
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", s.as_u16()));
            AiError::Upstream {
                status: s.as_u16(),
                message,
            }
        }
    }
}
