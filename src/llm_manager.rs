//! AI 网关
//!
//! 将笔记场景的各项 AI 功能（聊天、改进、润色、改写、标签、总结、翻译、语义搜索）
//! 转换为对 Kimi Chat Completions 的单次调用。
//!
//! - 凭据首次使用时从 `SettingsService` 读取并缓存，`set_api_key` / `remove_api_key` 同步刷新
//! - 输入校验先于凭据检查，未配置凭据时返回 `NotConfigured`
//! - 不做重试

pub mod client;
pub mod prompts;
pub mod ranker;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::AppError;
use crate::settings_service::SettingsService;
pub use client::{AiError, ChatCompletion, CompletionRequest, MoonshotClient};
use prompts::{ImproveKind, RewriteStyle, SummaryLength};
pub use ranker::{LlmScoringRanker, RelevanceRanker, ScoredNote, SearchCandidate};

type Result<T> = std::result::Result<T, AppError>;

pub const MIN_API_KEY_CHARS: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiStatus {
    pub has_api_key: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
}

/// 校验必填文本：去空白后非空，且原文不超过 `max_chars` 个字符
fn require_text(text: &str, max_chars: usize, empty_message: &str, too_long: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AppError::validation(empty_message));
    }
    if text.chars().count() > max_chars {
        return Err(AppError::validation(too_long));
    }
    Ok(())
}

fn require_body_text(text: &str, max_chars: usize) -> Result<()> {
    require_text(
        text,
        max_chars,
        "文本内容不能为空",
        &format!("文本长度不能超过{}个字符", max_chars),
    )
}

pub struct AiService {
    client: Arc<dyn ChatCompletion>,
    settings: Arc<SettingsService>,
    ranker: Arc<dyn RelevanceRanker>,
    cached_key: RwLock<Option<String>>,
}

impl AiService {
    pub fn new(client: Arc<dyn ChatCompletion>, settings: Arc<SettingsService>) -> Self {
        Self::with_ranker(client, settings, Arc::new(LlmScoringRanker::default()))
    }

    pub fn with_ranker(
        client: Arc<dyn ChatCompletion>,
        settings: Arc<SettingsService>,
        ranker: Arc<dyn RelevanceRanker>,
    ) -> Self {
        Self {
            client,
            settings,
            ranker,
            cached_key: RwLock::new(None),
        }
    }

    // ---------- 凭据 ----------

    async fn current_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.cached_key.read().await.clone() {
            return Ok(Some(key));
        }
        let mut cache = self.cached_key.write().await;
        if cache.is_none() {
            *cache = self.settings.get_api_key().await?;
            if cache.is_none() {
                tracing::warn!("⚠️ Kimi API密钥未设置，AI功能将不可用");
            }
        }
        Ok(cache.clone())
    }

    async fn require_key(&self) -> Result<String> {
        self.current_key()
            .await?
            .ok_or_else(|| AiError::NotConfigured.into())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let key = self.require_key().await?;
        Ok(self.client.complete(&key, &request).await?)
    }

    /// 校验并保存新的密钥，同时刷新缓存
    pub async fn set_api_key(&self, api_key: &str) -> Result<()> {
        let trimmed = api_key.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("API密钥不能为空"));
        }
        if trimmed.chars().count() < MIN_API_KEY_CHARS {
            return Err(AppError::validation("API密钥格式不正确，密钥长度过短"));
        }
        self.settings.set_api_key(trimmed).await?;
        *self.cached_key.write().await = Some(trimmed.to_string());
        Ok(())
    }

    pub async fn remove_api_key(&self) -> Result<()> {
        self.settings.remove_api_key().await?;
        *self.cached_key.write().await = None;
        Ok(())
    }

    /// `verify` 为真时额外发送一次探测请求
    pub async fn status(&self, verify: bool) -> Result<AiStatus> {
        let has_api_key = self.current_key().await?.is_some();
        let reachable = if verify && has_api_key {
            Some(self.check_status().await)
        } else {
            None
        };
        Ok(AiStatus {
            has_api_key,
            status: if has_api_key { "ready" } else { "not_configured" },
            reachable,
        })
    }

    pub async fn check_status(&self) -> bool {
        match self.complete(prompts::probe()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("AI服务状态检查失败: {}", e);
                false
            }
        }
    }

    // ---------- 功能 ----------

    pub async fn chat(&self, message: &str, note_title: &str, note_content: &str) -> Result<String> {
        require_text(message, 4000, "消息内容不能为空", "消息长度不能超过4000个字符")?;
        self.complete(prompts::chat(message.trim(), note_title, note_content))
            .await
    }

    pub async fn improve(&self, text: &str, kind: &str) -> Result<String> {
        require_body_text(text, 8000)?;
        self.complete(prompts::improve(text.trim(), ImproveKind::parse(kind)))
            .await
    }

    pub async fn polish(&self, text: &str) -> Result<String> {
        require_body_text(text, 8000)?;
        self.complete(prompts::polish(text.trim())).await
    }

    pub async fn rewrite(&self, text: &str, style: &str) -> Result<String> {
        require_body_text(text, 8000)?;
        self.complete(prompts::rewrite(text.trim(), RewriteStyle::parse(style)))
            .await
    }

    pub async fn summarize(&self, text: &str, length: &str) -> Result<String> {
        require_body_text(text, 10000)?;
        self.complete(prompts::summarize(text.trim(), SummaryLength::parse(length)))
            .await
    }

    pub async fn translate(&self, text: &str, target: &str, source: &str) -> Result<String> {
        require_body_text(text, 5000)?;
        self.complete(prompts::translate(text.trim(), target, source))
            .await
    }

    pub async fn generate_tags(&self, title: &str, content: &str) -> Result<Vec<String>> {
        if title.trim().is_empty() && content.trim().is_empty() {
            return Err(AppError::validation("标题或内容不能都为空"));
        }
        let combined = format!("{}\n{}", title, content);
        if combined.trim().chars().count() > 10000 {
            return Err(AppError::validation("文本长度不能超过10000个字符"));
        }
        let reply = self.complete(prompts::generate_tags(title, content)).await?;
        Ok(prompts::parse_tags(&reply))
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        candidates: Vec<SearchCandidate>,
    ) -> Result<Vec<ScoredNote>> {
        require_text(query, 200, "搜索查询不能为空", "搜索查询长度不能超过200个字符")?;
        let key = self.require_key().await?;
        tracing::info!("🔍 语义搜索: {} 条候选笔记", candidates.len());
        Ok(self
            .ranker
            .rank(self.client.as_ref(), &key, query.trim(), candidates)
            .await?)
    }
}
