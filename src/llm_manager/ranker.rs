//! 语义搜索排序策略

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::{AiError, ChatCompletion};
use super::prompts;
use crate::models::Note;

/// 待评分的笔记；除标题/内容/标签外的字段原样透传
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Note> for SearchCandidate {
    fn from(note: Note) -> Self {
        let mut extra = Map::new();
        extra.insert("id".into(), Value::String(note.id));
        extra.insert("createdAt".into(), Value::String(note.created_at));
        extra.insert("updatedAt".into(), Value::String(note.updated_at));
        Self {
            title: Some(note.title),
            content: Some(note.content),
            tags: Some(note.tags),
            extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredNote {
    #[serde(flatten)]
    pub note: SearchCandidate,
    pub relevance_score: f64,
}

#[async_trait]
pub trait RelevanceRanker: Send + Sync {
    async fn rank(
        &self,
        client: &dyn ChatCompletion,
        api_key: &str,
        query: &str,
        candidates: Vec<SearchCandidate>,
    ) -> Result<Vec<ScoredNote>, AiError>;
}

/// 逐条请求模型打分，保留高于阈值的结果并按分数降序
pub struct LlmScoringRanker {
    threshold: f64,
}

impl Default for LlmScoringRanker {
    fn default() -> Self {
        Self { threshold: 0.3 }
    }
}

#[async_trait]
impl RelevanceRanker for LlmScoringRanker {
    async fn rank(
        &self,
        client: &dyn ChatCompletion,
        api_key: &str,
        query: &str,
        candidates: Vec<SearchCandidate>,
    ) -> Result<Vec<ScoredNote>, AiError> {
        let mut scored = Vec::new();
        for note in candidates {
            let request = prompts::relevance(
                query,
                note.title.as_deref().unwrap_or_default(),
                note.content.as_deref().unwrap_or_default(),
                note.tags.as_deref(),
            );
            let reply = client.complete(api_key, &request).await?;
            let score = prompts::parse_relevance_score(&reply);
            if score > self.threshold {
                scored.push(ScoredNote {
                    note,
                    relevance_score: score,
                });
            }
        }
        // 稳定排序：同分保持输入顺序
        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        Ok(scored)
    }
}
