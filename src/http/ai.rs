//! `/api/ai/*` 处理函数，业务逻辑全部位于 `AiService`

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppJson, AppState};
use crate::llm_manager::SearchCandidate;
use crate::models::AppError;

type ApiResult = Result<Json<Value>, AppError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    note_title: Option<String>,
    #[serde(default)]
    note_content: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<ChatRequest>,
) -> ApiResult {
    let response = state
        .ai
        .chat(
            &body.message,
            body.note_title.as_deref().unwrap_or_default(),
            body.note_content.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(json!({ "success": true, "response": response })))
}

fn default_improve_type() -> String {
    "general".into()
}

#[derive(Debug, Deserialize)]
pub struct ImproveRequest {
    #[serde(default)]
    text: String,
    #[serde(rename = "type", default = "default_improve_type")]
    kind: String,
}

pub async fn improve(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<ImproveRequest>,
) -> ApiResult {
    let improved = state.ai.improve(&body.text, &body.kind).await?;
    Ok(Json(json!({
        "success": true,
        "original": body.text,
        "improved": improved,
        "type": body.kind,
    })))
}

fn default_length() -> String {
    "medium".into()
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    text: String,
    #[serde(default = "default_length")]
    length: String,
}

pub async fn summarize(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<SummarizeRequest>,
) -> ApiResult {
    let summary = state.ai.summarize(&body.text, &body.length).await?;
    Ok(Json(json!({
        "success": true,
        "original": body.text,
        "summary": summary,
        "length": body.length,
    })))
}

fn default_target_language() -> String {
    "en".into()
}

fn default_source_language() -> String {
    "auto".into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    #[serde(default)]
    text: String,
    #[serde(default = "default_target_language")]
    target_language: String,
    #[serde(default = "default_source_language")]
    source_language: String,
}

pub async fn translate(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<TranslateRequest>,
) -> ApiResult {
    let translation = state
        .ai
        .translate(&body.text, &body.target_language, &body.source_language)
        .await?;
    Ok(Json(json!({
        "success": true,
        "original": body.text,
        "translation": translation,
        "sourceLanguage": body.source_language,
        "targetLanguage": body.target_language,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PolishRequest {
    #[serde(default)]
    text: String,
}

pub async fn polish(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<PolishRequest>,
) -> ApiResult {
    let polished = state.ai.polish(&body.text).await?;
    Ok(Json(json!({
        "success": true,
        "original": body.text,
        "polished": polished,
    })))
}

fn default_style() -> String {
    "formal".into()
}

#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    #[serde(default)]
    text: String,
    #[serde(default = "default_style")]
    style: String,
}

pub async fn rewrite(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<RewriteRequest>,
) -> ApiResult {
    let rewritten = state.ai.rewrite(&body.text, &body.style).await?;
    Ok(Json(json!({
        "success": true,
        "original": body.text,
        "rewritten": rewritten,
        "style": body.style,
    })))
}

#[derive(Debug, Deserialize)]
pub struct GenerateTagsRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

pub async fn generate_tags(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<GenerateTagsRequest>,
) -> ApiResult {
    let tags = state
        .ai
        .generate_tags(
            body.title.as_deref().unwrap_or_default(),
            body.content.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(json!({ "success": true, "tags": tags })))
}

#[derive(Debug, Deserialize)]
pub struct SemanticSearchRequest {
    #[serde(default)]
    query: String,
    /// 缺省时对数据库中的全部笔记评分
    #[serde(default)]
    notes: Option<Vec<SearchCandidate>>,
}

pub async fn semantic_search(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<SemanticSearchRequest>,
) -> ApiResult {
    let candidates = match body.notes {
        Some(notes) => notes,
        None => state
            .notes
            .list()
            .await?
            .into_iter()
            .map(SearchCandidate::from)
            .collect(),
    };
    let results = state.ai.semantic_search(&body.query, candidates).await?;
    Ok(Json(json!({ "success": true, "results": results })))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    verify: Option<String>,
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult {
    let verify = matches!(query.verify.as_deref(), Some("true" | "1"));
    let status = state.ai.status(verify).await?;
    let mut body = serde_json::to_value(status)?;
    body["success"] = Value::Bool(true);
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetKeyRequest {
    #[serde(default)]
    api_key: Option<Value>,
}

pub async fn set_key(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<SetKeyRequest>,
) -> ApiResult {
    // 非字符串按空值处理
    let api_key = body
        .api_key
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or_default();
    state.ai.set_api_key(api_key).await?;
    Ok(Json(json!({ "success": true, "message": "API密钥设置成功" })))
}

pub async fn remove_key(State(state): State<Arc<AppState>>) -> ApiResult {
    state.ai.remove_api_key().await?;
    Ok(Json(json!({ "success": true, "message": "API密钥删除成功" })))
}
