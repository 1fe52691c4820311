use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppJson, AppState};
use crate::models::{AppError, NewNote, NotePatch};

type ApiResult = Result<Json<Value>, AppError>;

const NOTE_NOT_FOUND: &str = "笔记不存在";

pub async fn list_notes(State(state): State<Arc<AppState>>) -> ApiResult {
    let notes = state.notes.list().await?;
    Ok(Json(json!({ "success": true, "data": notes })))
}

pub async fn get_note(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let note = state
        .notes
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(NOTE_NOT_FOUND))?;
    Ok(Json(json!({ "success": true, "data": note })))
}

pub async fn create_note(
    State(state): State<Arc<AppState>>,
    AppJson(input): AppJson<NewNote>,
) -> Result<impl IntoResponse, AppError> {
    let note = state.notes.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": note })),
    ))
}

pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(patch): AppJson<NotePatch>,
) -> ApiResult {
    let note = state
        .notes
        .update(&id, patch)
        .await?
        .ok_or_else(|| AppError::not_found(NOTE_NOT_FOUND))?;
    Ok(Json(json!({ "success": true, "data": note })))
}

pub async fn delete_note(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    if !state.notes.delete(&id).await? {
        return Err(AppError::not_found(NOTE_NOT_FOUND));
    }
    Ok(Json(json!({ "success": true, "message": "笔记已删除" })))
}

pub async fn search_notes(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> ApiResult {
    if query.trim().is_empty() {
        return Err(AppError::validation("搜索关键词不能为空"));
    }
    let notes = state.notes.search(&query).await?;
    Ok(Json(json!({
        "success": true,
        "count": notes.len(),
        "data": notes,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    #[serde(default)]
    ids: Option<Vec<String>>,
}

pub async fn delete_notes(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<BatchDeleteRequest>,
) -> ApiResult {
    let ids = body.ids.unwrap_or_default();
    if ids.is_empty() {
        return Err(AppError::validation("请提供要删除的笔记ID列表"));
    }
    let deleted = state.notes.delete_many(&ids).await;
    Ok(Json(json!({
        "success": true,
        "message": format!("成功删除 {} 个笔记", deleted),
        "deletedCount": deleted,
    })))
}

pub async fn note_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state.notes.stats().await?;
    let database = state.notes.database_stats().await?;
    Ok(Json(json!({
        "success": true,
        "stats": stats,
        "database": database,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    limit: Option<String>,
}

pub async fn recent_notes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> ApiResult {
    let limit = query
        .limit
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(10)
        .clamp(1, 100);
    let notes = state.notes.recent(limit).await?;
    Ok(Json(json!({ "success": true, "data": notes })))
}
