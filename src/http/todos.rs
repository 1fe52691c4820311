use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppJson, AppState};
use crate::models::{AppError, TodoPatch};

type ApiResult = Result<Json<Value>, AppError>;

const TODO_NOT_FOUND: &str = "待办事项不存在";

pub async fn list_todos(State(state): State<Arc<AppState>>) -> ApiResult {
    let todos = state.todos.list().await?;
    Ok(Json(json!({ "success": true, "todos": todos })))
}

pub async fn get_todo(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let todo = state
        .todos
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(TODO_NOT_FOUND))?;
    Ok(Json(json!({ "success": true, "todo": todo })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
}

pub async fn create_todo(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<CreateTodoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let todo = state
        .todos
        .create(
            body.content.as_deref().unwrap_or_default(),
            body.completed.unwrap_or(false),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "todo": todo,
            "message": "待办事项创建成功",
        })),
    ))
}

pub async fn update_todo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(patch): AppJson<TodoPatch>,
) -> ApiResult {
    let todo = state
        .todos
        .update(&id, patch)
        .await?
        .ok_or_else(|| AppError::not_found(TODO_NOT_FOUND))?;
    Ok(Json(json!({
        "success": true,
        "todo": todo,
        "message": "待办事项更新成功",
    })))
}

pub async fn delete_todo(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    if !state.todos.delete(&id).await? {
        return Err(AppError::not_found(TODO_NOT_FOUND));
    }
    Ok(Json(json!({ "success": true, "message": "待办事项删除成功" })))
}

pub async fn todo_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state.todos.stats().await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

pub async fn cleanup_completed(State(state): State<Arc<AppState>>) -> ApiResult {
    let deleted = state.todos.cleanup_completed().await?;
    Ok(Json(json!({
        "success": true,
        "deletedCount": deleted,
        "message": format!("已清理 {} 条已完成的待办事项", deleted),
    })))
}
