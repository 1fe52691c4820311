use std::sync::Arc;
use uuid::Uuid;

use crate::database::Database;
use crate::models::{now_timestamp, AppError, Todo, TodoPatch, TodoStats};

type Result<T> = std::result::Result<T, AppError>;

const EMPTY_CONTENT: &str = "待办事项内容不能为空";

pub struct TodoService {
    db: Arc<Database>,
}

impl TodoService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Todo>> {
        self.db
            .clone()
            .call(|db| db.list_todos())
            .await
            .map_err(|e| AppError::database("获取待办事项失败", e))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Todo>> {
        let id = id.to_string();
        self.db
            .clone()
            .call(move |db| db.get_todo(&id))
            .await
            .map_err(|e| AppError::database("获取待办事项失败", e))
    }

    pub async fn create(&self, content: &str, completed: bool) -> Result<Todo> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation(EMPTY_CONTENT));
        }
        let now = now_timestamp();
        let todo = Todo {
            id: format!("todo_{}", Uuid::new_v4().simple()),
            content: content.to_string(),
            completed,
            created_at: now.clone(),
            updated_at: now,
        };
        let to_insert = todo.clone();
        self.db
            .clone()
            .call(move |db| db.insert_todo(&to_insert))
            .await
            .map_err(|e| AppError::database("创建待办事项失败", e))?;
        Ok(todo)
    }

    /// 部分更新；待办不存在时返回 `None`
    pub async fn update(&self, id: &str, patch: TodoPatch) -> Result<Option<Todo>> {
        if self.get(id).await?.is_none() {
            return Ok(None);
        }
        if patch.is_empty() {
            return Err(AppError::validation("没有提供要更新的字段"));
        }
        let content = match patch.content.as_deref().map(str::trim) {
            Some("") => return Err(AppError::validation(EMPTY_CONTENT)),
            other => other.map(str::to_string),
        };

        let id = id.to_string();
        let completed = patch.completed;
        let updated_at = now_timestamp();
        self.db
            .clone()
            .call(move |db| {
                if !db.update_todo(&id, content.as_deref(), completed, &updated_at)? {
                    return Ok(None);
                }
                db.get_todo(&id)
            })
            .await
            .map_err(|e| AppError::database("更新待办事项失败", e))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.db
            .clone()
            .call(move |db| db.delete_todo(&id))
            .await
            .map_err(|e| AppError::database("删除待办事项失败", e))
    }

    pub async fn stats(&self) -> Result<TodoStats> {
        self.db
            .clone()
            .call(|db| db.todo_stats())
            .await
            .map_err(|e| AppError::database("获取待办事项统计失败", e))
    }

    pub async fn cleanup_completed(&self) -> Result<usize> {
        let removed = self
            .db
            .clone()
            .call(|db| db.delete_completed_todos())
            .await
            .map_err(|e| AppError::database("清理已完成待办事项失败", e))?;
        tracing::info!("🧹 已清理 {} 条已完成的待办事项", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_database;
    use crate::models::AppErrorType;

    fn service() -> (TodoService, tempfile::TempDir) {
        let (db, dir) = temp_database();
        (TodoService::new(Arc::new(db)), dir)
    }

    #[tokio::test]
    async fn create_trims_and_prefixes_id() {
        let (svc, _dir) = service();
        let todo = svc.create("  buy milk  ", false).await.unwrap();
        assert_eq!(todo.content, "buy milk");
        assert!(todo.id.starts_with("todo_"));
        assert!(!todo.completed);

        let err = svc.create("   ", false).await.unwrap_err();
        assert_eq!(err.error_type, AppErrorType::Validation);
        assert_eq!(err.message, "待办事项内容不能为空");
    }

    #[tokio::test]
    async fn update_rules() {
        let (svc, _dir) = service();
        let todo = svc.create("写周报", false).await.unwrap();

        let err = svc.update(&todo.id, TodoPatch::default()).await.unwrap_err();
        assert_eq!(err.message, "没有提供要更新的字段");

        let err = svc
            .update(
                &todo.id,
                TodoPatch {
                    content: Some("  ".into()),
                    completed: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.message, "待办事项内容不能为空");

        let done = svc
            .update(
                &todo.id,
                TodoPatch {
                    content: None,
                    completed: Some(true),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(done.completed);
        assert_eq!(done.content, "写周报");
        assert_eq!(done.created_at, todo.created_at);

        // 不存在的待办优先于字段校验
        let missing = svc
            .update("todo_missing", TodoPatch::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn stats_and_cleanup() {
        let (svc, _dir) = service();
        svc.create("a", true).await.unwrap();
        let keep = svc.create("b", false).await.unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!((stats.total, stats.completed, stats.pending), (2, 1, 1));

        assert_eq!(svc.cleanup_completed().await.unwrap(), 1);
        let remaining = svc.list().await.unwrap();
        assert_eq!(remaining, vec![keep.clone()]);

        assert!(svc.delete(&keep.id).await.unwrap());
        assert!(!svc.delete(&keep.id).await.unwrap());
        assert!(svc.get(&keep.id).await.unwrap().is_none());
    }
}
