use anyhow::{Context, Result};
use rusqlite::{params, types::Value, OptionalExtension, Row};

use super::Database;
use crate::models::{Todo, TodoStats};

const TODO_COLUMNS: &str = "id, content, completed, createdAt, updatedAt";

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        content: row.get(1)?,
        completed: row.get::<_, i64>(2)? != 0,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl Database {
    pub fn list_todos(&self) -> Result<Vec<Todo>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos ORDER BY createdAt DESC"
        ))?;
        let todos = stmt
            .query_map([], todo_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("读取待办列表失败")?;
        Ok(todos)
    }

    pub fn get_todo(&self, id: &str) -> Result<Option<Todo>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
            params![id],
            todo_from_row,
        )
        .optional()
        .with_context(|| format!("读取待办失败: {}", id))
    }

    pub fn insert_todo(&self, todo: &Todo) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO todos (id, content, completed, createdAt, updatedAt)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                todo.id,
                todo.content,
                todo.completed as i64,
                todo.created_at,
                todo.updated_at
            ],
        )
        .with_context(|| format!("写入待办失败: {}", todo.id))?;
        Ok(())
    }

    /// 只更新传入的字段；`updatedAt` 总是刷新
    pub fn update_todo(
        &self,
        id: &str,
        content: Option<&str>,
        completed: Option<bool>,
        updated_at: &str,
    ) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(content) = content {
            sets.push("content = ?");
            values.push(Value::Text(content.to_string()));
        }
        if let Some(completed) = completed {
            sets.push("completed = ?");
            values.push(Value::Integer(completed as i64));
        }
        sets.push("updatedAt = ?");
        values.push(Value::Text(updated_at.to_string()));
        values.push(Value::Text(id.to_string()));

        let sql = format!("UPDATE todos SET {} WHERE id = ?", sets.join(", "));
        let conn = self.get_conn()?;
        let changed = conn
            .execute(&sql, rusqlite::params_from_iter(values))
            .with_context(|| format!("更新待办失败: {}", id))?;
        Ok(changed > 0)
    }

    pub fn delete_todo(&self, id: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute("DELETE FROM todos WHERE id = ?1", params![id])
            .with_context(|| format!("删除待办失败: {}", id))?;
        Ok(changed > 0)
    }

    pub fn todo_stats(&self) -> Result<TodoStats> {
        let conn = self.get_conn()?;
        let (total, completed): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM todos",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("统计待办失败")?;
        Ok(TodoStats {
            total,
            completed,
            pending: total - completed,
        })
    }

    pub fn delete_completed_todos(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute("DELETE FROM todos WHERE completed = 1", [])
            .context("清理已完成待办失败")?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_support::temp_database;
    use crate::models::{Todo, TodoStats};

    fn todo(id: &str, completed: bool, created_at: &str) -> Todo {
        Todo {
            id: id.to_string(),
            content: format!("任务 {id}"),
            completed,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[test]
    fn list_is_newest_first() {
        let (db, _dir) = temp_database();
        db.insert_todo(&todo("old", false, "2026-01-01T00:00:00.000Z")).unwrap();
        db.insert_todo(&todo("new", false, "2026-01-02T00:00:00.000Z")).unwrap();
        let ids: Vec<_> = db.list_todos().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let (db, _dir) = temp_database();
        db.insert_todo(&todo("t1", false, "2026-01-01T00:00:00.000Z")).unwrap();

        assert!(db
            .update_todo("t1", None, Some(true), "2026-01-03T00:00:00.000Z")
            .unwrap());
        let updated = db.get_todo("t1").unwrap().unwrap();
        assert!(updated.completed);
        assert_eq!(updated.content, "任务 t1");
        assert_eq!(updated.created_at, "2026-01-01T00:00:00.000Z");
        assert_eq!(updated.updated_at, "2026-01-03T00:00:00.000Z");

        assert!(db
            .update_todo("t1", Some("改名"), None, "2026-01-04T00:00:00.000Z")
            .unwrap());
        let renamed = db.get_todo("t1").unwrap().unwrap();
        assert_eq!(renamed.content, "改名");
        assert!(renamed.completed);

        assert!(!db
            .update_todo("missing", Some("x"), None, "2026-01-04T00:00:00.000Z")
            .unwrap());
    }

    #[test]
    fn stats_and_cleanup_completed() {
        let (db, _dir) = temp_database();
        assert_eq!(
            db.todo_stats().unwrap(),
            TodoStats { total: 0, completed: 0, pending: 0 }
        );

        db.insert_todo(&todo("a", true, "2026-01-01T00:00:00.000Z")).unwrap();
        db.insert_todo(&todo("b", true, "2026-01-01T00:00:00.000Z")).unwrap();
        db.insert_todo(&todo("c", false, "2026-01-01T00:00:00.000Z")).unwrap();
        assert_eq!(
            db.todo_stats().unwrap(),
            TodoStats { total: 3, completed: 2, pending: 1 }
        );

        assert_eq!(db.delete_completed_todos().unwrap(), 2);
        assert_eq!(db.list_todos().unwrap().len(), 1);
        assert!(db.delete_todo("c").unwrap());
        assert!(!db.delete_todo("c").unwrap());
    }
}
