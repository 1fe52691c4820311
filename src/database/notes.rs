use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::Database;
use crate::models::{DatabaseStats, Note};

const NOTE_COLUMNS: &str = "id, title, content, tags, createdAt, updatedAt";

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let tags_json: String = row.get(3)?;
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

impl Database {
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY updatedAt DESC"
        ))?;
        let notes = stmt
            .query_map([], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("读取笔记列表失败")?;
        Ok(notes)
    }

    pub fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let conn = self.get_conn()?;
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![id],
                note_from_row,
            )
            .optional()
            .with_context(|| format!("读取笔记失败: {}", id))?;
        Ok(note)
    }

    pub fn insert_note(&self, note: &Note) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO notes (id, title, content, tags, createdAt, updatedAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                note.id,
                note.title,
                note.content,
                tags_to_json(&note.tags),
                note.created_at,
                note.updated_at
            ],
        )
        .with_context(|| format!("写入笔记失败: {}", note.id))?;
        Ok(())
    }

    /// 返回是否命中了记录
    pub fn update_note(&self, note: &Note) -> Result<bool> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute(
                "UPDATE notes SET title = ?1, content = ?2, tags = ?3, updatedAt = ?4 WHERE id = ?5",
                params![
                    note.title,
                    note.content,
                    tags_to_json(&note.tags),
                    note.updated_at,
                    note.id
                ],
            )
            .with_context(|| format!("更新笔记失败: {}", note.id))?;
        Ok(changed > 0)
    }

    pub fn delete_note(&self, id: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id])
            .with_context(|| format!("删除笔记失败: {}", id))?;
        Ok(changed > 0)
    }

    /// 单条语句批量删除，返回实际删除的行数
    pub fn delete_notes(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let changed = conn
            .execute(
                &format!("DELETE FROM notes WHERE id IN ({placeholders})"),
                params_from_iter(ids.iter()),
            )
            .context("批量删除笔记失败")?;
        Ok(changed)
    }

    /// 子串搜索（按 Unicode 规则忽略大小写）：标题命中排在内容命中之前，同级按更新时间倒序
    pub fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        let needle = query.to_lowercase();
        let (mut title_hits, content_hits): (Vec<Note>, Vec<Note>) = self
            .list_notes()
            .context("搜索笔记失败")?
            .into_iter()
            .filter(|n| {
                n.title.to_lowercase().contains(&needle)
                    || n.content.to_lowercase().contains(&needle)
            })
            .partition(|n| n.title.to_lowercase().contains(&needle));
        title_hits.extend(content_hits);
        Ok(title_hits)
    }

    pub fn count_notes(&self) -> Result<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn recent_notes(&self, limit: usize) -> Result<Vec<Note>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY updatedAt DESC LIMIT ?1"
        ))?;
        let notes = stmt
            .query_map(params![limit as i64], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("读取最近笔记失败")?;
        Ok(notes)
    }

    pub fn note_stats(&self) -> Result<DatabaseStats> {
        let conn = self.get_conn()?;
        let stats = conn
            .query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(LENGTH(content)), 0),
                    COALESCE(AVG(LENGTH(content)), 0.0),
                    MIN(createdAt),
                    MAX(updatedAt)
                 FROM notes",
                [],
                |row| {
                    let avg: f64 = row.get(2)?;
                    Ok(DatabaseStats {
                        total_notes: row.get(0)?,
                        total_content_length: row.get(1)?,
                        avg_content_length: avg.round() as i64,
                        oldest_note: row.get(3)?,
                        newest_note: row.get(4)?,
                    })
                },
            )
            .context("统计笔记失败")?;
        Ok(stats)
    }

    /// 删除创建时间早于 `cutoff`（RFC 3339）的笔记
    pub fn delete_notes_created_before(&self, cutoff: &str) -> Result<usize> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute("DELETE FROM notes WHERE createdAt < ?1", params![cutoff])
            .context("清理旧笔记失败")?;
        Ok(changed)
    }
}
