use chrono::{Duration, Local, SecondsFormat, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::Database;
use crate::models::{
    now_timestamp, parse_timestamp, AppError, DatabaseStats, NewNote, Note, NotePatch, NoteStats,
};

type Result<T> = std::result::Result<T, AppError>;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 1_000_000;
pub const DEFAULT_TITLE: &str = "无标题";

/// 校验笔记字段，返回第一条不满足的规则
pub fn validate_note(title: &str, content: &str) -> Result<()> {
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::validation("标题长度不能超过200个字符"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::validation("内容长度不能超过1MB"));
    }
    if title.trim().is_empty() && content.trim().is_empty() {
        return Err(AppError::validation("标题和内容不能同时为空"));
    }
    Ok(())
}

pub struct NotesService {
    db: Arc<Database>,
}

impl NotesService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Note>> {
        self.db
            .clone()
            .call(|db| db.list_notes())
            .await
            .map_err(|e| AppError::database("获取笔记失败", e))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Note>> {
        if id.trim().is_empty() {
            return Err(AppError::validation("笔记ID不能为空"));
        }
        let id = id.to_string();
        self.db
            .clone()
            .call(move |db| db.get_note(&id))
            .await
            .map_err(|e| AppError::database("获取笔记失败", e))
    }

    pub async fn create(&self, input: NewNote) -> Result<Note> {
        let content = input.content.unwrap_or_default();
        let mut title = input.title.unwrap_or_default();
        validate_note(&title, &content)?;
        if title.trim().is_empty() {
            title = DEFAULT_TITLE.to_string();
        }

        let now = now_timestamp();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            tags: input.tags.unwrap_or_default(),
            created_at: now.clone(),
            updated_at: now,
        };
        let to_insert = note.clone();
        self.db
            .clone()
            .call(move |db| db.insert_note(&to_insert))
            .await
            .map_err(|e| AppError::database("创建笔记失败", e))?;
        tracing::info!("📝 创建笔记: {}", note.id);
        Ok(note)
    }

    /// 合并补丁后整体写回；笔记不存在时返回 `None`
    pub async fn update(&self, id: &str, patch: NotePatch) -> Result<Option<Note>> {
        let Some(mut note) = self.get(id).await? else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        if let Some(tags) = patch.tags {
            note.tags = tags;
        }
        validate_note(&note.title, &note.content)?;
        note.updated_at = now_timestamp();

        let to_write = note.clone();
        let found = self
            .db
            .clone()
            .call(move |db| db.update_note(&to_write))
            .await
            .map_err(|e| AppError::database("更新笔记失败", e))?;
        // 读取与写入之间被删除
        Ok(found.then_some(note))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        if id.trim().is_empty() {
            return Err(AppError::validation("笔记ID不能为空"));
        }
        let id = id.to_string();
        let deleted = self
            .db
            .clone()
            .call(move |db| db.delete_note(&id))
            .await
            .map_err(|e| AppError::database("删除笔记失败", e))?;
        Ok(deleted)
    }

    /// 标题/内容子串搜索（不区分大小写），空白查询返回空列表
    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.db
            .clone()
            .call(move |db| db.search_notes(&query))
            .await
            .map_err(|e| AppError::database("搜索笔记失败", e))
    }

    /// 批量删除，空白 ID 跳过；失败只记录日志，返回实际删除的数量
    pub async fn delete_many(&self, ids: &[String]) -> usize {
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect();
        if ids.is_empty() {
            return 0;
        }
        match self.db.clone().call(move |db| db.delete_notes(&ids)).await {
            Ok(deleted) => {
                tracing::info!("🗑️ 批量删除笔记: {} 条", deleted);
                deleted
            }
            Err(e) => {
                tracing::warn!("批量删除笔记失败: {}", e);
                0
            }
        }
    }

    pub async fn stats(&self) -> Result<NoteStats> {
        let notes = self
            .list()
            .await
            .map_err(|e| AppError::database("获取笔记统计失败", e))?;
        let today_start = local_midnight_utc();
        let notes_today = notes
            .iter()
            .filter_map(|n| parse_timestamp(&n.created_at))
            .filter(|created| *created >= today_start)
            .count();

        Ok(NoteStats {
            total_notes: notes.len(),
            total_words: notes.iter().map(|n| n.content.chars().count()).sum(),
            notes_today,
            last_updated: notes.first().map(|n| n.updated_at.clone()),
        })
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Note>> {
        self.db
            .clone()
            .call(move |db| db.recent_notes(limit))
            .await
            .map_err(|e| AppError::database("获取最近笔记失败", e))
    }

    pub async fn database_stats(&self) -> Result<DatabaseStats> {
        self.db
            .clone()
            .call(|db| db.note_stats())
            .await
            .map_err(|e| AppError::database("获取数据库统计失败", e))
    }

    /// 删除创建时间早于 `days` 天前的笔记
    pub async fn cleanup_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(i64::from(days)))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let removed = self
            .db
            .clone()
            .call(move |db| db.delete_notes_created_before(&cutoff))
            .await
            .map_err(|e| AppError::database("清理旧笔记失败", e))?;
        if removed > 0 {
            tracing::info!("🧹 已清理 {} 条 {} 天前的笔记", removed, days);
        }
        Ok(removed)
    }
}

/// 本地时区当天零点（换算为 UTC）
fn local_midnight_utc() -> chrono::DateTime<Utc> {
    let today = Local::now().date_naive();
    today
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| today.and_time(chrono::NaiveTime::MIN).and_utc())
}
