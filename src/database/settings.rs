use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use super::Database;
use crate::models::{now_timestamp, Setting};

const SETTING_COLUMNS: &str = "key, value, encrypted, createdAt, updatedAt";

fn setting_from_row(row: &Row<'_>) -> rusqlite::Result<Setting> {
    Ok(Setting {
        key: row.get(0)?,
        value: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        encrypted: row.get::<_, i64>(2)? != 0,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl Database {
    /// 插入或覆盖配置项；已存在时保留原 `createdAt`
    pub fn upsert_setting(&self, key: &str, value: &str, encrypted: bool) -> Result<Setting> {
        let now = now_timestamp();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO settings (key, value, encrypted, createdAt, updatedAt)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                encrypted = excluded.encrypted,
                updatedAt = excluded.updatedAt",
            params![key, value, encrypted as i64, now],
        )
        .with_context(|| format!("保存配置项失败: {}", key))?;

        conn.query_row(
            &format!("SELECT {SETTING_COLUMNS} FROM settings WHERE key = ?1"),
            params![key],
            setting_from_row,
        )
        .with_context(|| format!("读取配置项失败: {}", key))
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {SETTING_COLUMNS} FROM settings WHERE key = ?1"),
            params![key],
            setting_from_row,
        )
        .optional()
        .with_context(|| format!("读取配置项失败: {}", key))
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .with_context(|| format!("删除配置项失败: {}", key))?;
        Ok(changed > 0)
    }

    pub fn list_settings(&self) -> Result<Vec<Setting>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SETTING_COLUMNS} FROM settings ORDER BY key"
        ))?;
        let settings = stmt
            .query_map([], setting_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("读取配置列表失败")?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_support::temp_database;

    #[test]
    fn upsert_preserves_created_at() {
        let (db, _dir) = temp_database();
        let first = db.upsert_setting("theme", "dark", false).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = db.upsert_setting("theme", "light", true).unwrap();

        assert_eq!(second.value, "light");
        assert!(second.encrypted);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn list_orders_by_key_and_delete_reports_hits() {
        let (db, _dir) = temp_database();
        db.upsert_setting("zeta", "1", false).unwrap();
        db.upsert_setting("alpha", "2", false).unwrap();
        let keys: Vec<_> = db
            .list_settings()
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);

        assert!(db.delete_setting("alpha").unwrap());
        assert!(!db.delete_setting("alpha").unwrap());
        assert!(db.get_setting("alpha").unwrap().is_none());
    }
}
