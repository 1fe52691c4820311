//! SQLite 持久化层
//!
//! - r2d2 连接池管理（WAL + busy_timeout）
//! - notes / todos / settings 三张表的建表与索引
//! - 所有操作均为单行点查询/写入，不跨行开启事务，更新以最后写入为准
//!
//! 各表的 CRUD 分别位于 `notes.rs`、`todos.rs`、`settings.rs`。

mod notes;
mod settings;
mod todos;

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub type SqlitePool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;
pub type SqlitePooledConnection = r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '[]', -- JSON数组
        createdAt TEXT NOT NULL,
        updatedAt TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT,
        encrypted INTEGER NOT NULL DEFAULT 0,
        createdAt TEXT NOT NULL,
        updatedAt TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS todos (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        createdAt TEXT NOT NULL,
        updatedAt TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updatedAt);
    CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(createdAt);
    CREATE INDEX IF NOT EXISTS idx_notes_title ON notes(title);
    CREATE INDEX IF NOT EXISTS idx_todos_created_at ON todos(createdAt);
    CREATE INDEX IF NOT EXISTS idx_todos_completed ON todos(completed);
";

pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// 打开（或创建）数据库文件并确保表结构存在
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("创建数据库目录失败: {:?}", parent))?;
            }
        }

        let pool = Self::build_pool(db_path)?;
        let db = Database {
            pool,
            db_path: db_path.to_path_buf(),
        };
        db.initialize_schema()?;
        let notes = db.count_notes()?;
        tracing::info!("✅ 数据库已就绪: {:?} ({} 条笔记)", db.db_path, notes);
        Ok(db)
    }

    fn build_pool(db_path: &Path) -> Result<SqlitePool> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
            c.pragma_update(None, "journal_mode", &"WAL")?;
            c.pragma_update(None, "synchronous", &"NORMAL")?;
            // 写锁等待上限 3 秒，超时直接报错交给调用方
            c.pragma_update(None, "busy_timeout", &3000i64)?;
            Ok(())
        });

        Pool::builder()
            .max_size(8)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(10))
            .build(manager)
            .with_context(|| format!("创建数据库连接池失败: {:?}", db_path))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(SCHEMA_SQL)
            .context("初始化数据表失败")?;
        Ok(())
    }

    /// 从连接池获取连接
    pub fn get_conn(&self) -> Result<SqlitePooledConnection> {
        self.pool.get().context("从连接池获取连接失败")
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 在阻塞线程池上执行同步的数据库闭包，避免占用 async 工作线程
    pub async fn call<F, T>(self: Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(&self))
            .await
            .context("数据库任务异常终止")?
    }
}
