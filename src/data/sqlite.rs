//! SQLite 安装记录存储
//!
//! 单连接 + Mutex，所有读写串行执行，单键读取和删除天然互斥。
//! 删除使用 `DELETE ... RETURNING`，在一条语句内取回环境描述符。

use super::store::InstallationStore;
use super::{DataError, Result};
use crate::models::InstallationRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS installations (
    tool_id      TEXT PRIMARY KEY NOT NULL,
    environment  TEXT NOT NULL,
    installed_at TEXT NOT NULL
)";

pub struct SqliteInstallationStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteInstallationStore {
    /// 打开（必要时创建）数据库文件并初始化表结构
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent.to_path_buf(), e))?;
        }

        let conn = Connection::open(path)?;
        Self::init(conn, path.to_path_buf())
    }

    /// 内存数据库，测试使用
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        tracing::debug!(path = %db_path.display(), "安装记录数据库已就绪");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<(String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    /// 安装时间只用于展示；无法解析时退回 Unix 纪元，记录本身仍然有效
    fn into_record(raw: (String, String, String)) -> InstallationRecord {
        let (tool_id, environment, installed_at) = raw;
        let installed_at = match DateTime::parse_from_rfc3339(&installed_at) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(
                    tool_id = %tool_id,
                    installed_at = %installed_at,
                    error = %e,
                    "安装时间格式无效，按 Unix 纪元处理"
                );
                DateTime::<Utc>::UNIX_EPOCH
            }
        };
        InstallationRecord {
            tool_id,
            environment,
            installed_at,
        }
    }
}

impl InstallationStore for SqliteInstallationStore {
    fn get(&self, tool_id: &str) -> Result<Option<InstallationRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT tool_id, environment, installed_at FROM installations WHERE tool_id = ?1",
                params![tool_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(raw.map(Self::into_record))
    }

    fn insert(&self, record: &InstallationRecord) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO installations (tool_id, environment, installed_at)
             VALUES (?1, ?2, ?3)",
            params![
                record.tool_id,
                record.environment,
                record.installed_at.to_rfc3339()
            ],
        )?;
        Ok(changed == 1)
    }

    fn remove(&self, tool_id: &str) -> Result<Option<InstallationRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "DELETE FROM installations WHERE tool_id = ?1
                 RETURNING tool_id, environment, installed_at",
                params![tool_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(raw.map(Self::into_record))
    }

    fn list(&self) -> Result<Vec<InstallationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT tool_id, environment, installed_at FROM installations ORDER BY tool_id",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(Self::into_record).collect())
    }
}
