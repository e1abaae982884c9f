//! 存储层错误类型
//!
//! 使用 `thiserror` 定义安装记录存储的所有错误，上层统一转换为 `AppError::Storage`。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// 文件 I/O 错误
    #[error("文件 I/O 错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON 序列化错误: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// 锁中毒等并发问题
    #[error("并发错误: {0}")]
    Concurrency(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    /// 从 `std::io::Error` 和路径创建 I/O 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
