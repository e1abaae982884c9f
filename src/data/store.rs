//! 安装记录存储接口
//!
//! 记录是否存在是"工具是否已安装"的唯一依据。实现必须保证单键读取与单键删除互斥，
//! 不会读到删除一半的记录；删除不存在的键是无操作。

use super::Result;
use crate::models::InstallationRecord;

pub trait InstallationStore: Send + Sync {
    /// 读取单条记录
    fn get(&self, tool_id: &str) -> Result<Option<InstallationRecord>>;

    /// 仅在键不存在时插入，返回是否插入成功
    fn insert(&self, record: &InstallationRecord) -> Result<bool>;

    /// 原子地删除并返回被删除的记录，键不存在时返回 None
    fn remove(&self, tool_id: &str) -> Result<Option<InstallationRecord>>;

    /// 按 tool_id 排序返回全部记录
    fn list(&self) -> Result<Vec<InstallationRecord>>;
}
