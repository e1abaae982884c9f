//! 安装记录存储层
//!
//! - `store`: `InstallationStore` 接口，由调用方以句柄形式注入
//! - `memory`: 内存实现（测试、临时运行）
//! - `sqlite`: 持久化实现

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{DataError, Result};
pub use memory::MemoryInstallationStore;
pub use sqlite::SqliteInstallationStore;
pub use store::InstallationStore;
