//! MCP 工具安装管理
//!
//! 卸载流程（严格顺序）：
//! 1. 查询安装记录，不存在则返回 `NotInstalled`，无任何副作用
//! 2. 从记录中取出环境描述符（删除后无法再取得）
//! 3. 删除记录，这一步成功即视为卸载完成
//! 4. 尽力清理环境，失败只记 warn 日志，不回滚记录、不影响结果
//!
//! 并发卸载同一工具时，两个调用都可能通过第 1 步；删除是唯一的判定点，
//! 只有真正删掉记录的一方会执行清理，调用方只能得到"最终不存在"的保证。

use super::cleanup::EnvironmentCleaner;
use crate::core::error::{require_id, AppError, AppResult};
use crate::data::{InstallationStore, Result as DataResult};
use crate::models::{InstallResult, InstallationRecord, UninstallResult};
use crate::utils::run_blocking;
use std::sync::Arc;

pub struct InstallationManager {
    store: Arc<dyn InstallationStore>,
    cleaner: Arc<dyn EnvironmentCleaner>,
}

impl InstallationManager {
    pub fn new(store: Arc<dyn InstallationStore>, cleaner: Arc<dyn EnvironmentCleaner>) -> Self {
        Self { store, cleaner }
    }

    /// 在阻塞线程池上访问存储（SQLite 调用会持有同步锁并做磁盘 I/O）
    async fn with_store<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&dyn InstallationStore) -> DataResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        run_blocking(move || f(store.as_ref()).map_err(AppError::from)).await
    }

    /// 登记一次安装
    pub async fn install(&self, tool_id: &str, environment: &str) -> AppResult<InstallResult> {
        let tool_id = require_id(tool_id, "MCP ID")?;
        let environment = require_id(environment, "Environment")?;

        let record = InstallationRecord::new(tool_id, environment);
        let pending = record.clone();
        if !self.with_store(move |store| store.insert(&pending)).await? {
            return Err(AppError::AlreadyInstalled {
                tool_id: tool_id.to_string(),
            });
        }

        tracing::info!(tool_id = %tool_id, environment = %environment, "已登记安装记录");
        Ok(InstallResult {
            mcp_id: tool_id.to_string(),
            message: format!("{tool_id} installed successfully"),
            record,
        })
    }

    pub async fn uninstall(&self, tool_id: &str) -> AppResult<UninstallResult> {
        let tool_id = require_id(tool_id, "MCP ID")?;

        let id = tool_id.to_string();
        let record = self
            .with_store(move |store| store.get(&id))
            .await?
            .ok_or_else(|| AppError::NotInstalled {
                tool_id: tool_id.to_string(),
            })?;
        let environment = record.environment;

        let id = tool_id.to_string();
        match self.with_store(move |store| store.remove(&id)).await? {
            Some(_) => {
                tracing::info!(tool_id = %tool_id, "安装记录已删除");

                if let Err(e) = self.cleaner.cleanup(&environment).await {
                    tracing::warn!(
                        tool_id = %tool_id,
                        environment = %environment,
                        error = %e,
                        "环境清理失败，安装记录已删除，可稍后手动清理"
                    );
                }
            }
            None => {
                // 并发卸载的另一方已删除记录并负责清理
                tracing::debug!(tool_id = %tool_id, "安装记录已被并发删除，跳过清理");
            }
        }

        Ok(UninstallResult {
            mcp_id: tool_id.to_string(),
            message: format!("{tool_id} uninstalled successfully"),
        })
    }

    pub async fn list_installed(&self) -> AppResult<Vec<InstallationRecord>> {
        self.with_store(|store| store.list()).await
    }

    pub async fn is_installed(&self, tool_id: &str) -> AppResult<bool> {
        let id = require_id(tool_id, "MCP ID")?.to_string();
        self.with_store(move |store| store.get(&id).map(|r| r.is_some()))
            .await
    }
}
