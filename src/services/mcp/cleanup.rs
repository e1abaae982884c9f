//! 环境清理
//!
//! 环境描述符是安装时创建的目录（绝对路径，或相对 envs 根目录的路径）。
//! 只允许删除 envs 根目录内的路径。

use crate::core::error::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

#[async_trait]
pub trait EnvironmentCleaner: Send + Sync {
    async fn cleanup(&self, environment: &str) -> AppResult<()>;
}

pub struct FsEnvironmentCleaner {
    root: PathBuf,
}

impl FsEnvironmentCleaner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 解析并校验目标路径
    fn resolve_target(&self, environment: &str) -> AppResult<PathBuf> {
        let raw = Path::new(environment.trim());
        let failed = |reason: &str| AppError::CleanupFailed {
            environment: environment.to_string(),
            reason: reason.to_string(),
        };

        if raw.as_os_str().is_empty() {
            return Err(failed("环境描述符为空"));
        }
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(failed("环境路径不允许包含 .."));
        }

        let target = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };

        if !target.starts_with(&self.root) || target == self.root {
            return Err(failed("环境路径不在 envs 目录内"));
        }

        Ok(target)
    }

    /// 按真实路径复核：envs 内的符号链接可能把父目录指向外部
    async fn ensure_contained(&self, environment: &str, target: &Path) -> AppResult<()> {
        let failed = |reason: String| AppError::CleanupFailed {
            environment: environment.to_string(),
            reason,
        };

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| failed(format!("无法解析 envs 目录: {e}")))?;
        let parent = target.parent().unwrap_or(target);
        let parent = tokio::fs::canonicalize(parent)
            .await
            .map_err(|e| failed(format!("无法解析环境路径: {e}")))?;

        if !parent.starts_with(&root) {
            return Err(failed(format!(
                "环境路径经符号链接指向 envs 目录之外: {}",
                parent.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EnvironmentCleaner for FsEnvironmentCleaner {
    async fn cleanup(&self, environment: &str) -> AppResult<()> {
        let target = self.resolve_target(environment)?;

        let metadata = match tokio::fs::symlink_metadata(&target).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %target.display(), "环境目录不存在，无需清理");
                return Ok(());
            }
            Err(e) => {
                return Err(AppError::CleanupFailed {
                    environment: environment.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        // 目标本身是符号链接时只删除链接，所以只需校验父目录
        self.ensure_contained(environment, &target).await?;

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };

        result.map_err(|e| AppError::CleanupFailed {
            environment: environment.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(path = %target.display(), "环境已清理");
        Ok(())
    }
}
