use crate::core::error::{AppError, AppResult};

/// 把同步 I/O（文件锁、SQLite）放到阻塞线程池执行，避免占住 runtime 工作线程
pub async fn run_blocking<F, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Unexpected(anyhow::anyhow!("后台任务异常: {e}")))?
}
