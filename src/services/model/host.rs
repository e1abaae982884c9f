//! 模型宿主接口
//!
//! 对应宿主进程暴露的命令和一个事件流：
//! - `check_if_model_installed(name) -> bool`
//! - `pull_model(name)`，下载结束时返回，失败时报错
//! - `download-progress` 事件，只在一次 pull 期间有效
//! - 模型列表、删除和宿主健康检查

use crate::core::error::AppResult;
use crate::models::{HostStatus, LocalModel};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub const DOWNLOAD_PROGRESS_EVENT: &str = "download-progress";

#[async_trait]
pub trait ModelHost: Send + Sync {
    async fn check_if_model_installed(&self, name: &str) -> AppResult<bool>;

    /// 下载模型，进度负载写入 `progress`
    async fn pull_model(&self, name: &str, progress: ProgressSender) -> AppResult<()>;

    async fn list_models(&self) -> AppResult<Vec<LocalModel>>;

    /// 删除本地模型；模型不存在时返回 `NotInstalled`
    async fn delete_model(&self, name: &str) -> AppResult<()>;

    /// 宿主是否安装、是否在运行，本身不会因为宿主不可达而失败
    async fn host_status(&self) -> HostStatus;
}

/// 宿主侧的进度发送端
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<String>,
}

impl ProgressSender {
    /// 发送一条负载；订阅已释放时返回 false，调用方无需处理
    pub async fn emit(&self, payload: impl Into<String>) -> bool {
        self.tx.send(payload.into()).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 单次下载请求的进度订阅，drop 即取消订阅
pub struct ProgressSubscription {
    rx: mpsc::Receiver<String>,
}

impl ProgressSubscription {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// 创建一对有界的进度通道
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressSubscription) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender { tx }, ProgressSubscription { rx })
}
