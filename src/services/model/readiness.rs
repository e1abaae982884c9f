//! 模型就绪协调
//!
//! 流程：检查是否已安装 → 未安装则订阅进度并下载 → Ready；任何错误 → Failed。
//! 不自动重试，需要重试时由调用方重新发起。
//!
//! 状态通过 `watch` 通道发布，只保留最新状态，旧的进度可能被覆盖。
//! 同一模型的并发请求共享同一次下载（single-flight），流程结束后条目被移除。
//! 所有订阅方都离开或协调器关闭时，进行中的下载会被取消，进度订阅随之释放。

use super::host::{progress_channel, ModelHost};
use super::progress::{interpret, ProgressTracker};
use crate::core::error::{require_id, AppResult};
use crate::models::ModelReadinessState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const DEFAULT_PROGRESS_CAPACITY: usize = 64;

type InflightMap = HashMap<String, Arc<watch::Sender<ModelReadinessState>>>;

pub struct ReadinessCoordinator {
    host: Arc<dyn ModelHost>,
    inflight: Arc<Mutex<InflightMap>>,
    shutdown: CancellationToken,
    progress_capacity: usize,
}

impl ReadinessCoordinator {
    pub fn new(host: Arc<dyn ModelHost>) -> Self {
        Self::with_capacity(host, DEFAULT_PROGRESS_CAPACITY)
    }

    pub fn with_capacity(host: Arc<dyn ModelHost>, progress_capacity: usize) -> Self {
        Self {
            host,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            progress_capacity,
        }
    }

    /// 确保模型可用，返回状态流。同一模型已有进行中的流程时直接加入
    pub fn ensure_ready(&self, model: &str) -> AppResult<ReadinessStream> {
        let model = require_id(model, "Model name")?.to_string();

        let mut inflight = self
            .inflight
            .lock()
            .map_err(|e| anyhow::anyhow!("就绪请求表锁异常: {e}"))?;

        if let Some(sender) = inflight.get(&model) {
            if !sender.borrow().is_terminal() {
                tracing::debug!(model = %model, "加入进行中的就绪流程");
                return Ok(ReadinessStream::new(sender.subscribe()));
            }
        }

        let (sender, receiver) = watch::channel(ModelReadinessState::unknown(&model));
        let sender = Arc::new(sender);
        inflight.insert(model.clone(), Arc::clone(&sender));
        drop(inflight);

        let host = Arc::clone(&self.host);
        let registry = Arc::clone(&self.inflight);
        let token = self.shutdown.child_token();
        let capacity = self.progress_capacity;

        tokio::spawn(async move {
            run(host, &model, &sender, token, capacity).await;

            if let Ok(mut inflight) = registry.lock() {
                if inflight
                    .get(&model)
                    .is_some_and(|current| Arc::ptr_eq(current, &sender))
                {
                    inflight.remove(&model);
                }
            }
        });

        Ok(ReadinessStream::new(receiver))
    }

    /// 当前进行中的模型数量
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// 取消所有进行中的流程
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn run(
    host: Arc<dyn ModelHost>,
    model: &str,
    sender: &watch::Sender<ModelReadinessState>,
    token: CancellationToken,
    capacity: usize,
) {
    tokio::select! {
        final_state = provision(host.as_ref(), model, sender, capacity) => {
            if final_state.is_terminal() {
                tracing::info!(model = %model, status = ?final_state.status, "就绪流程结束");
            }
            sender.send_replace(final_state);
        }
        _ = sender.closed() => {
            tracing::debug!(model = %model, "所有订阅方已离开，取消就绪流程");
            // 条目移除前可能有新订阅方加入
            sender.send_replace(ModelReadinessState::failed(model, "provisioning cancelled"));
        }
        _ = token.cancelled() => {
            tracing::info!(model = %model, "协调器关闭，取消就绪流程");
            sender.send_replace(ModelReadinessState::failed(model, "provisioning cancelled"));
        }
    }
}

/// 执行检查与下载，返回终止状态
async fn provision(
    host: &dyn ModelHost,
    model: &str,
    sender: &watch::Sender<ModelReadinessState>,
    capacity: usize,
) -> ModelReadinessState {
    sender.send_replace(ModelReadinessState::checking(model));

    match host.check_if_model_installed(model).await {
        Ok(true) => return ModelReadinessState::ready(model),
        Ok(false) => {}
        Err(e) => {
            tracing::error!(model = %model, error = %e, "检查模型安装状态失败");
            return ModelReadinessState::failed(model, e.to_string());
        }
    }

    sender.send_replace(ModelReadinessState::downloading(
        model,
        Some(0),
        "downloading (0%)",
    ));

    // 订阅只活在这个作用域内，所有退出路径（含被取消）都会释放
    let (progress, mut subscription) = progress_channel(capacity);
    let pull = host.pull_model(model, progress);
    tokio::pin!(pull);
    let mut tracker = ProgressTracker::new();

    let result = loop {
        tokio::select! {
            biased;
            Some(payload) = subscription.recv() => {
                if let Some(update) = interpret(&payload) {
                    sender.send_replace(tracker.observe(model, update));
                }
            }
            result = &mut pull => break result,
        }
    };
    drop(subscription);

    match result {
        Ok(()) => ModelReadinessState::ready(model),
        Err(e) => {
            tracing::error!(model = %model, error = %e, "模型下载失败");
            ModelReadinessState::failed(model, e.to_string())
        }
    }
}

/// 就绪状态流，读到 Ready / Failed 后结束
pub struct ReadinessStream {
    receiver: watch::Receiver<ModelReadinessState>,
    started: bool,
    finished: bool,
}

impl ReadinessStream {
    fn new(receiver: watch::Receiver<ModelReadinessState>) -> Self {
        Self {
            receiver,
            started: false,
            finished: false,
        }
    }

    /// 下一条状态；首次调用返回当前状态，之后等待变化
    pub async fn next(&mut self) -> Option<ModelReadinessState> {
        if self.finished {
            return None;
        }

        if self.started && self.receiver.changed().await.is_err() {
            // 发送端在终止前被丢弃（流程被取消）
            self.finished = true;
            return None;
        }
        self.started = true;

        let state = self.receiver.borrow_and_update().clone();
        if state.is_terminal() {
            self.finished = true;
        }
        Some(state)
    }

    /// 等待终止状态
    pub async fn wait(mut self) -> Option<ModelReadinessState> {
        let mut last = None;
        while let Some(state) = self.next().await {
            last = Some(state);
        }
        last.filter(ModelReadinessState::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppError;
    use crate::models::{HostStatus, LocalModel, ReadinessStatus};
    use crate::services::model::host::ProgressSender;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    enum Check {
        Installed,
        Missing,
        Broken,
    }

    struct FakeHost {
        check: Check,
        payloads: Vec<&'static str>,
        pull_error: Option<&'static str>,
        /// 设置后 pull 会一直挂起，直到收到通知
        hold: Option<Arc<Notify>>,
        pulls: AtomicUsize,
        leaked_sender: Mutex<Option<ProgressSender>>,
    }

    impl FakeHost {
        fn new(check: Check) -> Self {
            Self {
                check,
                payloads: Vec::new(),
                pull_error: None,
                hold: None,
                pulls: AtomicUsize::new(0),
                leaked_sender: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ModelHost for FakeHost {
        async fn check_if_model_installed(&self, _name: &str) -> AppResult<bool> {
            match self.check {
                Check::Installed => Ok(true),
                Check::Missing => Ok(false),
                Check::Broken => Err(anyhow::anyhow!("ollama not running").into()),
            }
        }

        async fn pull_model(&self, name: &str, progress: ProgressSender) -> AppResult<()> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            *self.leaked_sender.lock().unwrap() = Some(progress.clone());

            for payload in &self.payloads {
                progress.emit(*payload).await;
            }
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            match self.pull_error {
                Some(reason) => Err(AppError::DownloadFailed {
                    model: name.to_string(),
                    reason: reason.to_string(),
                }),
                None => Ok(()),
            }
        }

        async fn list_models(&self) -> AppResult<Vec<LocalModel>> {
            Ok(Vec::new())
        }

        async fn delete_model(&self, name: &str) -> AppResult<()> {
            Err(AppError::NotInstalled {
                tool_id: name.to_string(),
            })
        }

        async fn host_status(&self) -> HostStatus {
            HostStatus::from_checks(true, Some("test".to_string()))
        }
    }

    async fn collect(mut stream: ReadinessStream) -> Vec<ModelReadinessState> {
        let mut states = Vec::new();
        while let Some(state) = stream.next().await {
            states.push(state);
        }
        states
    }

    #[tokio::test]
    async fn test_installed_model_is_ready_without_download() {
        let host = Arc::new(FakeHost::new(Check::Installed));
        let coordinator = ReadinessCoordinator::new(host.clone());

        let last = coordinator
            .ensure_ready("llama3.1:8b")
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(last.status, ReadinessStatus::Ready);
        assert_eq!(host.pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_download_relays_progress_then_ready() {
        let mut host = FakeHost::new(Check::Missing);
        host.payloads = vec![r#"{"total":200,"completed":50}"#, "pulling manifest"];
        let host = Arc::new(host);
        let coordinator = ReadinessCoordinator::new(host.clone());

        let states = collect(coordinator.ensure_ready("qwen3:4b").unwrap()).await;
        let last = states.last().unwrap();
        assert_eq!(last.status, ReadinessStatus::Ready);
        assert_eq!(host.pulls.load(Ordering::SeqCst), 1);
        // 中间状态可能被覆盖，但出现的下载状态必须是合法的
        for state in &states[..states.len() - 1] {
            assert!(!state.is_terminal());
        }
    }

    #[tokio::test]
    async fn test_progress_percent_is_observable() {
        let hold = Arc::new(Notify::new());
        let mut host = FakeHost::new(Check::Missing);
        host.payloads = vec![r#"{"total":200,"completed":50}"#];
        host.hold = Some(hold.clone());
        let coordinator = ReadinessCoordinator::new(Arc::new(host));

        let mut stream = coordinator.ensure_ready("qwen3:4b").unwrap();
        let mut seen = None;
        while let Some(state) = stream.next().await {
            if state.progress_percent == Some(25) {
                seen = Some(state);
                break;
            }
        }
        let seen = seen.unwrap();
        assert_eq!(seen.status, ReadinessStatus::Downloading);
        assert_eq!(seen.status_message, "downloading (25%)");
        assert_eq!(seen.downloaded.as_deref(), Some("50 B"));
        assert_eq!(seen.total.as_deref(), Some("200 B"));

        hold.notify_one();
        assert_eq!(stream.wait().await.unwrap().status, ReadinessStatus::Ready);
    }

    #[tokio::test]
    async fn test_check_failure_is_failed() {
        let host = Arc::new(FakeHost::new(Check::Broken));
        let coordinator = ReadinessCoordinator::new(host.clone());

        let last = coordinator.ensure_ready("m").unwrap().wait().await.unwrap();
        assert_eq!(last.status, ReadinessStatus::Failed);
        assert!(last.status_message.contains("ollama not running"));
        assert_eq!(host.pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_download_failure_is_failed_and_not_retried() {
        let mut host = FakeHost::new(Check::Missing);
        host.pull_error = Some("disk full");
        let host = Arc::new(host);
        let coordinator = ReadinessCoordinator::new(host.clone());

        let last = coordinator.ensure_ready("m").unwrap().wait().await.unwrap();
        assert_eq!(last.status, ReadinessStatus::Failed);
        assert!(last.status_message.contains("disk full"));
        assert_eq!(host.pulls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscription_released_after_termination() {
        for pull_error in [None, Some("boom")] {
            let mut host = FakeHost::new(Check::Missing);
            host.pull_error = pull_error;
            let host = Arc::new(host);
            let coordinator = ReadinessCoordinator::new(host.clone());

            coordinator.ensure_ready("m").unwrap().wait().await.unwrap();

            let leaked = host.leaked_sender.lock().unwrap().take().unwrap();
            assert!(leaked.is_closed());
            assert!(!leaked.emit(r#"{"total":10,"completed":10}"#).await);
        }
    }

    #[tokio::test]
    async fn test_blank_model_is_invalid() {
        let coordinator = ReadinessCoordinator::new(Arc::new(FakeHost::new(Check::Missing)));
        assert!(matches!(
            coordinator.ensure_ready("  "),
            Err(AppError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_download() {
        let hold = Arc::new(Notify::new());
        let mut host = FakeHost::new(Check::Missing);
        host.hold = Some(hold.clone());
        let host = Arc::new(host);
        let coordinator = ReadinessCoordinator::new(host.clone());

        let first = coordinator.ensure_ready("m").unwrap();
        let second = coordinator.ensure_ready("m").unwrap();
        assert_eq!(coordinator.inflight_count(), 1);

        // 等待下载真正开始后放行
        while host.pulls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        hold.notify_one();

        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert_eq!(a.unwrap().status, ReadinessStatus::Ready);
        assert_eq!(b.unwrap().status, ReadinessStatus::Ready);
        assert_eq!(host.pulls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_cancels_download() {
        let hold = Arc::new(Notify::new());
        let mut host = FakeHost::new(Check::Missing);
        host.hold = Some(hold.clone());
        let host = Arc::new(host);
        let coordinator = ReadinessCoordinator::new(host.clone());

        let stream = coordinator.ensure_ready("m").unwrap();
        while host.pulls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        drop(stream);

        // 流程被取消后订阅释放、条目移除
        for _ in 0..100 {
            if coordinator.inflight_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(coordinator.inflight_count(), 0);
        let leaked = host.leaked_sender.lock().unwrap().take().unwrap();
        assert!(leaked.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_fails_inflight_requests() {
        let hold = Arc::new(Notify::new());
        let mut host = FakeHost::new(Check::Missing);
        host.hold = Some(hold);
        let host = Arc::new(host);
        let coordinator = ReadinessCoordinator::new(host.clone());

        let stream = coordinator.ensure_ready("m").unwrap();
        while host.pulls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        coordinator.shutdown();

        let last = stream.wait().await.unwrap();
        assert_eq!(last.status, ReadinessStatus::Failed);
        assert_eq!(last.status_message, "provisioning cancelled");
    }

    #[tokio::test]
    async fn test_failed_request_can_be_retried() {
        let mut host = FakeHost::new(Check::Missing);
        host.pull_error = Some("network reset");
        let host = Arc::new(host);
        let coordinator = ReadinessCoordinator::new(host.clone());

        coordinator.ensure_ready("m").unwrap().wait().await.unwrap();
        coordinator.ensure_ready("m").unwrap().wait().await.unwrap();
        assert_eq!(host.pulls.load(Ordering::SeqCst), 2);
    }
}
