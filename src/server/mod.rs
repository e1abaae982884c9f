// HTTP 服务
//
// ApiServer 负责：
// - 监听端口，每个连接在独立任务中以 HTTP/1 处理
// - 启动 / 停止 / 运行状态查询

pub mod body;
pub mod handlers;
pub mod responses;
pub mod state;

pub use body::BoxBody;
pub use handlers::handle_request;
pub use state::AppState;

use crate::core::error::AppResult;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub struct ApiServer {
    host: String,
    port: u16,
    state: Arc<AppState>,
    server_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
    local_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl ApiServer {
    pub fn new(host: impl Into<String>, port: u16, state: Arc<AppState>) -> Self {
        Self {
            host: host.into(),
            port,
            state,
            server_handle: Arc::new(RwLock::new(None)),
            local_addr: Arc::new(RwLock::new(None)),
        }
    }

    /// 启动服务，返回实际监听地址（端口为 0 时由系统分配）
    pub async fn start(&self) -> AppResult<SocketAddr> {
        if self.server_handle.read().await.is_some() {
            return Err(anyhow::anyhow!("服务已在运行").into());
        }

        let bind = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("绑定地址 {bind} 失败"))?;
        let addr = listener.local_addr().context("获取监听地址失败")?;

        tracing::info!(addr = %addr, "HTTP 服务启动");

        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let state = Arc::clone(&state);
                                async move { handle_request(req, state).await }
                            });

                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                tracing::debug!(peer = %peer, error = ?err, "连接处理结束");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "接受连接失败");
                    }
                }
            }
        });

        *self.server_handle.write().await = Some(handle);
        *self.local_addr.write().await = Some(addr);
        Ok(addr)
    }

    /// 停止监听；进行中的模型就绪流程由调用方通过 `ReadinessCoordinator::shutdown` 取消
    pub async fn stop(&self) -> AppResult<()> {
        let handle = self.server_handle.write().await.take();
        self.local_addr.write().await.take();

        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("HTTP 服务已停止");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.server_handle.read().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppConfig;
    use tempfile::TempDir;

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.registry.enabled = false;
        Arc::new(AppState::from_config(&config, dir).unwrap())
    }

    #[tokio::test]
    async fn test_start_serve_stop() {
        let temp = TempDir::new().unwrap();
        let server = ApiServer::new("127.0.0.1", 0, test_state(temp.path()));
        assert!(!server.is_running().await);

        let addr = server.start().await.unwrap();
        assert!(server.is_running().await);
        assert_eq!(server.local_addr().await, Some(addr));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = client
            .get(format!("http://{addr}/api/mcp/config"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "MCP ID is required");

        server.stop().await.unwrap();
        assert!(!server.is_running().await);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let temp = TempDir::new().unwrap();
        let server = ApiServer::new("127.0.0.1", 0, test_state(temp.path()));
        server.start().await.unwrap();
        assert!(server.start().await.is_err());
        server.stop().await.unwrap();
    }
}
