use anyhow::Context;
use mcp_provisioner::utils::{config_dir, read_app_config};
use mcp_provisioner::{init_logger, ApiServer, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = read_app_config().context("读取配置失败")?;
    init_logger(&config.log)?;

    let dir = config_dir()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %dir.display(),
        "mcp-provisioner 启动"
    );

    let state = Arc::new(AppState::from_config(&config, &dir).context("初始化服务失败")?);
    let server = ApiServer::new(config.server.host.clone(), config.server.port, Arc::clone(&state));
    let addr = server.start().await?;
    tracing::info!(addr = %addr, "等待请求，Ctrl+C 退出");

    tokio::signal::ctrl_c().await.context("监听退出信号失败")?;

    tracing::info!("收到退出信号，正在关闭");
    state.readiness.shutdown();
    server.stop().await?;
    Ok(())
}
