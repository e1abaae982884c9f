//! MCP 服务配置解析
//!
//! 解析顺序：本地缓存 → 远程注册中心 → 空结果，命中即返回。
//! "找不到"是正常结果；只有请求无法构造之类的问题才会作为错误返回。

use super::cache::ConfigCache;
use super::registry::RegistryClient;
use crate::core::error::{require_id, AppError, AppResult};
use crate::models::ToolConfig;
use crate::utils::run_blocking;
use std::sync::Arc;

pub struct ConfigResolver {
    cache: Arc<dyn ConfigCache>,
    registry: Option<Arc<dyn RegistryClient>>,
}

impl ConfigResolver {
    pub fn new(cache: Arc<dyn ConfigCache>, registry: Option<Arc<dyn RegistryClient>>) -> Self {
        Self { cache, registry }
    }

    /// 解析工具配置，每次调用都重新解析
    pub async fn resolve(&self, tool_id: &str) -> AppResult<ToolConfig> {
        let tool_id = require_id(tool_id, "MCP ID")?;

        // 缓存读取会阻塞在文件锁上（桌面端写入期间），放到阻塞线程池
        let cache = Arc::clone(&self.cache);
        let owned_id = tool_id.to_string();
        let cached = run_blocking(move || cache.lookup(&owned_id).map_err(AppError::from)).await;

        match cached {
            Ok(Some(config)) => {
                tracing::debug!(tool_id = %tool_id, "命中本地配置缓存");
                return Ok(ToolConfig::cached(tool_id, config));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(tool_id = %tool_id, error = ?e, "读取本地配置缓存失败，忽略");
            }
        }

        if let Some(registry) = &self.registry {
            match registry.lookup(tool_id).await {
                Ok(items) => {
                    let count = items.len();
                    if let Some(first) = items.into_iter().next() {
                        tracing::info!(tool_id = %tool_id, items = count, "从远程注册中心获取配置");
                        return Ok(ToolConfig::remote(tool_id, first));
                    }
                    tracing::debug!(tool_id = %tool_id, "远程注册中心无匹配项");
                }
                Err(AppError::UpstreamUnavailable { reason }) => {
                    tracing::warn!(tool_id = %tool_id, reason = %reason, "远程注册中心不可用，按未找到处理");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ToolConfig::not_found(tool_id))
    }
}
