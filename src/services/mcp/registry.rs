//! 远程 MCP 注册中心客户端
//!
//! 请求：`GET {base_url}/server?id=<id>`
//! 响应：`{"items": [...]}` 或直接返回数组

use crate::core::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// 按 id 查询配置项。网络或响应格式问题返回 `UpstreamUnavailable`，
    /// 请求本身无法构造时返回 `Unexpected`
    async fn lookup(&self, tool_id: &str) -> AppResult<Vec<Value>>;
}

pub struct DeepNlpRegistry {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DeepNlpRegistry {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn lookup_url(&self, tool_id: &str) -> AppResult<Url> {
        let endpoint = format!("{}/server", self.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&endpoint).map_err(|e| {
            AppError::Unexpected(anyhow::anyhow!("注册中心地址无效 {endpoint}: {e}"))
        })?;
        url.query_pairs_mut().append_pair("id", tool_id);
        Ok(url)
    }
}

#[async_trait]
impl RegistryClient for DeepNlpRegistry {
    async fn lookup(&self, tool_id: &str) -> AppResult<Vec<Value>> {
        let url = self.lookup_url(tool_id)?;
        tracing::debug!(tool_id = %tool_id, url = %url, "查询远程注册中心");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| upstream(format!("请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("注册中心返回状态 {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| upstream(format!("响应不是合法 JSON: {e}")))?;

        extract_items(body)
    }
}

fn upstream(reason: String) -> AppError {
    AppError::UpstreamUnavailable { reason }
}

/// 兼容 `{"items": [...]}` 与裸数组两种响应
pub(crate) fn extract_items(body: Value) -> AppResult<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(upstream(format!("items 字段类型错误: {other}"))),
        },
        other => Err(upstream(format!("无法识别的响应: {other}"))),
    }
}
