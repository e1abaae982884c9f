//! Ollama 模型宿主
//!
//! - `/api/tags` 列出本地模型
//! - `/api/pull` 以 NDJSON 流式返回进度，每一行原样作为 download-progress 负载转发
//! - `/api/delete` 删除模型
//! - `/api/version` 判断服务是否在运行，`ollama --version` 判断是否安装

use super::host::{ModelHost, ProgressSender, DOWNLOAD_PROGRESS_EVENT};
use crate::core::error::{AppError, AppResult};
use crate::models::{HostStatus, LocalModel};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_CLI: &str = "ollama";
const VERSION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(default)]
    version: String,
}

pub struct OllamaHost {
    client: Client,
    base_url: String,
    cli: String,
}

impl OllamaHost {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cli: DEFAULT_CLI.to_string(),
        }
    }

    /// 指定命令行程序（非 PATH 中的 ollama）
    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.cli = cli.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(&self, e: reqwest::Error) -> AppError {
        anyhow::anyhow!("Ollama is not running at {}: {e}", self.base_url).into()
    }

    /// 服务版本；连接失败或非 2xx 返回 None
    async fn running_version(&self) -> Option<String> {
        let response = self
            .client
            .get(self.endpoint("/api/version"))
            .timeout(VERSION_TIMEOUT)
            .send()
            .await
            .map_err(|e| tracing::debug!(error = %e, "Ollama 服务未响应"))
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        // 旧版本没有 /api/version 的 JSON 体，能连上即视为运行中
        let body = response.json::<VersionResponse>().await.ok();
        Some(body.map(|v| v.version).unwrap_or_default())
    }

    async fn cli_installed(&self) -> bool {
        match tokio::process::Command::new(&self.cli)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!(cli = %self.cli, error = %e, "未找到 Ollama 命令行");
                false
            }
        }
    }
}

#[async_trait]
impl ModelHost for OllamaHost {
    async fn check_if_model_installed(&self, name: &str) -> AppResult<bool> {
        let wanted = normalize_model_name(name);
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| normalize_model_name(&m.name) == wanted))
    }

    async fn pull_model(&self, name: &str, progress: ProgressSender) -> AppResult<()> {
        let failed = |reason: String| AppError::DownloadFailed {
            model: name.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.endpoint("/api/pull"))
            .json(&serde_json::json!({ "model": name, "stream": true }))
            .send()
            .await
            .map_err(|e| failed(format!("Ollama is not running at {}: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("Ollama 返回状态 {status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut lines = NdjsonLines::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(format!("读取下载流失败: {e}")))?;
            for line in lines.push(&chunk) {
                forward_line(&line, &progress).await.map_err(failed)?;
            }
        }

        if let Some(line) = lines.finish() {
            forward_line(&line, &progress).await.map_err(failed)?;
        }

        tracing::info!(model = %name, "模型下载完成");
        Ok(())
    }

    async fn list_models(&self) -> AppResult<Vec<LocalModel>> {
        let response = self
            .client
            .get(self.endpoint("/api/tags"))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Ollama 返回状态 {status}").into());
        }

        let tags: TagsResponse = response.json().await.context("解析 /api/tags 响应失败")?;
        Ok(tags.models)
    }

    async fn delete_model(&self, name: &str) -> AppResult<()> {
        let response = self
            .client
            .delete(self.endpoint("/api/delete"))
            .json(&serde_json::json!({ "model": name }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotInstalled {
                tool_id: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("删除模型 {name} 失败 ({status}): {body}").into());
        }

        tracing::info!(model = %name, "模型已删除");
        Ok(())
    }

    async fn host_status(&self) -> HostStatus {
        let (version, installed) = tokio::join!(self.running_version(), self.cli_installed());
        let status = HostStatus::from_checks(installed, version);
        tracing::debug!(status = ?status.status, "Ollama 状态检查完成");
        status
    }
}

/// 转发一行进度；行内带 error 字段时返回错误信息
async fn forward_line(line: &str, progress: &ProgressSender) -> Result<(), String> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
        if let Some(error) = map.get("error").and_then(Value::as_str) {
            return Err(error.to_string());
        }
    }

    tracing::trace!(channel = DOWNLOAD_PROGRESS_EVENT, payload = %line, "转发下载进度");
    progress.emit(line).await;
    Ok(())
}

/// 没有 tag 的名称视为 `:latest`
fn normalize_model_name(name: &str) -> String {
    let name = name.trim().to_lowercase();
    let last_segment = name.rsplit('/').next().unwrap_or(&name);
    if last_segment.contains(':') {
        name
    } else {
        format!("{name}:latest")
    }
}

/// NDJSON 行缓冲，按字节切分，避免多字节字符被分块截断
#[derive(Default)]
struct NdjsonLines {
    buffer: Vec<u8>,
}

impl NdjsonLines {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    fn finish(self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model::host::progress_channel;

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("llama3.1"), "llama3.1:latest");
        assert_eq!(normalize_model_name("Llama3.1:8B"), "llama3.1:8b");
        assert_eq!(
            normalize_model_name("hf.co/org/model"),
            "hf.co/org/model:latest"
        );
        assert_eq!(
            normalize_model_name("localhost:5000/org/model"),
            "localhost:5000/org/model:latest"
        );
    }

    #[test]
    fn test_ndjson_lines_split_across_chunks() {
        let mut lines = NdjsonLines::default();
        assert!(lines.push(br#"{"status":"pul"#).is_empty());
        let out = lines.push(b"ling manifest\"}\n\n{\"status\":\"ok\"}\n{\"tail\"");
        assert_eq!(
            out,
            vec![
                r#"{"status":"pulling manifest"}"#.to_string(),
                r#"{"status":"ok"}"#.to_string()
            ]
        );
        assert_eq!(lines.finish().as_deref(), Some(r#"{"tail""#));
    }

    #[test]
    fn test_ndjson_lines_keep_multibyte_chars() {
        let text = "下载中\n".as_bytes();
        let mut lines = NdjsonLines::default();
        assert!(lines.push(&text[..2]).is_empty());
        assert_eq!(lines.push(&text[2..]), vec!["下载中".to_string()]);
    }

    #[tokio::test]
    async fn test_forward_line_detects_error() {
        let (tx, mut sub) = progress_channel(4);
        forward_line(r#"{"status":"pulling manifest"}"#, &tx)
            .await
            .unwrap();
        let err = forward_line(r#"{"error":"pull model manifest: file does not exist"}"#, &tx)
            .await
            .unwrap_err();
        assert!(err.contains("file does not exist"));
        assert_eq!(
            sub.recv().await.as_deref(),
            Some(r#"{"status":"pulling manifest"}"#)
        );
    }

    /// 按顺序为每个连接返回一条预设响应
    async fn canned_server(responses: Vec<(u16, &'static str)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                // 读完整个请求再应答，避免未读数据导致连接被重置
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).to_lowercase();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if request.len() >= end + 4 + length {
                            break;
                        }
                    }
                }

                let reply = format!(
                    "HTTP/1.1 {status} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    fn host(base_url: &str) -> OllamaHost {
        let client = Client::builder().no_proxy().build().unwrap();
        OllamaHost::new(client, base_url).with_cli("mcp-provisioner-missing-ollama")
    }

    #[tokio::test]
    async fn test_running_host_reports_version() {
        let base = canned_server(vec![(200, r#"{"version":"0.5.7"}"#)]).await;
        let status = host(&base).host_status().await;
        assert!(status.installed);
        assert!(status.running);
        assert_eq!(status.status, crate::models::HostHealth::Running);
        assert_eq!(status.version.as_deref(), Some("0.5.7"));
    }

    #[tokio::test]
    async fn test_missing_host_is_not_installed() {
        let status = host("http://127.0.0.1:9").host_status().await;
        assert!(!status.installed);
        assert!(!status.running);
        assert_eq!(status.status, crate::models::HostHealth::NotInstalled);
    }

    #[tokio::test]
    async fn test_list_and_check_installed() {
        let tags = r#"{"models":[{"name":"llama3.1:8b","size":4920753328,"digest":"abc"}]}"#;
        let base = canned_server(vec![(200, tags), (200, tags)]).await;
        let host = host(&base);

        let models = host.list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].size, 4920753328);
        assert!(host.check_if_model_installed("Llama3.1:8B").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_model_is_not_installed() {
        let base = canned_server(vec![
            (404, r#"{"error":"model 'nope' not found"}"#),
            (200, ""),
        ])
        .await;
        let host = host(&base);

        let err = host.delete_model("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotInstalled { .. }));
        host.delete_model("llama3.1:8b").await.unwrap();
    }

    #[tokio::test]
    async fn test_pull_forwards_each_line() {
        let body = "{\"status\":\"pulling manifest\"}\n{\"status\":\"pulling abc\",\"total\":100,\"completed\":40}\n{\"status\":\"success\"}\n";
        let base = canned_server(vec![(200, body)]).await;
        let (tx, mut sub) = progress_channel(8);

        host(&base).pull_model("llama3.1:8b", tx).await.unwrap();
        assert_eq!(
            sub.recv().await.as_deref(),
            Some(r#"{"status":"pulling manifest"}"#)
        );
        let second = sub.recv().await.unwrap();
        assert_eq!(
            crate::services::model::interpret(&second).and_then(|u| u.percent()),
            Some(40)
        );
        assert_eq!(sub.recv().await.as_deref(), Some(r#"{"status":"success"}"#));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_download() {
        let host = OllamaHost::new(Client::new(), "http://127.0.0.1:9/");
        let (tx, _sub) = progress_channel(4);
        let err = host.pull_model("llama3.1:8b", tx).await.unwrap_err();
        assert!(matches!(err, AppError::DownloadFailed { .. }));
        let err = host.check_if_model_installed("llama3.1:8b").await.unwrap_err();
        assert!(err.to_string().contains("Ollama is not running"));
    }
}
