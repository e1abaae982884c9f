//! 路由与请求处理
//!
//! | 方法 | 路径 | 说明 |
//! |---|---|---|
//! | GET | /api/mcp/config?mcpId= | 解析 MCP 服务配置 |
//! | DELETE | /api/mcp/uninstall | 卸载，body `{mcpId}` |
//! | POST | /api/mcp/install | 登记安装，body `{mcpId, environment}` |
//! | GET | /api/mcp/installed | 已安装列表 |
//! | GET | /api/models/capabilities?model= | 模型工具调用能力 |
//! | GET | /api/models/capability-patterns | 已知能力模式 |
//! | POST | /api/models/ensure | 确保模型可用，NDJSON 状态流 |
//! | GET | /api/models | 本地已安装模型 |
//! | DELETE | /api/models | 删除本地模型，body `{model}` |
//! | GET | /api/models/host-status | 模型宿主是否安装、是否运行 |
//! | PUT | /api/log-level | 热更新日志级别并写回配置，body `{level}` |

use super::body::{ndjson, BoxBody};
use super::responses::{self, NDJSON_CONTENT_TYPE};
use super::state::AppState;
use crate::core::error::{require_id, AppError};
use crate::core::logger::update_log_level;
use crate::models::LogLevel;
use crate::services::model::{classify, NATIVE_TOOL_PATTERNS};
use crate::utils::{load_app_config, run_blocking, save_app_config};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpIdBody {
    #[serde(default)]
    mcp_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallBody {
    #[serde(default)]
    mcp_id: Option<String>,
    #[serde(default)]
    environment: Option<String>,
}

/// `/api/models/ensure` 与 `DELETE /api/models` 共用
#[derive(Debug, Default, Deserialize)]
struct ModelBody {
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LogLevelBody {
    #[serde(default)]
    level: Option<String>,
}

/// 服务入口，任何错误都转换为 JSON 响应
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!(method = %method, path = %path, "收到请求");

    let response = match (method.clone(), path.as_str()) {
        (Method::GET, "/api/mcp/config") => {
            get_config(query_param(&req, "mcpId").unwrap_or_default(), &state).await
        }
        (Method::DELETE, "/api/mcp/uninstall") => uninstall(req, &state).await,
        (Method::POST, "/api/mcp/install") => install(req, &state).await,
        (Method::GET, "/api/mcp/installed") => list_installed(&state).await,
        (Method::GET, "/api/models/capabilities") => capabilities(&req),
        (Method::GET, "/api/models/capability-patterns") => capability_patterns(),
        (Method::POST, "/api/models/ensure") => ensure_model(req, &state).await,
        (Method::GET, "/api/models") => list_models(&state).await,
        (Method::DELETE, "/api/models") => delete_model(req, &state).await,
        (Method::GET, "/api/models/host-status") => host_status(&state).await,
        (Method::PUT, "/api/log-level") => set_log_level(req, &state).await,
        (
            _,
            "/api/mcp/config"
            | "/api/mcp/uninstall"
            | "/api/mcp/install"
            | "/api/mcp/installed"
            | "/api/models/capabilities"
            | "/api/models/capability-patterns"
            | "/api/models/ensure"
            | "/api/models"
            | "/api/models/host-status"
            | "/api/log-level",
        ) => responses::method_not_allowed(&method, &path),
        _ => responses::not_found(&path),
    };

    Ok(response)
}

async fn get_config(mcp_id: String, state: &AppState) -> Response<BoxBody> {
    match state.resolver.resolve(&mcp_id).await {
        Ok(resolved) => responses::success(json!({
            "config": resolved.config,
            "source": resolved.source,
        })),
        Err(e) => responses::from_error(&e),
    }
}

async fn uninstall<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let body: McpIdBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let mcp_id = body.mcp_id.unwrap_or_default();

    match state.installations.uninstall(&mcp_id).await {
        Ok(result) => responses::success(json!({
            "message": result.message,
            "mcpId": result.mcp_id,
        })),
        Err(e) => responses::from_error(&e),
    }
}

async fn install<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let body: InstallBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let mcp_id = body.mcp_id.unwrap_or_default();
    let environment = body.environment.unwrap_or_default();

    match state.installations.install(&mcp_id, &environment).await {
        Ok(result) => responses::success(json!({
            "message": result.message,
            "mcpId": result.mcp_id,
            "record": result.record,
        })),
        Err(e) => responses::from_error(&e),
    }
}

async fn list_installed(state: &AppState) -> Response<BoxBody> {
    match state.installations.list_installed().await {
        Ok(records) => responses::success(json!({ "installed": records })),
        Err(e) => responses::from_error(&e),
    }
}

fn capabilities<B>(req: &Request<B>) -> Response<BoxBody> {
    let model = query_param(req, "model").unwrap_or_default();
    match require_id(&model, "Model name") {
        Ok(model) => responses::success(json!({ "capability": classify(model) })),
        Err(e) => responses::from_error(&e),
    }
}

fn capability_patterns() -> Response<BoxBody> {
    let patterns: Vec<_> = NATIVE_TOOL_PATTERNS
        .iter()
        .map(|p| {
            json!({
                "pattern": p.pattern,
                "family": p.family,
                "toolCallFormat": p.format,
            })
        })
        .collect();
    responses::success(json!({ "patterns": patterns }))
}

async fn ensure_model<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let body: ModelBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let model = body.model.unwrap_or_default();

    match state.readiness.ensure_ready(&model) {
        Ok(stream) => {
            responses::with_content_type(StatusCode::OK, NDJSON_CONTENT_TYPE, ndjson(stream))
        }
        Err(e) => responses::from_error(&e),
    }
}

async fn list_models(state: &AppState) -> Response<BoxBody> {
    match state.models.list_models().await {
        Ok(models) => responses::success(json!({ "models": models })),
        Err(e) => responses::from_error(&e),
    }
}

async fn delete_model<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let body: ModelBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let model = body.model.unwrap_or_default();
    let model = match require_id(&model, "Model name") {
        Ok(model) => model,
        Err(e) => return responses::from_error(&e),
    };

    match state.models.delete_model(model).await {
        Ok(()) => responses::success(json!({
            "model": model,
            "message": format!("{model} deleted"),
        })),
        Err(e) => responses::from_error(&e),
    }
}

async fn host_status(state: &AppState) -> Response<BoxBody> {
    let status = state.models.host_status().await;
    responses::success(json!({
        "host": status,
        "activeDownloads": state.readiness.inflight_count(),
    }))
}

/// 先写回配置再热更新；日志系统未初始化时只持久化，重启后生效
async fn set_log_level<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let body: LogLevelBody = match read_json(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let raw = body.level.unwrap_or_default();
    let level = match require_id(&raw, "Log level") {
        Ok(value) => match LogLevel::parse(value) {
            Some(level) => level,
            None => return responses::bad_request(format!("unknown log level: {value}")),
        },
        Err(e) => return responses::from_error(&e),
    };

    let persisted = match state.config_path.clone() {
        Some(path) => {
            let saved = run_blocking(move || {
                let mut config = load_app_config(&path)?;
                config.log.level = level;
                save_app_config(&path, &config)
            })
            .await;
            if let Err(e) = saved {
                return responses::from_error(&e);
            }
            true
        }
        None => false,
    };

    let applied = match update_log_level(level) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, level = level.as_str(), "日志级别未能热更新");
            false
        }
    };

    responses::success(json!({
        "level": level.as_str(),
        "applied": applied,
        "persisted": persisted,
    }))
}

/// 读取 JSON body，空 body 视为 `{}`
async fn read_json<B, T>(req: Request<B>) -> Result<T, Response<BoxBody>>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
    T: DeserializeOwned + Default,
{
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| {
            responses::from_error(&AppError::Unexpected(anyhow::anyhow!(
                "读取请求体失败: {e}"
            )))
        })?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| responses::bad_request(format!("invalid JSON body: {e}")))
}

/// 查询参数（按 x-www-form-urlencoded 规则解码）
fn query_param<B>(req: &Request<B>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    let params: HashMap<String, String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect();
    params.get(name).cloned()
}
