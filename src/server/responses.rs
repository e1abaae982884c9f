//! JSON 响应模板
//!
//! 成功：`{"success": true, ...}`；失败：`{"success": false, "error": "..."}`

use super::body::{full, BoxBody};
use crate::core::error::AppError;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::{json, Map, Value};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub fn with_content_type(
    status: StatusCode,
    content_type: &'static str,
    body: BoxBody,
) -> Response<BoxBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json_response(status: StatusCode, value: &Value) -> Response<BoxBody> {
    // Value 序列化不会失败
    let body = serde_json::to_vec(value).unwrap_or_default();
    with_content_type(status, "application/json", full(body))
}

/// 成功响应，`fields` 中的键与 `success: true` 平铺
pub fn success(fields: Value) -> Response<BoxBody> {
    let mut map = Map::new();
    map.insert("success".to_string(), Value::Bool(true));
    if let Value::Object(extra) = fields {
        map.extend(extra);
    }
    json_response(StatusCode::OK, &Value::Object(map))
}

pub fn failure(status: StatusCode, message: impl Into<String>) -> Response<BoxBody> {
    json_response(
        status,
        &json!({ "success": false, "error": message.into() }),
    )
}

pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// 按错误类型映射状态码；内部吸收类错误只记日志，不把细节返回给调用方
pub fn from_error(err: &AppError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(error = ?err, "请求处理失败");
    } else {
        tracing::debug!(error = %err, "请求参数无效");
    }

    if err.is_user_visible() {
        failure(status, err.to_string())
    } else {
        failure(status, INTERNAL_ERROR_MESSAGE)
    }
}

pub fn bad_request(message: impl Into<String>) -> Response<BoxBody> {
    failure(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    failure(StatusCode::NOT_FOUND, format!("no route for {path}"))
}

pub fn method_not_allowed(method: &hyper::Method, path: &str) -> Response<BoxBody> {
    failure(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("{method} is not allowed on {path}"),
    )
}
