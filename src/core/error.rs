//! 应用统一错误类型
//!
//! 错误分为两类：
//! - 用户可见：`InvalidArgument`、`NotInstalled`、`AlreadyInstalled`、`DownloadFailed`、`Unexpected`
//! - 内部吸收：`UpstreamUnavailable`、`CleanupFailed`，只记录日志，不改变操作结果

use crate::data::DataError;
use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// 缺失或为空的标识符
    #[error("{field} is required")]
    InvalidArgument { field: String },

    /// 卸载前置条件不满足
    #[error("{tool_id} is not installed")]
    NotInstalled { tool_id: String },

    #[error("{tool_id} is already installed")]
    AlreadyInstalled { tool_id: String },

    /// 远程注册中心不可用（网络错误、响应格式错误）
    #[error("registry unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    /// 卸载后环境清理失败
    #[error("failed to clean up environment {environment}: {reason}")]
    CleanupFailed { environment: String, reason: String },

    #[error("failed to download model {model}: {reason}")]
    DownloadFailed { model: String, reason: String },

    #[error(transparent)]
    Storage(#[from] DataError),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// `MCP ID is required` 这类缺参错误
    pub fn missing(field: impl Into<String>) -> Self {
        AppError::InvalidArgument {
            field: field.into(),
        }
    }

    /// 是否应该把错误暴露给最终调用方
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            AppError::UpstreamUnavailable { .. } | AppError::CleanupFailed { .. }
        )
    }

    /// HTTP 状态码映射
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument { .. } | AppError::NotInstalled { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::AlreadyInstalled { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 校验标识符非空（空白字符串视为缺失）
pub fn require_id<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::missing(field));
    }
    Ok(trimmed)
}
