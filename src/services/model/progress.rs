//! 下载进度负载解析
//!
//! 进度只用于展示，任何无法识别的负载都按原始文本展示，不会让下载失败。

use crate::models::ModelReadinessState;
use serde_json::Value;
use std::time::Instant;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// 带 total / completed 的结构化进度（字节）
    Transfer { percent: u8, completed: u64, total: u64 },
    /// 仅有 status 字段
    Status(String),
    /// 无法解析的原始文本
    Raw(String),
}

impl ProgressUpdate {
    pub fn message(&self) -> String {
        match self {
            ProgressUpdate::Transfer { percent, .. } => format!("downloading ({percent}%)"),
            ProgressUpdate::Status(s) | ProgressUpdate::Raw(s) => s.clone(),
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressUpdate::Transfer { percent, .. } => Some(*percent),
            _ => None,
        }
    }

    /// 不含传输速度的状态；速度需要相邻两次进度，见 [`ProgressTracker`]
    pub fn into_state(self, model: &str) -> ModelReadinessState {
        let state = ModelReadinessState::downloading(model, self.percent(), self.message());
        match self {
            ProgressUpdate::Transfer {
                completed, total, ..
            } => state.with_transfer(format_bytes(completed), format_bytes(total), None),
            _ => state,
        }
    }
}

/// 解析一条 download-progress 负载，空负载返回 None
pub fn interpret(payload: &str) -> Option<ProgressUpdate> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => {
            let total = map.get("total").and_then(Value::as_f64);
            let completed = map.get("completed").and_then(Value::as_f64);
            if let (Some(total), Some(completed)) = (total, completed) {
                if total > 0.0 {
                    let percent = (completed / total * 100.0).round().clamp(0.0, 100.0);
                    return Some(ProgressUpdate::Transfer {
                        percent: percent as u8,
                        completed: completed.max(0.0) as u64,
                        total: total as u64,
                    });
                }
            }

            match map.get("status").and_then(Value::as_str) {
                Some(status) => Some(ProgressUpdate::Status(status.to_string())),
                None => Some(ProgressUpdate::Raw(trimmed.to_string())),
            }
        }
        // JSON 字符串去掉引号展示
        Ok(Value::String(s)) if !s.trim().is_empty() => Some(ProgressUpdate::Raw(s)),
        _ => Some(ProgressUpdate::Raw(trimmed.to_string())),
    }
}

/// 按相邻两次结构化进度估算传输速度
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<(Instant, u64)>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, model: &str, update: ProgressUpdate) -> ModelReadinessState {
        self.observe_at(model, update, Instant::now())
    }

    /// 只有已完成字节数增长时才给出速度；换层（completed 回落）时重新计时
    pub fn observe_at(
        &mut self,
        model: &str,
        update: ProgressUpdate,
        now: Instant,
    ) -> ModelReadinessState {
        let completed = match update {
            ProgressUpdate::Transfer { completed, .. } => completed,
            _ => return update.into_state(model),
        };

        let speed = match self.last {
            Some((at, previous)) if completed > previous => {
                let elapsed = now.saturating_duration_since(at).as_secs_f64();
                (elapsed > 0.0).then(|| format_speed((completed - previous) as f64 / elapsed))
            }
            _ => None,
        };
        self.last = Some((now, completed));

        let mut state = update.into_state(model);
        state.speed = speed;
        state
    }
}

/// 人类可读的字节数，0 视为未知
pub fn format_bytes(bytes: u64) -> Option<String> {
    if bytes == 0 {
        return None;
    }

    let value = bytes as f64;
    Some(if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    })
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}
