// 本地推理模型相关模型
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    Unknown,
    Checking,
    Downloading,
    Ready,
    Failed,
}

/// 单次就绪请求的瞬时状态，不持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReadinessState {
    pub model: String,
    pub status: ReadinessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    pub status_message: String,
    /// 已下载大小，如 `1.2 GB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,
    /// 传输速度，如 `12.5 MB/s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

impl ModelReadinessState {
    pub fn unknown(model: &str) -> Self {
        Self::with(model, ReadinessStatus::Unknown, None, String::new())
    }

    pub fn checking(model: &str) -> Self {
        Self::with(
            model,
            ReadinessStatus::Checking,
            None,
            format!("checking {model}"),
        )
    }

    pub fn downloading(model: &str, percent: Option<u8>, message: impl Into<String>) -> Self {
        Self::with(
            model,
            ReadinessStatus::Downloading,
            percent.map(|p| p.min(100)),
            message.into(),
        )
    }

    pub fn ready(model: &str) -> Self {
        Self::with(
            model,
            ReadinessStatus::Ready,
            Some(100),
            format!("{model} is ready"),
        )
    }

    pub fn failed(model: &str, message: impl Into<String>) -> Self {
        Self::with(model, ReadinessStatus::Failed, None, message.into())
    }

    /// 附加传输明细，只对 Downloading 状态有意义
    pub fn with_transfer(
        mut self,
        downloaded: Option<String>,
        total: Option<String>,
        speed: Option<String>,
    ) -> Self {
        self.downloaded = downloaded;
        self.total = total;
        self.speed = speed;
        self
    }

    fn with(
        model: &str,
        status: ReadinessStatus,
        progress_percent: Option<u8>,
        status_message: String,
    ) -> Self {
        Self {
            model: model.to_string(),
            status,
            progress_percent,
            status_message,
            downloaded: None,
            total: None,
            speed: None,
        }
    }

    /// Ready / Failed 为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ReadinessStatus::Ready | ReadinessStatus::Failed)
    }
}

/// 原生工具调用的输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallFormat {
    /// OpenAI 风格的 tool_calls 结构
    OpenAiFunctions,
    /// `<tool_call>` 标签包裹的 JSON
    Hermes,
    /// `[TOOL_CALLS]` 前缀
    Mistral,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub model: String,
    pub supports_native_tools: bool,
    pub requires_prompt_engineering: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_format: Option<ToolCallFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// 本地已安装的模型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub modified_at: String,
}

/// 模型宿主（Ollama）的健康状况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostHealth {
    NotInstalled,
    InstalledStopped,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub installed: bool,
    pub running: bool,
    pub status: HostHealth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl HostStatus {
    /// 服务在响应就视为已安装，即使本机找不到命令行
    pub fn from_checks(installed: bool, version: Option<String>) -> Self {
        let running = version.is_some();
        let installed = installed || running;
        let status = match (installed, running) {
            (_, true) => HostHealth::Running,
            (true, false) => HostHealth::InstalledStopped,
            (false, false) => HostHealth::NotInstalled,
        };
        Self {
            installed,
            running,
            status,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ModelReadinessState::ready("m").is_terminal());
        assert!(ModelReadinessState::failed("m", "x").is_terminal());
        assert!(!ModelReadinessState::downloading("m", Some(5), "").is_terminal());
        assert!(!ModelReadinessState::checking("m").is_terminal());
    }

    #[test]
    fn test_downloading_clamps_percent() {
        let state = ModelReadinessState::downloading("m", Some(140), "x");
        assert_eq!(state.progress_percent, Some(100));
    }

    #[test]
    fn test_state_json_omits_missing_percent() {
        let state = ModelReadinessState::downloading("m", None, "pulling manifest");
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("progressPercent").is_none());
        assert_eq!(json["status"], "downloading");
        assert_eq!(json["statusMessage"], "pulling manifest");
    }

    #[test]
    fn test_transfer_fields_are_optional_in_json() {
        let state = ModelReadinessState::downloading("m", Some(40), "downloading (40%)")
            .with_transfer(Some("1.6 GB".to_string()), Some("4.0 GB".to_string()), None);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["downloaded"], "1.6 GB");
        assert_eq!(json["total"], "4.0 GB");
        assert!(json.get("speed").is_none());

        let ready = serde_json::to_value(ModelReadinessState::ready("m")).unwrap();
        assert!(ready.get("downloaded").is_none());
    }

    #[test]
    fn test_host_status_from_checks() {
        let missing = HostStatus::from_checks(false, None);
        assert_eq!(missing.status, HostHealth::NotInstalled);

        let stopped = HostStatus::from_checks(true, None);
        assert_eq!(stopped.status, HostHealth::InstalledStopped);
        assert!(!stopped.running);

        let running = HostStatus::from_checks(false, Some("0.5.7".to_string()));
        assert!(running.installed && running.running);
        assert_eq!(
            serde_json::to_value(&running).unwrap()["status"],
            "running"
        );
    }
}
