// MCP 工具服务相关模型
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 配置来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolConfigSource {
    /// 本地 mcp_config.json
    Cache,
    /// 远程注册中心
    #[serde(rename = "deepnlp")]
    Remote,
    None,
}

impl ToolConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolConfigSource::Cache => "cache",
            ToolConfigSource::Remote => "deepnlp",
            ToolConfigSource::None => "none",
        }
    }
}

/// 解析结果。找不到配置时 `config` 为 None、`source` 为 None，这是正常结果而非错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub id: String,
    pub config: Option<Value>,
    pub source: ToolConfigSource,
}

impl ToolConfig {
    pub fn cached(id: &str, config: Value) -> Self {
        Self {
            id: id.to_string(),
            config: Some(config),
            source: ToolConfigSource::Cache,
        }
    }

    pub fn remote(id: &str, config: Value) -> Self {
        Self {
            id: id.to_string(),
            config: Some(config),
            source: ToolConfigSource::Remote,
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self {
            id: id.to_string(),
            config: None,
            source: ToolConfigSource::None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.source != ToolConfigSource::None
    }
}

/// 安装记录：记录存在即代表已安装
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub tool_id: String,
    /// 环境描述符，只对清理器有意义（通常是环境目录）
    pub environment: String,
    pub installed_at: DateTime<Utc>,
}

impl InstallationRecord {
    pub fn new(tool_id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            environment: environment.into(),
            installed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResult {
    pub mcp_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub mcp_id: String,
    pub message: String,
    pub record: InstallationRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_wire_names() {
        assert_eq!(
            serde_json::to_value(ToolConfigSource::Remote).unwrap(),
            serde_json::json!("deepnlp")
        );
        assert_eq!(
            serde_json::to_value(ToolConfigSource::None).unwrap(),
            serde_json::json!("none")
        );
        assert_eq!(ToolConfigSource::Cache.as_str(), "cache");
    }

    #[test]
    fn test_not_found_has_null_config() {
        let config = ToolConfig::not_found("github");
        assert!(!config.is_found());
        let json = serde_json::to_value(&config).unwrap();
        assert!(json["config"].is_null());
        assert_eq!(json["source"], "none");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = InstallationRecord::new("github", "/envs/github");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["toolId"], "github");
        assert!(json.get("installedAt").is_some());
    }
}
