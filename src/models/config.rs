// 全局配置结构，放在 models 以便在库和二进制之间共享
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// 解析字符串为日志级别（大小写不敏感）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    /// 日志目录，None 时使用 <config_dir>/logs
    #[serde(default)]
    pub file_path: Option<String>,
}

/// HTTP 服务监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 远程 MCP 注册中心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_registry_url(),
            timeout_secs: default_registry_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
        }
    }
}

/// 本地存储路径，未设置时都落在配置目录下
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub envs_dir: Option<PathBuf>,
    #[serde(default)]
    pub mcp_config_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn db_path_in(&self, config_dir: &std::path::Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| config_dir.join("installations.db"))
    }

    pub fn envs_dir_in(&self, config_dir: &std::path::Path) -> PathBuf {
        self.envs_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("envs"))
    }

    pub fn mcp_config_path_in(&self, config_dir: &std::path::Path) -> PathBuf {
        self.mcp_config_path
            .clone()
            .unwrap_or_else(|| config_dir.join("mcp_config.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// 出站代理，例如 http://127.0.0.1:7890 或 socks5h://127.0.0.1:1080
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7823
}

fn default_true() -> bool {
    true
}

fn default_registry_url() -> String {
    "https://www.deepnlp.org/api/mcp_marketplace/v1".to_string()
}

fn default_registry_timeout() -> u64 {
    15
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
