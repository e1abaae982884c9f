//! 本地配置缓存：读取 `mcp_config.json` 中的 `mcpServers`
//!
//! 文件格式与桌面端一致：
//! `{"mcpServers": {"<id>": {"command": "...", "args": [...], "env": {...}}}}`

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// 本地缓存协作者：返回零或一条配置，调用方会吞掉所有错误
pub trait ConfigCache: Send + Sync {
    fn lookup(&self, tool_id: &str) -> Result<Option<Value>>;
}

#[derive(Debug, Default, Deserialize)]
struct McpConfigFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, Value>,
}

pub struct LocalConfigCache {
    path: PathBuf,
}

impl LocalConfigCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_file(&self) -> Result<McpConfigFile> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("打开 {} 失败", self.path.display()))?;

        // 共享锁，避免读到桌面端写了一半的文件；锁在 file drop 时释放
        file.lock_shared().context("获取文件锁失败")?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("读取 {} 失败", self.path.display()))?;

        if content.trim().is_empty() {
            return Ok(McpConfigFile::default());
        }

        serde_json::from_str(&content).with_context(|| format!("解析 {} 失败", self.path.display()))
    }
}

impl ConfigCache for LocalConfigCache {
    fn lookup(&self, tool_id: &str) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = self.read_file()?;
        Ok(file.mcp_servers.remove(tool_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_miss() {
        let dir = TempDir::new().unwrap();
        let cache = LocalConfigCache::new(dir.path().join("mcp_config.json"));
        assert!(cache.lookup("github").unwrap().is_none());
    }

    #[test]
    fn test_lookup_existing_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp_config.json");
        std::fs::write(
            &path,
            json!({
                "mcpServers": {
                    "github": {"command": "npx", "args": ["-y", "@modelcontextprotocol/server-github"]}
                }
            })
            .to_string(),
        )
        .unwrap();

        let cache = LocalConfigCache::new(&path);
        let config = cache.lookup("github").unwrap().unwrap();
        assert_eq!(config["command"], "npx");
        assert!(cache.lookup("fetch").unwrap().is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp_config.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = LocalConfigCache::new(&path);
        assert!(cache.lookup("github").is_err());
    }

    #[test]
    fn test_empty_file_is_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp_config.json");
        std::fs::write(&path, "").unwrap();

        assert!(LocalConfigCache::new(&path).lookup("github").unwrap().is_none());
    }
}
