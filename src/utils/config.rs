use crate::core::error::AppResult;
use crate::data::DataError;
use crate::models::AppConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// 覆盖配置目录的环境变量
pub const HOME_ENV: &str = "MCP_PROVISIONER_HOME";

/// 配置目录（默认 ~/.mcp-provisioner），不存在则创建
pub fn config_dir() -> AppResult<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        Some(custom) => PathBuf::from(custom),
        None => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("无法获取用户主目录"))?
            .join(".mcp-provisioner"),
    };

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| DataError::io(&dir, e))?;
    }
    Ok(dir)
}

pub const CONFIG_FILE_NAME: &str = "config.json";

/// 全局配置文件路径
pub fn config_path() -> AppResult<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// 读取全局配置，文件不存在时返回默认配置
pub fn read_app_config() -> AppResult<AppConfig> {
    load_app_config(&config_path()?)
}

/// 从指定文件读取配置，文件不存在时返回默认配置
pub fn load_app_config(path: &Path) -> AppResult<AppConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "配置文件不存在，使用默认配置");
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
    let config: AppConfig = serde_json::from_str(&content).map_err(DataError::from)?;
    Ok(config)
}

/// 写入配置（仅当前用户可读写）
pub fn save_app_config(path: &Path, config: &AppConfig) -> AppResult<()> {
    let json = serde_json::to_string_pretty(config).map_err(DataError::from)?;
    fs::write(path, json).map_err(|e| DataError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| DataError::io(path, e))?;
    }

    tracing::info!(path = %path.display(), "配置已保存");
    Ok(())
}
