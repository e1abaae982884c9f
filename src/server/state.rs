// 服务共享状态：按配置装配各协作方

use crate::core::error::AppResult;
use crate::core::http::build_http_client;
use crate::data::{InstallationStore, SqliteInstallationStore};
use crate::models::AppConfig;
use crate::services::mcp::{
    ConfigResolver, DeepNlpRegistry, FsEnvironmentCleaner, InstallationManager, LocalConfigCache,
    RegistryClient,
};
use crate::services::model::{ModelHost, OllamaHost, ReadinessCoordinator};
use crate::utils::CONFIG_FILE_NAME;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub resolver: ConfigResolver,
    pub installations: InstallationManager,
    pub models: Arc<dyn ModelHost>,
    pub readiness: ReadinessCoordinator,
    /// 运行时修改（如日志级别）写回的配置文件；None 时只在内存生效
    pub config_path: Option<PathBuf>,
}

impl AppState {
    /// 就绪协调器与模型管理共用同一个宿主
    pub fn new(
        resolver: ConfigResolver,
        installations: InstallationManager,
        models: Arc<dyn ModelHost>,
    ) -> Self {
        let readiness = ReadinessCoordinator::new(Arc::clone(&models));
        Self {
            resolver,
            installations,
            models,
            readiness,
            config_path: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// 从配置构建：SQLite 安装记录、本地缓存 + 远程注册中心、Ollama 模型宿主
    pub fn from_config(config: &AppConfig, config_dir: &Path) -> AppResult<Self> {
        let proxy = config.proxy_url.as_deref();

        let cache = Arc::new(LocalConfigCache::new(
            config.storage.mcp_config_path_in(config_dir),
        ));
        let registry: Option<Arc<dyn RegistryClient>> = if config.registry.enabled {
            let timeout = Duration::from_secs(config.registry.timeout_secs);
            let client = build_http_client(proxy, Some(timeout))?;
            Some(Arc::new(DeepNlpRegistry::new(
                client,
                config.registry.base_url.clone(),
                timeout,
            )))
        } else {
            tracing::info!("远程注册中心已禁用，仅使用本地缓存");
            None
        };
        let resolver = ConfigResolver::new(cache, registry);

        let db_path = config.storage.db_path_in(config_dir);
        let store: Arc<dyn InstallationStore> = Arc::new(SqliteInstallationStore::open(&db_path)?);
        let envs_dir = config.storage.envs_dir_in(config_dir);
        let installations =
            InstallationManager::new(store, Arc::new(FsEnvironmentCleaner::new(&envs_dir)));

        // 模型下载可能持续很久，不设整体超时；Ollama 在本机，不走代理
        let ollama_client = build_http_client(None, None)?;
        let host: Arc<dyn ModelHost> =
            Arc::new(OllamaHost::new(ollama_client, config.ollama.base_url.clone()));

        tracing::info!(
            db_path = %db_path.display(),
            envs_dir = %envs_dir.display(),
            ollama = %config.ollama.base_url,
            "服务状态已装配"
        );

        Ok(Self::new(resolver, installations, host)
            .with_config_path(config_dir.join(CONFIG_FILE_NAME)))
    }
}
