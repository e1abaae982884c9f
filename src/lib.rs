// lib.rs - 暴露服务层给 HTTP 服务和二进制使用

pub mod core;
pub mod data;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

pub use models::*;

pub use core::{
    build_http_client, init_logger, require_id, update_log_level, AppError, AppResult,
};
pub use data::{InstallationStore, MemoryInstallationStore, SqliteInstallationStore};
pub use server::{ApiServer, AppState};
pub use services::mcp::{
    ConfigCache, ConfigResolver, DeepNlpRegistry, EnvironmentCleaner, FsEnvironmentCleaner,
    InstallationManager, LocalConfigCache, RegistryClient,
};
pub use services::model::{
    classify, ModelHost, OllamaHost, ReadinessCoordinator, ReadinessStream,
};
