// MCP 工具服务模块
//
// 包含配置解析（本地缓存 → 远程注册中心）、安装记录管理和环境清理

pub mod cache;
pub mod cleanup;
pub mod installation;
pub mod registry;
pub mod resolver;

pub use cache::{ConfigCache, LocalConfigCache};
pub use cleanup::{EnvironmentCleaner, FsEnvironmentCleaner};
pub use installation::InstallationManager;
pub use registry::{DeepNlpRegistry, RegistryClient};
pub use resolver::ConfigResolver;
